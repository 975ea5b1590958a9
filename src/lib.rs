//! Unidirectional reliable file transfer over an unreliable datagram
//! substrate: one sender pushes a single file to one receiver, with
//! retransmission, reassembly, and integrity checking handled on top of
//! a send-and-forget transport.

mod codec;
mod err;
mod net;
mod receiver;
mod sender;

#[cfg(test)]
mod testutil;

pub use codec::{MAX_FILE_SIZE, MAX_PAYLOAD, MAX_SEGMENT};
pub use err::Error;
pub use net::{DatagramEndpoint, UdpEndpoint};
pub use receiver::{Receiver, CONNECTION_END_NULLS_COUNT, CONSECUTIVE_PACKETS_TIMEOUT};
pub use sender::{Sender, LOSS_TIMEOUT};
