//! In-memory `DatagramEndpoint` doubles used by the test suite so the
//! reliability protocol can be exercised under controlled loss, duplication,
//! reordering, and corruption without real sockets.

#![cfg(test)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::net::DatagramEndpoint;

/// A one-sided endpoint with a pre-seeded inbox and a record of everything
/// it has sent. Handy for unit-testing a single phase (e.g. `await_init`)
/// in isolation.
pub struct LoopbackEndpoint {
    local: SocketAddr,
    inbox: VecDeque<(SocketAddr, Vec<u8>)>,
    pub sent: Vec<(SocketAddr, Vec<u8>)>,
}

impl LoopbackEndpoint {
    pub fn new() -> Self {
        LoopbackEndpoint {
            local: "127.0.0.1:0".parse().unwrap(),
            inbox: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    pub fn queue_incoming(&mut self, from: SocketAddr, bytes: Vec<u8>) {
        self.inbox.push_back((from, bytes));
    }
}

impl DatagramEndpoint for LoopbackEndpoint {
    fn send_to(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        self.sent.push((addr, bytes.to_vec()));
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> io::Result<Option<(SocketAddr, Vec<u8>)>> {
        Ok(self.inbox.pop_front())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}

/// A transform applied to every datagram crossing a `Link`, in send order.
/// Returns the datagrams that should actually be delivered (zero for a
/// drop, more than one for a duplicate).
pub type Fault = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

struct LinkState {
    queue: VecDeque<(SocketAddr, Vec<u8>)>,
    fault: Option<Fault>,
}

/// One direction of an in-memory network between two fixed addresses.
///
/// Backed by a `Mutex` rather than a `RefCell` so a sender and receiver
/// driven on separate threads in a test can share a link, mirroring the two
/// separate processes a real deployment would use.
#[derive(Clone)]
pub struct Link {
    state: Arc<Mutex<LinkState>>,
}

impl Link {
    pub fn new() -> Self {
        Link {
            state: Arc::new(Mutex::new(LinkState {
                queue: VecDeque::new(),
                fault: None,
            })),
        }
    }

    /// Install a per-datagram fault injector. Called once per datagram sent
    /// over this link, in send order.
    pub fn with_fault(self, fault: Fault) -> Self {
        self.state.lock().unwrap().fault = Some(fault);
        self
    }

    fn push(&self, from: SocketAddr, bytes: Vec<u8>) {
        let mut state = self.state.lock().unwrap();

        let deliveries = match state.fault.as_mut() {
            Some(fault) => fault(&bytes),
            None => vec![bytes],
        };

        for d in deliveries {
            state.queue.push_back((from, d));
        }
    }

    fn pop(&self) -> Option<(SocketAddr, Vec<u8>)> {
        self.state.lock().unwrap().queue.pop_front()
    }

    /// Poll for up to `timeout`, mirroring a real socket's read timeout so
    /// a sender and receiver driven on separate threads see the same
    /// "quiet poll" behavior the production adapter gives them.
    fn pop_blocking(&self, timeout: Duration) -> Option<(SocketAddr, Vec<u8>)> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// One endpoint of a two-party in-memory network: sends go out over
/// `outbound`, and `recv` drains `inbound`.
pub struct LinkEndpoint {
    pub local: SocketAddr,
    outbound: Link,
    inbound: Link,
}

impl LinkEndpoint {
    pub fn new(local: SocketAddr, outbound: Link, inbound: Link) -> Self {
        LinkEndpoint {
            local,
            outbound,
            inbound,
        }
    }
}

impl DatagramEndpoint for LinkEndpoint {
    fn send_to(&mut self, _addr: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        self.outbound.push(self.local, bytes.to_vec());
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> io::Result<Option<(SocketAddr, Vec<u8>)>> {
        Ok(self.inbound.pop_blocking(timeout))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}

/// Build a connected pair of endpoints: `(sender_side, receiver_side)`.
/// `sender_to_receiver` and `receiver_to_sender` can each carry their own
/// fault injector.
pub fn paired_network(
    sender_addr: SocketAddr,
    receiver_addr: SocketAddr,
    sender_to_receiver: Link,
    receiver_to_sender: Link,
) -> (LinkEndpoint, LinkEndpoint) {
    let sender_side = LinkEndpoint::new(sender_addr, sender_to_receiver.clone(), receiver_to_sender.clone());
    let receiver_side = LinkEndpoint::new(receiver_addr, receiver_to_sender, sender_to_receiver);
    (sender_side, receiver_side)
}
