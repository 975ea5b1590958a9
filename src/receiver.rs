use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::codec::{self, Segment, INIT_SEQUENCE};
use crate::err::Error;
use crate::net::DatagramEndpoint;

pub const CONSECUTIVE_PACKETS_TIMEOUT: Duration = Duration::from_secs(2);
pub const CONNECTION_END_NULLS_COUNT: u32 = 10;

pub struct Receiver<E: DatagramEndpoint> {
    endpoint: E,
    dir: PathBuf,
}

impl<E: DatagramEndpoint> Receiver<E> {
    pub fn new(endpoint: E) -> Self {
        Receiver {
            endpoint,
            dir: PathBuf::from("."),
        }
    }

    /// Write the output file under `dir` instead of the current directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Accept exactly one transfer, returning the path of the file written.
    pub fn receive(&mut self) -> Result<PathBuf, Error> {
        let (peer, file_size, file_name) = self.await_init()?;
        info!("INIT from {peer}: {file_name:?} ({file_size} bytes)");

        let out_path = self.dir.join(&file_name);
        if out_path.exists() {
            fs::remove_file(&out_path)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&out_path)?;

        let mut session = Session {
            endpoint: &mut self.endpoint,
            peer,
            file,
            next_expected: 0,
            pending: HashMap::new(),
            pending_acks: Vec::new(),
            send_ack_at: None,
        };

        session.run(file_size)?;

        Ok(out_path)
    }

    fn await_init(&mut self) -> Result<(SocketAddr, u64, String), Error> {
        loop {
            let polled = match self.endpoint.recv(CONSECUTIVE_PACKETS_TIMEOUT) {
                Ok(polled) => polled,
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    return Err(Error::ConnectionRefused);
                }
                Err(e) => return Err(e.into()),
            };

            match polled {
                Some((peer, bytes)) if !bytes.is_empty() => {
                    if let Segment::Init { file_size, file_name } = codec::decode(&bytes) {
                        let ack = codec::encode_ack(INIT_SEQUENCE);
                        self.endpoint.send_to(peer, &ack)?;
                        return Ok((peer, u64::from(file_size), file_name));
                    }
                }
                _ => continue,
            }
        }
    }
}

/// State for Phase B, once INIT has been accepted and the peer is known.
struct Session<'a, E: DatagramEndpoint> {
    endpoint: &'a mut E,
    peer: SocketAddr,
    file: File,
    next_expected: u64,
    pending: HashMap<u32, Vec<u8>>,
    pending_acks: Vec<u32>,
    send_ack_at: Option<Instant>,
}

impl<'a, E: DatagramEndpoint> Session<'a, E> {
    fn run(&mut self, announced_file_size: u64) -> Result<(), Error> {
        // A "null" is a quiet poll: either the socket timed out with nothing
        // to read, or the peer sent a genuinely empty datagram. Either way
        // it carries no reassembly information, so there is nothing to hold
        // back and reprocess once real traffic resumes -- only the streak
        // itself needs to reset.
        let mut nulls = 0u32;

        loop {
            match self.endpoint.recv(CONSECUTIVE_PACKETS_TIMEOUT) {
                Ok(Some((_, bytes))) if !bytes.is_empty() => {
                    nulls = 0;

                    self.process(&bytes);
                    self.send_ack_at = Some(Instant::now() + CONSECUTIVE_PACKETS_TIMEOUT);
                    self.drain_contiguous()?;
                }
                Ok(_) => {
                    nulls += 1;
                    if nulls > CONNECTION_END_NULLS_COUNT {
                        debug!("connection end: {nulls} consecutive quiet polls");
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    return Err(Error::ConnectionRefused);
                }
                Err(e) => return Err(e.into()),
            }

            if let Some(deadline) = self.send_ack_at {
                if Instant::now() >= deadline {
                    self.flush_acks()?;
                }
            }
        }

        self.flush_acks()?;

        if self.next_expected >= announced_file_size {
            Ok(())
        } else {
            Err(Error::TruncatedTransfer {
                received: self.next_expected,
                announced: announced_file_size,
            })
        }
    }

    /// A non-empty datagram: decode it and, for DATA, buffer or queue a
    /// duplicate ACK. Never writes to disk here; that happens in
    /// `drain_contiguous`.
    fn process(&mut self, bytes: &[u8]) {
        match codec::decode(bytes) {
            Segment::Data { sequence, payload } => {
                self.pending_acks.push(sequence);

                if u64::from(sequence) < self.next_expected {
                    trace!("seq={sequence} already written, ACK-only duplicate");
                    return;
                }

                self.pending.entry(sequence).or_insert(payload);
            }
            Segment::Ack { .. } => {
                // A receiver does not expect ACKs, but the decoder is
                // uniform; ignore for reassembly purposes.
            }
            Segment::Init { .. } => {
                // A re-delivered INIT: the sender only retransmits it when
                // it never saw our first ACK, so queue another one rather
                // than dropping it silently, same as a duplicate DATA.
                self.pending_acks.push(INIT_SEQUENCE);
            }
            Segment::Invalid => {
                // Corrupt or unknown segment: drop silently.
            }
        }
    }

    fn drain_contiguous(&mut self) -> Result<(), Error> {
        while let Some(payload) = self.pending.remove(&(self.next_expected as u32)) {
            self.file.write_all(&payload)?;
            self.next_expected += payload.len() as u64;
        }
        Ok(())
    }

    fn flush_acks(&mut self) -> Result<(), Error> {
        for sequence in self.pending_acks.drain(..) {
            let ack = codec::encode_ack(sequence);
            if let Err(e) = self.endpoint.send_to(self.peer, &ack) {
                warn!("failed to send ACK for seq={sequence}: {e}");
            }
        }
        self.send_ack_at = None;
        Ok(())
    }
}
