use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::codec::{self, Segment, INIT_SEQUENCE, MAX_FILE_SIZE, MAX_PAYLOAD};
use crate::err::Error;
use crate::net::DatagramEndpoint;

/// Per-segment retransmission deadline.
pub const LOSS_TIMEOUT: Duration = Duration::from_secs(5);

/// The inflight set: every sequence transmitted and not yet acknowledged,
/// ordered by resend deadline so the earliest-due record is always cheap to
/// find, with a side table for O(log n) removal by sequence on ACK.
struct Inflight {
    by_deadline: BTreeSet<(Instant, u32)>,
    deadline_of: HashMap<u32, Instant>,
}

impl Inflight {
    fn new() -> Self {
        Inflight {
            by_deadline: BTreeSet::new(),
            deadline_of: HashMap::new(),
        }
    }

    fn insert(&mut self, sequence: u32, deadline: Instant) {
        if let Some(old) = self.deadline_of.insert(sequence, deadline) {
            self.by_deadline.remove(&(old, sequence));
        }
        self.by_deadline.insert((deadline, sequence));
    }

    fn remove(&mut self, sequence: u32) {
        if let Some(deadline) = self.deadline_of.remove(&sequence) {
            self.by_deadline.remove(&(deadline, sequence));
        }
    }

    fn earliest(&self) -> Option<(Instant, u32)> {
        self.by_deadline.iter().next().copied()
    }

    fn is_empty(&self) -> bool {
        self.by_deadline.is_empty()
    }
}

pub struct Sender<E: DatagramEndpoint> {
    endpoint: E,
    peer: SocketAddr,
}

impl<E: DatagramEndpoint> Sender<E> {
    pub fn new(endpoint: E, peer: SocketAddr) -> Self {
        Sender { endpoint, peer }
    }

    /// Transmit the file at `path` to the configured peer, returning once
    /// every segment (including INIT) has been acknowledged.
    pub fn send_file(&mut self, path: &Path) -> Result<(), Error> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size > MAX_FILE_SIZE {
            return Err(Error::FileTooLarge(file_size));
        }

        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut inflight = Inflight::new();

        // Initialization phase.
        let init = codec::encode_init(file_size, &file_name);
        self.endpoint.send_to(self.peer, &init)?;
        inflight.insert(INIT_SEQUENCE, Instant::now() + LOSS_TIMEOUT);
        debug!("sent INIT, file_size={file_size} name={file_name:?}");

        // Bulk transmission phase: read sequentially, sequence = byte offset.
        let mut offset: u64 = 0;
        let mut buf = [0u8; MAX_PAYLOAD];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }

            let sequence = offset as u32;
            let segment = codec::encode_data(sequence, &buf[..n]);
            self.endpoint.send_to(self.peer, &segment)?;
            inflight.insert(sequence, Instant::now() + LOSS_TIMEOUT);
            trace!("sent DATA seq={sequence} len={n}");

            offset += n as u64;
        }

        // Retransmit-and-drain phase.
        let mut consecutive_timeouts = 0u32;
        const MAX_CONSECUTIVE_TIMEOUTS: u32 = 12;

        while !inflight.is_empty() {
            if let Some((deadline, sequence)) = inflight.earliest() {
                if deadline <= Instant::now() {
                    inflight.remove(sequence);

                    if sequence != INIT_SEQUENCE && u64::from(sequence) >= file_size {
                        // Defensive: stale entry past the end of the file.
                        continue;
                    }

                    self.retransmit(&mut file, &mut inflight, sequence, file_size, &init)?;
                }
            }

            match self.endpoint.recv(LOSS_TIMEOUT) {
                Ok(Some((_, bytes))) => {
                    consecutive_timeouts = 0;
                    if let Segment::Ack { sequence } = codec::decode(&bytes) {
                        trace!("received ACK seq={sequence}");
                        inflight.remove(sequence);
                    }
                }
                Ok(None) => {
                    consecutive_timeouts += 1;
                    if consecutive_timeouts >= MAX_CONSECUTIVE_TIMEOUTS {
                        return Err(Error::TerminalTimeout(
                            LOSS_TIMEOUT * MAX_CONSECUTIVE_TIMEOUTS,
                        ));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    return Err(Error::ConnectionRefused);
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!("transfer complete, {file_size} bytes acknowledged");
        Ok(())
    }

    fn retransmit(
        &mut self,
        file: &mut File,
        inflight: &mut Inflight,
        sequence: u32,
        file_size: u64,
        init: &[u8],
    ) -> Result<(), Error> {
        if sequence == INIT_SEQUENCE {
            self.endpoint.send_to(self.peer, init)?;
            inflight.insert(INIT_SEQUENCE, Instant::now() + LOSS_TIMEOUT);
            warn!("retransmitting INIT");
            return Ok(());
        }

        file.seek(SeekFrom::Start(u64::from(sequence)))?;
        let remaining = (file_size - u64::from(sequence)).min(MAX_PAYLOAD as u64) as usize;
        let mut buf = vec![0u8; remaining];
        let n = file.read(&mut buf)?;
        buf.truncate(n);

        let segment = codec::encode_data(sequence, &buf);
        self.endpoint.send_to(self.peer, &segment)?;
        inflight.insert(sequence, Instant::now() + LOSS_TIMEOUT);
        warn!("retransmitting DATA seq={sequence} len={n}");
        Ok(())
    }
}
