//! Wire format for the three segment kinds. Pure encode/decode, no I/O.
//!
//! ```text
//! INIT: type(1) | file_size(4, be) | file_name(rest, utf-8)
//! DATA: type(1) | sequence(4, be)  | crc32(4, be) | payload(<= MAX_PAYLOAD)
//! ACK:  type(1) | sequence(4, be)
//! ```

use std::path::Path;

/// Largest datagram either endpoint will ever send or accept.
pub const MAX_SEGMENT: usize = 1024;
/// type + sequence + crc32
pub const HEADER_DATA: usize = 9;
pub const MAX_PAYLOAD: usize = MAX_SEGMENT - HEADER_DATA;

/// Reserved sequence number that acknowledges INIT rather than a byte offset.
///
/// file_size is capped one below this so no legal offset can ever collide
/// with it (see the sentinel discussion in the design notes).
pub const INIT_SEQUENCE: u32 = u32::MAX;
pub const MAX_FILE_SIZE: u64 = (u32::MAX - 1) as u64;

const TYPE_INIT: u8 = 0;
const TYPE_DATA: u8 = 1;
const TYPE_ACK: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Init { file_size: u32, file_name: String },
    Data { sequence: u32, payload: Vec<u8> },
    Ack { sequence: u32 },
    Invalid,
}

/// Strip any directory components, keeping only the final path segment.
/// Used on both the encode side (defense in depth) and the decode side
/// (the receiver's actual safety boundary against path traversal).
pub fn basename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn encode_init(file_size: u64, file_name: &str) -> Vec<u8> {
    assert!(file_size <= MAX_FILE_SIZE, "file_size exceeds wire cap");

    let basename = basename(file_name);

    let mut buf = Vec::with_capacity(1 + 4 + basename.len());
    buf.push(TYPE_INIT);
    buf.extend_from_slice(&(file_size as u32).to_be_bytes());
    buf.extend_from_slice(basename.as_bytes());
    buf
}

pub fn encode_data(sequence: u32, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD);

    let crc = crc32fast::hash(payload);

    let mut buf = Vec::with_capacity(HEADER_DATA + payload.len());
    buf.push(TYPE_DATA);
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(&crc.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

pub fn encode_ack(sequence: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.push(TYPE_ACK);
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf
}

pub fn decode(bytes: &[u8]) -> Segment {
    let Some((&kind, rest)) = bytes.split_first() else {
        return Segment::Invalid;
    };

    match kind {
        TYPE_INIT => decode_init(rest),
        TYPE_DATA => decode_data(rest),
        TYPE_ACK => decode_ack(rest),
        _ => Segment::Invalid,
    }
}

fn decode_init(rest: &[u8]) -> Segment {
    if rest.len() < 4 {
        return Segment::Invalid;
    }

    let file_size = u32::from_be_bytes(rest[..4].try_into().unwrap());
    let file_name = match std::str::from_utf8(&rest[4..]) {
        Ok(s) => s,
        Err(_) => return Segment::Invalid,
    };

    Segment::Init {
        file_size,
        file_name: basename(file_name),
    }
}

fn decode_data(rest: &[u8]) -> Segment {
    if rest.len() < 8 {
        return Segment::Invalid;
    }

    let sequence = u32::from_be_bytes(rest[..4].try_into().unwrap());
    let claimed_crc = u32::from_be_bytes(rest[4..8].try_into().unwrap());
    let payload = &rest[8..];

    if crc32fast::hash(payload) != claimed_crc {
        return Segment::Invalid;
    }

    Segment::Data {
        sequence,
        payload: payload.to_vec(),
    }
}

fn decode_ack(rest: &[u8]) -> Segment {
    if rest.len() < 4 {
        return Segment::Invalid;
    }

    let sequence = u32::from_be_bytes(rest[..4].try_into().unwrap());
    Segment::Ack { sequence }
}
