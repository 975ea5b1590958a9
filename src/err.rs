use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no response from peer after {0:?}, giving up")]
    TerminalTimeout(std::time::Duration),

    #[error("peer refused the connection")]
    ConnectionRefused,

    #[error("transfer ended after {received} of {announced} announced bytes")]
    TruncatedTransfer { received: u64, announced: u64 },

    #[error("file size {0} exceeds the maximum representable offset")]
    FileTooLarge(u64),
}
