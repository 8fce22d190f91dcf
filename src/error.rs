//! Error taxonomy for the receive pipeline.
//!
//! Every stage drops the offending packet and continues on error; nothing
//! in this crate aborts the ingestion loop. The taxonomy exists so callers
//! can log, count, or (in tests) assert on *why* a packet was dropped.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing or reassembling the carousel protocol.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Fewer bytes were available than a fixed-size header requires.
    #[error("malformed packet: too short ({got} < {want} bytes)")]
    MalformedShort {
        /// Bytes actually available.
        got: usize,
        /// Bytes required.
        want: usize,
    },

    /// The `length` field of an LDP datagram exceeds the bytes available.
    #[error("malformed LDP packet: length {length} exceeds available {available} bytes")]
    MalformedLength {
        /// Declared length.
        length: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// CRC-32/MPEG-2 residue over `data[0..length)` was non-zero.
    #[error("malformed LDP packet: CRC check failed")]
    MalformedCRC,

    /// The packet-level erasure decoder did not receive exactly `k` shares.
    #[error("packet FEC decode failed: got {got} shares, need {k}")]
    DecodeFailure {
        /// Shares actually available.
        got: usize,
        /// Shares required to decode.
        k: usize,
    },

    /// An LDPC repair pass completed without resolving every missing block.
    #[error("reconstruction stalled: {missing} data block(s) still missing")]
    ReconstructionStalled {
        /// Number of data blocks still empty.
        missing: usize,
    },

    /// Assembled file length did not match the descriptor's `size`.
    #[error("size mismatch: assembled {got} bytes, expected {want}")]
    SizeMismatch {
        /// Bytes actually assembled.
        got: usize,
        /// Bytes declared in the descriptor.
        want: usize,
    },

    /// Assembled file's SHA-256 did not match the descriptor's `hash`.
    #[error("hash mismatch for file {path}")]
    HashMismatch {
        /// Path the file was announced under.
        path: String,
    },

    /// Not all data blocks were present and no FEC scheme could help.
    #[error("missing {missing} of {total} data blocks")]
    MissingBlocks {
        /// Blocks still missing.
        missing: usize,
        /// Total blocks in the file.
        total: usize,
    },

    /// A required child element was absent from a file descriptor's XML.
    #[error("file descriptor missing required field `{0}`")]
    MissingXmlField(&'static str),

    /// A `fec` attribute could not be parsed as a known FEC spec.
    #[error("invalid FEC spec: {0}")]
    InvalidFecSpec(String),

    /// Writing a reconstructed file to disk failed.
    #[error("failed to write file {path}: {source}")]
    WriteFailure {
        /// Path the write was attempted at.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure (socket, file read, etc).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
