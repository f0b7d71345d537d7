//! Crate-wide error type.
//!
//! Mirrors the grouping from the format specification: argument, I/O,
//! format, integrity, encryption and resource errors are distinct variants
//! rather than a single opaque string, so callers can match on the failure
//! instead of parsing a message.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EwfError {
    // --- Argument --------------------------------------------------------
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("value out of bounds: {0}")]
    OutOfBounds(String),
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    // --- I/O ---------------------------------------------------------------
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    // --- Format --------------------------------------------------------
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("section CRC mismatch in section {kind:?} at offset {offset}")]
    SectionCrcMismatch { kind: String, offset: u64 },
    #[error("table CRC mismatch (both table and table2 failed) at segment {segment}")]
    TableCrcMismatch { segment: u16 },
    #[error("truncated segment {segment}")]
    TruncatedSegment { segment: u16 },
    #[error("conflicting media descriptor: {0}")]
    ConflictingMediaDescriptor(String),
    #[error("unsupported section kind '{0}' for this format version")]
    UnsupportedSectionKind(String),

    // --- Integrity -------------------------------------------------------
    #[error("chunk integrity failure at chunk {chunk_index}")]
    ChunkIntegrityFailed { chunk_index: u64 },
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
    #[error("hash mismatch at close: {0}")]
    HashMismatch(String),

    // --- Encryption --------------------------------------------------------
    #[error("unsupported AES key size: {0} bits")]
    UnsupportedKeySize(usize),
    #[error("unsupported cipher mode")]
    UnsupportedMode,
    #[error("encryption key not set")]
    KeyNotSet,
    #[error("CCM IV too long: {0} bytes (max 14)")]
    IvTooLong(usize),
    #[error("CBC input length {0} is not a positive multiple of the block size")]
    LengthNotMultipleOfBlock(usize),
    #[error("decrypt integrity failure")]
    DecryptIntegrityFailed,

    // --- Resource ------------------------------------------------------
    #[error("handle pool cap reached with no evictable victim")]
    PoolExhausted,
    #[error("out of memory")]
    OutOfMemory,

    // --- Misc / state ----------------------------------------------------
    #[error("image is read-only")]
    ReadOnly,
    #[error("image is not open")]
    NotOpen,
}

pub type Result<T> = std::result::Result<T, EwfError>;
