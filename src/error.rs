use std::io;

use thiserror::Error;

use crate::format::Arch;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("out of memory allocating {len} bytes")]
    OutOfMemory { len: usize },

    #[error("invalid snapshot magic")]
    InvalidMagic,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown architecture tag {0}")]
    UnknownArch(u16),

    #[error("no register layout registered for architecture {0}")]
    UnsupportedArch(Arch),

    #[error("register blob length mismatch for {arch} (expected {expected} bytes, found {found} bytes)")]
    RegisterLenMismatch {
        arch: Arch,
        expected: usize,
        found: usize,
    },

    #[error("truncated input: need {needed} bytes at offset {offset}, {remaining} remaining")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),

    #[error("snapshot has no memory records")]
    NoMemoryRecords,

    #[error("snapshot has no register record")]
    NoRegisterRecord,

    #[error("deflate compression failed: {0}")]
    Compress(#[source] io::Error),

    #[error("deflate decompression failed: {0}")]
    Decompress(#[source] io::Error),
}
