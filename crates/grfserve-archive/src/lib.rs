//! Archive access for grfserve.
//!
//! This crate owns everything that touches archive files: the fixed 46-byte
//! GRF header check (`validate_header`), the pluggable `ArchiveEngine` /
//! `EngineFactory` seam with a zlib-backed GRF 0x200 reader and an in-memory
//! engine, and the `ArchiveRegistry` that opens the manifest's archives in
//! priority order and answers first-match lookups across them.

pub mod engine;
pub mod grf;
pub mod header;
pub mod mock;
pub mod registry;

pub use engine::{load_with_timeout, ArchiveEngine, EngineFactory, LoadReport};
pub use grf::{GrfEngine, GrfEngineFactory};
pub use header::{
    hex_dump, read_header, validate_header, ArchiveHeader, HeaderDump, HeaderVerdict, KeyByte,
    HEADER_LEN, MAGIC, SUPPORTED_VERSION,
};
pub use mock::{MemoryEngine, MemoryEngineFactory};
pub use registry::{ArchiveDescriptor, ArchiveRegistry};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive header is shorter than {HEADER_LEN} bytes")]
    TruncatedHeader,
    #[error("incompatible archive: {0}")]
    Incompatible(String),
    #[error("archive is not loaded")]
    NotLoaded,
    #[error("entry not found: {0}")]
    EntryNotFound(String),
    #[error("corrupt archive: {0}")]
    Corrupt(String),
    #[error("unsupported archive feature: {0}")]
    Unsupported(String),
    #[error("archive load timed out after {0:?}")]
    Timeout(Duration),
    #[error("archive engine '{0}' is not available")]
    EngineUnavailable(String),
}
