//! Manifest parsing and logical path handling for grfserve.
//!
//! This crate defines the schema layer: the INI-like `DATA.INI` manifest that
//! lists archives in priority order (`Manifest`), the narrow archive-name
//! extractor used at startup validation (`extract_archive_names`), and the
//! normalized forward-slash `LogicalPath` shared by the overlay and the
//! archive registry.

pub mod manifest;
pub mod path;

pub use manifest::{
    extract_archive_names, parse_manifest_file, parse_manifest_str, Manifest, ManifestError,
    Section, ARCHIVE_EXTENSION, DATA_SECTION,
};
pub use path::{LogicalPath, PathError};
