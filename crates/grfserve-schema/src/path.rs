use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ARCHIVE_SEPARATOR: char = '\\';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("path escapes the resource root: '{0}'")]
    Traversal(String),
    #[error("path contains a NUL byte")]
    Nul,
}

/// A normalized, forward-slash separated path inside the virtual namespace.
///
/// Backslashes are accepted on input and treated as separators. Leading and
/// repeated separators are dropped; `.` and `..` segments are rejected so a
/// logical path can always be joined onto the overlay root safely. Case is
/// never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LogicalPath(String);

impl LogicalPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.contains('\0') {
            return Err(PathError::Nul);
        }

        let mut segments = Vec::new();
        for segment in raw.split(['/', ARCHIVE_SEPARATOR]) {
            match segment {
                "" => {}
                "." | ".." => return Err(PathError::Traversal(raw.to_owned())),
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The form archive engines index entries by: `/` replaced with `\`.
    pub fn to_archive_path(&self) -> String {
        self.0.replace('/', "\\")
    }

    /// Location of this path under a filesystem root.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.0.split('/'));
        path
    }

    /// Lowercased extension of the last segment, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.0.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LogicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
