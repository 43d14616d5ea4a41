use grfserve_schema::LogicalPath;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writable directory that shadows the archives.
///
/// Entries never expire and are never evicted. Writes go through a temp file
/// in the destination directory and an atomic rename, so concurrent writers of
/// the same path leave one complete file behind.
#[derive(Debug, Clone)]
pub struct OverlayCache {
    root: PathBuf,
}

impl OverlayCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, path: &LogicalPath) -> PathBuf {
        path.to_fs_path(&self.root)
    }

    /// Content of the overlay file for `path`, or `None` when there is none.
    pub fn read(&self, path: &LogicalPath) -> std::io::Result<Option<Vec<u8>>> {
        let fs_path = self.path_for(path);
        if !fs_path.is_file() {
            return Ok(None);
        }
        std::fs::read(&fs_path).map(Some)
    }

    pub fn store(&self, path: &LogicalPath, data: &[u8]) -> std::io::Result<PathBuf> {
        let dest = self.path_for(path);
        let parent = dest.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        Ok(dest)
    }
}
