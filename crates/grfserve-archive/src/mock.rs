//! In-memory archive engine.
//!
//! Archives are looked up by file name, so a registry or validator pointed at
//! `resources/data.grf` gets whatever was registered as `data.grf`. The header
//! gate still reads the real file, which is what [`write_stub_archive`] is for.

use crate::engine::{ArchiveEngine, EngineFactory};
use crate::grf::FLAG_FILE;
use crate::header::{HEADER_LEN, MAGIC, SUPPORTED_VERSION};
use crate::ArchiveError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
enum LoadBehavior {
    #[default]
    Succeed,
    Fail(String),
    Delay(Duration),
}

#[derive(Debug, Clone, Default)]
struct MemoryArchive {
    entries: BTreeMap<String, Vec<u8>>,
    behavior: LoadBehavior,
    lookups: Arc<AtomicUsize>,
}

#[derive(Debug, Default)]
pub struct MemoryEngineFactory {
    archives: HashMap<String, MemoryArchive>,
    unavailable: bool,
}

impl MemoryEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an archive with no entries.
    #[must_use]
    pub fn with_archive(mut self, archive: &str) -> Self {
        self.archives.entry(archive.to_owned()).or_default();
        self
    }

    /// Add one entry, creating the archive if needed. `entry` is backslash separated.
    #[must_use]
    pub fn with_entry(mut self, archive: &str, entry: &str, data: impl AsRef<[u8]>) -> Self {
        self.archives
            .entry(archive.to_owned())
            .or_default()
            .entries
            .insert(entry.to_owned(), data.as_ref().to_vec());
        self
    }

    #[must_use]
    pub fn with_failing_archive(mut self, archive: &str, reason: &str) -> Self {
        self.archives.entry(archive.to_owned()).or_default().behavior =
            LoadBehavior::Fail(reason.to_owned());
        self
    }

    /// Register an archive whose `load` blocks for `delay`.
    #[must_use]
    pub fn with_slow_archive(mut self, archive: &str, delay: Duration) -> Self {
        self.archives.entry(archive.to_owned()).or_default().behavior =
            LoadBehavior::Delay(delay);
        self
    }

    /// Report the engine as missing from this build.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// How many `get_file` calls engines opened for `archive` have served.
    pub fn lookups(&self, archive: &str) -> usize {
        self.archives
            .get(archive)
            .map_or(0, |a| a.lookups.load(Ordering::SeqCst))
    }
}

impl EngineFactory for MemoryEngineFactory {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn available(&self) -> bool {
        !self.unavailable
    }

    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveEngine>, ArchiveError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let archive = self
            .archives
            .get(&name)
            .ok_or_else(|| ArchiveError::Corrupt(format!("no in-memory archive named '{name}'")))?;
        Ok(Box::new(MemoryEngine {
            archive: archive.clone(),
            loaded: false,
        }))
    }
}

pub struct MemoryEngine {
    archive: MemoryArchive,
    loaded: bool,
}

impl ArchiveEngine for MemoryEngine {
    fn load(&mut self) -> Result<(), ArchiveError> {
        match &self.archive.behavior {
            LoadBehavior::Succeed => {}
            LoadBehavior::Fail(reason) => return Err(ArchiveError::Corrupt(reason.clone())),
            LoadBehavior::Delay(delay) => std::thread::sleep(*delay),
        }
        self.loaded = true;
        Ok(())
    }

    fn get_file(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        if !self.loaded {
            return Err(ArchiveError::NotLoaded);
        }
        self.archive.lookups.fetch_add(1, Ordering::SeqCst);
        self.archive
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_owned()))
    }

    fn entries(&self) -> Vec<String> {
        if !self.loaded {
            return Vec::new();
        }
        self.archive.entries.keys().cloned().collect()
    }
}

/// A 46-byte header with the given version and key segment.
pub fn stub_header(version: u32, key: [u8; 14]) -> [u8; HEADER_LEN] {
    let mut bytes = [0u8; HEADER_LEN];
    bytes[..15].copy_from_slice(MAGIC);
    bytes[15..29].copy_from_slice(&key);
    bytes[42..].copy_from_slice(&version.to_le_bytes());
    bytes
}

/// Write a header-only archive file, enough to pass or fail the header gate.
pub fn write_stub_archive(path: &Path, version: u32, key: [u8; 14]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, stub_header(version, key))
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writes into a Vec cannot fail.
    let _ = enc.write_all(data);
    enc.finish().unwrap_or_default()
}

/// Assemble an unencrypted GRF 0x200 image from `(name, data, flags)` entries.
///
/// Names are raw bytes, backslash separated, as stored on disk.
pub fn build_grf(entries: &[(&[u8], &[u8], u8)]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut table = Vec::new();
    for (name, data, flags) in entries {
        let compressed = deflate(data);
        let offset = body.len() as u32;
        body.extend_from_slice(&compressed);
        table.extend_from_slice(name);
        table.push(0);
        table.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        table.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        table.extend_from_slice(&(data.len() as u32).to_le_bytes());
        table.push(*flags);
        table.extend_from_slice(&offset.to_le_bytes());
    }
    let packed_table = deflate(&table);

    let mut header = [0u8; HEADER_LEN];
    header[..15].copy_from_slice(MAGIC);
    header[30..34].copy_from_slice(&(body.len() as u32).to_le_bytes());
    header[38..42].copy_from_slice(&(entries.len() as u32 + 7).to_le_bytes());
    header[42..46].copy_from_slice(&SUPPORTED_VERSION.to_le_bytes());

    let mut out = header.to_vec();
    out.extend_from_slice(&body);
    out.extend_from_slice(&(packed_table.len() as u32).to_le_bytes());
    out.extend_from_slice(&(table.len() as u32).to_le_bytes());
    out.extend_from_slice(&packed_table);
    out
}

/// Write a GRF archive holding plain file entries.
pub fn write_grf_archive(path: &Path, entries: &[(&str, &[u8])]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let entries: Vec<(&[u8], &[u8], u8)> = entries
        .iter()
        .map(|(name, data)| (name.as_bytes(), *data, FLAG_FILE))
        .collect();
    std::fs::write(path, build_grf(&entries))
}
