//! Reader for unencrypted GRF 0x200 archives.
//!
//! Layout: a 46-byte header (`Master of Magic\0`, 14-byte key, table offset,
//! seed, raw file count, version), file bodies, then a zlib-compressed file
//! table at `46 + table_offset`. Entry names are stored as raw bytes
//! (usually CP949); they are mapped byte-for-char so names round-trip exactly
//! in the Latin-1 form web clients request them in.

use crate::engine::{ArchiveEngine, EngineFactory};
use crate::header::{validate_header, HEADER_LEN};
use crate::ArchiveError;
use flate2::read::ZlibDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

const TABLE_OFFSET_AT: usize = 30;
const SEED_AT: usize = 34;
const FILE_COUNT_AT: usize = 38;
/// Bytes following the NUL-terminated name of a table entry.
const ENTRY_TAIL_LEN: usize = 17;

/// Entry flag bits.
pub const FLAG_FILE: u8 = 0x01;
pub const FLAG_MIXCRYPT: u8 = 0x02;
pub const FLAG_DES: u8 = 0x04;

#[derive(Debug, Clone, Copy)]
struct GrfEntry {
    compressed_len: u32,
    real_len: u32,
    flags: u8,
    offset: u32,
}

fn le_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn decode_name(raw: &[u8]) -> String {
    raw.iter().map(|&b| char::from(b)).collect()
}

const INITIAL_INFLATE_CAPACITY: u32 = 1 << 20;

fn inflate(compressed: &[u8], expected_len: u32) -> Result<Vec<u8>, ArchiveError> {
    // Declared sizes come from the file; reserve at most 1 MiB up front.
    let mut out = Vec::with_capacity(expected_len.min(INITIAL_INFLATE_CAPACITY) as usize);
    ZlibDecoder::new(compressed)
        .take(u64::from(expected_len) + 1)
        .read_to_end(&mut out)
        .map_err(|e| ArchiveError::Corrupt(format!("zlib stream: {e}")))?;
    if out.len() != expected_len as usize {
        return Err(ArchiveError::Corrupt(format!(
            "inflated {} bytes, expected {expected_len}",
            out.len()
        )));
    }
    Ok(out)
}

fn parse_table(table: &[u8]) -> Result<HashMap<String, GrfEntry>, ArchiveError> {
    let mut entries = HashMap::new();
    let mut pos = 0;

    while pos < table.len() {
        let name_len = table[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ArchiveError::Corrupt("unterminated entry name".to_owned()))?;
        let name = decode_name(&table[pos..pos + name_len]);
        pos += name_len + 1;

        let tail = table
            .get(pos..pos + ENTRY_TAIL_LEN)
            .ok_or_else(|| ArchiveError::Corrupt(format!("truncated entry '{name}'")))?;
        let compressed_len = le_u32(tail, 0).unwrap_or_default();
        let real_len = le_u32(tail, 8).unwrap_or_default();
        let flags = tail[12];
        let offset = le_u32(tail, 13).unwrap_or_default();
        pos += ENTRY_TAIL_LEN;

        if flags & FLAG_FILE == 0 {
            continue;
        }
        entries.insert(
            name,
            GrfEntry {
                compressed_len,
                real_len,
                flags,
                offset,
            },
        );
    }

    Ok(entries)
}

pub struct GrfEngine {
    path: PathBuf,
    file: Mutex<File>,
    file_len: u64,
    entries: HashMap<String, GrfEntry>,
    loaded: bool,
}

impl GrfEngine {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            file_len,
            entries: HashMap::new(),
            loaded: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_span(&self, start: u64, len: u64, what: &str) -> Result<(), ArchiveError> {
        match start.checked_add(len) {
            Some(end) if end <= self.file_len => Ok(()),
            _ => Err(ArchiveError::Corrupt(format!(
                "{what} extends past end of file ({} bytes)",
                self.file_len
            ))),
        }
    }
}

fn poisoned<T>(_: T) -> ArchiveError {
    ArchiveError::Io(std::io::Error::other("archive file lock poisoned"))
}

impl ArchiveEngine for GrfEngine {
    fn load(&mut self) -> Result<(), ArchiveError> {
        let mut header = [0u8; HEADER_LEN];
        {
            let file = self.file.get_mut().map_err(poisoned)?;
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)
                .map_err(|_| ArchiveError::TruncatedHeader)?;
        }

        let verdict = validate_header(&header);
        if !verdict.valid {
            return Err(ArchiveError::Incompatible(verdict.reason));
        }

        let table_offset = u64::from(le_u32(&header, TABLE_OFFSET_AT).unwrap_or_default());
        let seed = le_u32(&header, SEED_AT).unwrap_or_default();
        let raw_count = le_u32(&header, FILE_COUNT_AT).unwrap_or_default();
        let declared = raw_count
            .checked_sub(seed)
            .and_then(|n| n.checked_sub(7))
            .ok_or_else(|| ArchiveError::Corrupt("invalid file count".to_owned()))?;

        let table_start = HEADER_LEN as u64 + table_offset;
        self.check_span(table_start, 8, "file table header")?;

        let (compressed, table_len) = {
            let file = self.file.get_mut().map_err(poisoned)?;
            file.seek(SeekFrom::Start(table_start))?;
            let mut sizes = [0u8; 8];
            file.read_exact(&mut sizes)?;
            let compressed_len = le_u32(&sizes, 0).unwrap_or_default();
            let table_len = le_u32(&sizes, 4).unwrap_or_default();
            (compressed_len, table_len)
        };
        self.check_span(table_start + 8, u64::from(compressed), "file table")?;

        let mut raw_table = vec![0u8; compressed as usize];
        {
            let file = self.file.get_mut().map_err(poisoned)?;
            file.read_exact(&mut raw_table)?;
        }
        let table = inflate(&raw_table, table_len)?;
        let entries = parse_table(&table)?;

        if entries.len() != declared as usize {
            warn!(
                "{}: header declares {declared} files, table holds {} file entries",
                self.path.display(),
                entries.len()
            );
        }
        debug!("{}: {} entries", self.path.display(), entries.len());

        self.entries = entries;
        self.loaded = true;
        Ok(())
    }

    fn get_file(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        if !self.loaded {
            return Err(ArchiveError::NotLoaded);
        }
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_owned()))?;
        if entry.flags & (FLAG_MIXCRYPT | FLAG_DES) != 0 {
            return Err(ArchiveError::Unsupported(format!(
                "entry '{name}' is DES-encrypted"
            )));
        }

        let start = HEADER_LEN as u64 + u64::from(entry.offset);
        self.check_span(start, u64::from(entry.compressed_len), name)?;

        let mut compressed = vec![0u8; entry.compressed_len as usize];
        {
            let mut file = self.file.lock().map_err(poisoned)?;
            file.seek(SeekFrom::Start(start))?;
            file.read_exact(&mut compressed)?;
        }
        inflate(&compressed, entry.real_len)
    }

    fn entries(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Produces [`GrfEngine`]s for files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrfEngineFactory;

impl GrfEngineFactory {
    pub fn new() -> Self {
        Self
    }
}

/// Inflate a known zlib stream to confirm the decompressor works.
// zlib encoding of b"grf"
const ZLIB_SAMPLE: [u8; 11] = [
    0x78, 0x9c, 0x4b, 0x2f, 0x4a, 0x03, 0x00, 0x02, 0x82, 0x01, 0x40,
];

pub fn zlib_self_test() -> bool {
    inflate(&ZLIB_SAMPLE, 3).is_ok_and(|out| out == b"grf")
}

impl EngineFactory for GrfEngineFactory {
    fn name(&self) -> &'static str {
        "grf"
    }

    fn available(&self) -> bool {
        zlib_self_test()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveEngine>, ArchiveError> {
        Ok(Box::new(GrfEngine::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::build_grf;

    fn write_grf(dir: &Path, entries: &[(&[u8], &[u8], u8)]) -> PathBuf {
        let path = dir.join("data.grf");
        std::fs::write(&path, build_grf(entries)).unwrap();
        path
    }

    #[test]
    fn loads_table_and_extracts_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_grf(
            dir.path(),
            &[
                (b"data\\a.txt", b"alpha", FLAG_FILE),
                (b"data\\sub\\b.txt", b"bravo bravo bravo", FLAG_FILE),
            ],
        );
        let mut engine = GrfEngineFactory.open(&path).unwrap();
        engine.load().unwrap();
        assert_eq!(engine.entry_count(), 2);
        assert_eq!(engine.get_file("data\\a.txt").unwrap(), b"alpha");
        assert_eq!(
            engine.get_file("data\\sub\\b.txt").unwrap(),
            b"bravo bravo bravo"
        );
        assert!(matches!(
            engine.get_file("data\\missing.txt"),
            Err(ArchiveError::EntryNotFound(_))
        ));
    }

    #[test]
    fn directory_entries_are_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_grf(
            dir.path(),
            &[(b"data\\dir", b"", 0), (b"data\\dir\\f.txt", b"f", FLAG_FILE)],
        );
        let mut engine = GrfEngine::open(&path).unwrap();
        engine.load().unwrap();
        assert_eq!(engine.entries(), vec!["data\\dir\\f.txt".to_owned()]);
    }

    #[test]
    fn high_bytes_in_names_map_to_latin1() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_grf(dir.path(), &[(b"data\\\xC0\xAF.bmp", b"bmp", FLAG_FILE)]);
        let mut engine = GrfEngine::open(&path).unwrap();
        engine.load().unwrap();
        assert_eq!(engine.get_file("data\\À¯.bmp").unwrap(), b"bmp");
    }

    #[test]
    fn des_entries_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_grf(dir.path(), &[(b"data\\x.txt", b"x", FLAG_FILE | FLAG_DES)]);
        let mut engine = GrfEngine::open(&path).unwrap();
        engine.load().unwrap();
        assert!(matches!(
            engine.get_file("data\\x.txt"),
            Err(ArchiveError::Unsupported(_))
        ));
    }

    #[test]
    fn get_before_load_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_grf(dir.path(), &[(b"a", b"a", FLAG_FILE)]);
        let engine = GrfEngine::open(&path).unwrap();
        assert!(matches!(engine.get_file("a"), Err(ArchiveError::NotLoaded)));
    }

    #[test]
    fn wrong_version_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = build_grf(&[(b"a", b"a", FLAG_FILE)]);
        image[42..46].copy_from_slice(&0x103u32.to_le_bytes());
        let path = dir.path().join("old.grf");
        std::fs::write(&path, image).unwrap();
        let mut engine = GrfEngine::open(&path).unwrap();
        assert!(matches!(engine.load(), Err(ArchiveError::Incompatible(_))));
    }

    #[test]
    fn table_offset_past_eof_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = build_grf(&[(b"a", b"a", FLAG_FILE)]);
        image[30..34].copy_from_slice(&u32::MAX.to_le_bytes());
        let path = dir.path().join("bad.grf");
        std::fs::write(&path, image).unwrap();
        let mut engine = GrfEngine::open(&path).unwrap();
        assert!(matches!(engine.load(), Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn oversized_declared_length_is_corrupt() {
        let err = inflate(&ZLIB_SAMPLE, u32::MAX).unwrap_err();
        match err {
            ArchiveError::Corrupt(msg) => assert!(msg.contains("inflated 3 bytes"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn declared_length_shorter_than_stream_is_corrupt() {
        assert!(matches!(
            inflate(&ZLIB_SAMPLE, 2),
            Err(ArchiveError::Corrupt(_))
        ));
    }

    #[test]
    fn zlib_self_test_passes() {
        assert!(zlib_self_test());
        assert!(GrfEngineFactory.available());
    }
}
