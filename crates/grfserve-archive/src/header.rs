use crate::ArchiveError;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::Path;

/// Size of the fixed GRF header prefix.
pub const HEADER_LEN: usize = 46;

/// Compatibility signature at offset 0.
pub const MAGIC: &[u8; 15] = b"Master of Magic";

/// The only archive version the engines can read.
pub const SUPPORTED_VERSION: u32 = 0x200;

const MAGIC_RANGE: Range<usize> = 0..15;
const KEY_RANGE: Range<usize> = 15..29;
const VERSION_RANGE: Range<usize> = 42..46;

/// The three header fields the compatibility check looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub magic: [u8; 15],
    pub key: [u8; 14],
    pub version: u32,
}

impl ArchiveHeader {
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Self {
        let mut magic = [0u8; 15];
        magic.copy_from_slice(&bytes[MAGIC_RANGE]);
        let mut key = [0u8; 14];
        key.copy_from_slice(&bytes[KEY_RANGE]);
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[VERSION_RANGE]);
        Self {
            magic,
            key,
            version: u32::from_le_bytes(version),
        }
    }

    pub fn signature_matches(&self) -> bool {
        &self.magic == MAGIC
    }

    /// Any nonzero byte in the key segment means DES encryption.
    pub fn encrypted(&self) -> bool {
        self.key.iter().any(|&b| b != 0)
    }

    pub fn version_hex(&self) -> String {
        format_version(self.version)
    }
}

pub fn format_version(version: u32) -> String {
    format!("0x{version:X}")
}

/// Outcome of [`validate_header`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderVerdict {
    pub valid: bool,
    /// Hex version string, or `"unknown"` when the signature did not match.
    pub version: String,
    pub encrypted: bool,
    pub reason: String,
}

/// Classify a 46-byte header prefix.
///
/// A signature mismatch fails immediately: the remaining offsets of a
/// foreign file are meaningless.
pub fn validate_header(bytes: &[u8; HEADER_LEN]) -> HeaderVerdict {
    let header = ArchiveHeader::from_bytes(bytes);

    if !header.signature_matches() {
        return HeaderVerdict {
            valid: false,
            version: "unknown".to_owned(),
            encrypted: false,
            reason: "invalid signature - not a GRF archive".to_owned(),
        };
    }

    let version = header.version_hex();
    let encrypted = header.encrypted();
    let version_ok = header.version == SUPPORTED_VERSION;
    let expected = format_version(SUPPORTED_VERSION);

    let reason = match (version_ok, encrypted) {
        (true, false) => format!("header compatible (version {version}, no encryption)"),
        (false, false) => {
            format!("version {version} is not supported (expected: {expected})")
        }
        (true, true) => "DES encryption detected (key segment is not all zero)".to_owned(),
        (false, true) => format!(
            "version {version} is not supported (expected: {expected}) and DES encryption detected"
        ),
    };

    HeaderVerdict {
        valid: version_ok && !encrypted,
        version,
        encrypted,
        reason,
    }
}

/// Read the header prefix from offset 0 of an archive file.
pub fn read_header(path: &Path) -> Result<[u8; HEADER_LEN], ArchiveError> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; HEADER_LEN];
    file.read_exact(&mut buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ArchiveError::TruncatedHeader
        } else {
            ArchiveError::Io(e)
        }
    })?;
    Ok(buf)
}

/// Hex dump of a byte slice, 16 bytes per line, with an ASCII column.
pub fn hex_dump(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let hex = chunk
                .iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ");
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        char::from(b)
                    } else {
                        '.'
                    }
                })
                .collect();
            format!("Offset {:02}: {hex:<48}  {ascii}", i * 16)
        })
        .collect()
}

/// One byte of the key segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyByte {
    pub offset: usize,
    pub value: u8,
    pub zero: bool,
}

/// Field-by-field breakdown of a header, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderDump {
    pub hex: Vec<String>,
    pub magic: String,
    pub signature_ok: bool,
    pub key: Vec<KeyByte>,
    pub table_offset: u32,
    pub seed: u32,
    pub raw_file_count: u32,
    pub version: String,
    pub verdict: HeaderVerdict,
}

impl HeaderDump {
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Self {
        let header = ArchiveHeader::from_bytes(bytes);
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        Self {
            hex: hex_dump(bytes),
            magic: String::from_utf8_lossy(&header.magic).into_owned(),
            signature_ok: header.signature_matches(),
            key: header
                .key
                .iter()
                .enumerate()
                .map(|(i, &value)| KeyByte {
                    offset: KEY_RANGE.start + i,
                    value,
                    zero: value == 0,
                })
                .collect(),
            table_offset: u32_at(30),
            seed: u32_at(34),
            raw_file_count: u32_at(38),
            version: header.version_hex(),
            verdict: validate_header(bytes),
        }
    }

    pub fn nonzero_key_bytes(&self) -> usize {
        self.key.iter().filter(|k| !k.zero).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::stub_header;

    #[test]
    fn clean_header_is_valid() {
        let verdict = validate_header(&stub_header(SUPPORTED_VERSION, [0; 14]));
        assert!(verdict.valid);
        assert!(!verdict.encrypted);
        assert_eq!(verdict.version, "0x200");
    }

    #[test]
    fn any_nonzero_key_byte_means_encrypted() {
        for i in 0..14 {
            let mut key = [0u8; 14];
            key[i] = 0x5A;
            let verdict = validate_header(&stub_header(SUPPORTED_VERSION, key));
            assert!(!verdict.valid, "byte {i}");
            assert!(verdict.encrypted, "byte {i}");
            assert!(verdict.reason.contains("encryption"), "byte {i}");
        }
    }

    #[test]
    fn wrong_version_is_reported() {
        for version in [0x103, 0x300, 0] {
            let verdict = validate_header(&stub_header(version, [0; 14]));
            assert!(!verdict.valid);
            assert!(!verdict.encrypted);
            assert!(verdict.reason.contains("version"));
            assert_eq!(verdict.version, format_version(version));
        }
    }

    #[test]
    fn wrong_version_and_encryption_mentions_both() {
        let verdict = validate_header(&stub_header(0x103, [1; 14]));
        assert!(!verdict.valid);
        assert!(verdict.encrypted);
        assert!(verdict.reason.contains("version"));
        assert!(verdict.reason.contains("encryption"));
    }

    #[test]
    fn bad_signature_fails_fast() {
        let mut bytes = stub_header(SUPPORTED_VERSION, [0xFF; 14]);
        bytes[0] = b'X';
        let verdict = validate_header(&bytes);
        assert!(!verdict.valid);
        assert_eq!(verdict.version, "unknown");
        assert!(!verdict.encrypted);
        assert!(verdict.reason.contains("invalid signature"));
    }

    #[test]
    fn version_is_little_endian() {
        let header = ArchiveHeader::from_bytes(&stub_header(0x0102_0304, [0; 14]));
        assert_eq!(header.version, 0x0102_0304);
        assert_eq!(header.version_hex(), "0x1020304");
    }

    #[test]
    fn read_header_rejects_short_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.grf");
        std::fs::write(&path, b"Master of Magic").unwrap();
        assert!(matches!(
            read_header(&path),
            Err(ArchiveError::TruncatedHeader)
        ));
    }

    #[test]
    fn read_header_reads_prefix_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.grf");
        let mut content = stub_header(SUPPORTED_VERSION, [0; 14]).to_vec();
        content.extend_from_slice(&[0xAB; 64]);
        std::fs::write(&path, &content).unwrap();
        let bytes = read_header(&path).unwrap();
        assert!(validate_header(&bytes).valid);
    }

    #[test]
    fn hex_dump_covers_all_bytes() {
        let lines = hex_dump(&stub_header(SUPPORTED_VERSION, [0; 14]));
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Offset 00: 4D 61 73 74"));
        assert!(lines[0].contains("Master of Magic"));
        assert!(lines[2].starts_with("Offset 32:"));
    }

    #[test]
    fn dump_reports_each_key_byte() {
        let mut key = [0u8; 14];
        key[0] = 0x11;
        key[13] = 0x22;
        let dump = HeaderDump::from_bytes(&stub_header(SUPPORTED_VERSION, key));
        assert!(dump.signature_ok);
        assert_eq!(dump.magic, "Master of Magic");
        assert_eq!(dump.key.len(), 14);
        assert_eq!(dump.key[0].offset, 15);
        assert_eq!(dump.key[13].offset, 28);
        assert_eq!(dump.nonzero_key_bytes(), 2);
        assert!(dump.verdict.encrypted);
        assert_eq!(dump.version, "0x200");
    }
}
