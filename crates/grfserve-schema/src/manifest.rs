use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Canonical name of the section that lists archives in priority order.
pub const DATA_SECTION: &str = "Data";

/// File extension of archives accepted by the narrow extractor.
pub const ARCHIVE_EXTENSION: &str = ".grf";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest declares no archives in its [{DATA_SECTION}] section")]
    NoArchives,
}

/// Integer-keyed entries of one manifest section.
///
/// Keys may be sparse. Iteration is always in ascending key order, which is
/// the archive priority order for the `[Data]` section.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Section {
    entries: BTreeMap<u32, String>,
}

impl Section {
    pub fn get(&self, key: u32) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: u32, value: String) {
        self.entries.insert(key, value);
    }
}

/// Parsed `DATA.INI`-style manifest.
///
/// Entries that appear before any section header land in [`root`](Self::root).
/// The reserved `[Data]` section is matched case-insensitively; every other
/// section keeps its name verbatim.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Manifest {
    root: Section,
    sections: BTreeMap<String, Section>,
}

impl Manifest {
    pub fn root(&self) -> &Section {
        &self.root
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(&canonical_section_name(name))
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Archive file names from the `[Data]` section, highest priority first.
    pub fn archive_names(&self) -> Vec<String> {
        self.sections
            .get(DATA_SECTION)
            .map(|s| s.values().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Like [`archive_names`](Self::archive_names) but fails when the list is empty.
    pub fn require_archives(&self) -> Result<Vec<String>, ManifestError> {
        let names = self.archive_names();
        if names.is_empty() {
            return Err(ManifestError::NoArchives);
        }
        Ok(names)
    }
}

fn canonical_section_name(name: &str) -> String {
    if name.eq_ignore_ascii_case(DATA_SECTION) {
        DATA_SECTION.to_owned()
    } else {
        name.to_owned()
    }
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Split a `key = value` line. Keys are restricted to word characters, dots and dashes.
fn split_param(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(is_key_char) {
        return None;
    }
    Some((key, value.trim()))
}

fn section_header(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

/// Parse manifest text. Never fails: malformed lines are ignored.
///
/// Entries whose key is not an unsigned integer are skipped.
pub fn parse_manifest_str(input: &str) -> Manifest {
    let mut manifest = Manifest::default();
    let mut current: Option<String> = None;

    for line in input.split(['\r', '\n']) {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }

        if let Some((key, value)) = split_param(line) {
            let Ok(index) = key.parse::<u32>() else {
                debug!("manifest: skipping non-numeric key '{key}'");
                continue;
            };
            let target = match &current {
                Some(name) => manifest.sections.entry(name.clone()).or_default(),
                None => &mut manifest.root,
            };
            target.insert(index, value.to_owned());
        } else if let Some(name) = section_header(line) {
            let name = canonical_section_name(name);
            manifest.sections.entry(name.clone()).or_default();
            current = Some(name);
        }
    }

    manifest
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    Ok(parse_manifest_str(&content))
}

/// Collect archive names from the `[Data]` section in declaration order,
/// keeping only values that end in `extension` (case-insensitive).
///
/// Used by startup validation, which cares about every declared file rather
/// than the index layout, so keys are not interpreted.
pub fn extract_archive_names(content: &str, extension: &str) -> Vec<String> {
    let extension = extension.to_ascii_lowercase();
    let mut names = Vec::new();
    let mut in_data = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_data = section_header(line).is_some_and(|n| n.eq_ignore_ascii_case(DATA_SECTION));
            continue;
        }
        if !in_data {
            continue;
        }
        if let Some((_, value)) = line.split_once('=') {
            let value = value.trim();
            if !value.is_empty() && value.to_ascii_lowercase().ends_with(&extension) {
                names.push(value.to_owned());
            }
        }
    }

    names
}
