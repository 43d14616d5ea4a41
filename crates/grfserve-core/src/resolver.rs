use crate::overlay::OverlayCache;
use crate::CoreError;
use grfserve_archive::ArchiveRegistry;
use grfserve_schema::LogicalPath;
use regex::RegexBuilder;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolverOptions {
    /// Persist archive hits into the overlay.
    pub auto_extract: bool,
    pub enable_search: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            auto_extract: true,
            enable_search: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "archive", rename_all = "lowercase")]
pub enum ResolvedSource {
    Overlay,
    Archive(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: LogicalPath,
    pub bytes: Vec<u8>,
    pub source: ResolvedSource,
}

/// Answers lookups against the overlay first, then the archives in priority order.
#[derive(Debug, Clone)]
pub struct ResourceResolver {
    registry: Arc<ArchiveRegistry>,
    overlay: OverlayCache,
    options: ResolverOptions,
}

impl ResourceResolver {
    pub fn new(registry: Arc<ArchiveRegistry>, overlay: OverlayCache, options: ResolverOptions) -> Self {
        Self {
            registry,
            overlay,
            options,
        }
    }

    pub fn options(&self) -> ResolverOptions {
        self.options
    }

    pub fn overlay(&self) -> &OverlayCache {
        &self.overlay
    }

    pub fn registry(&self) -> &ArchiveRegistry {
        &self.registry
    }

    /// Resolve `raw` to content and its origin.
    ///
    /// A malformed path is an error. A path found nowhere is `Ok(None)`.
    pub fn resolve(&self, raw: &str) -> Result<Option<ResolvedFile>, CoreError> {
        let path = LogicalPath::parse(raw)?;

        match self.overlay.read(&path) {
            Ok(Some(bytes)) => {
                debug!("{path}: served from overlay");
                return Ok(Some(ResolvedFile {
                    path,
                    bytes,
                    source: ResolvedSource::Overlay,
                }));
            }
            Ok(None) => {}
            Err(e) => warn!("{path}: overlay read failed, falling back to archives: {e}"),
        }

        let Some((archive, bytes)) = self.registry.find_file_with_source(&path) else {
            debug!("{path}: not found");
            return Ok(None);
        };
        let source = ResolvedSource::Archive(archive.to_owned());

        if self.options.auto_extract {
            match self.overlay.store(&path, &bytes) {
                Ok(dest) => debug!("{path}: extracted to {}", dest.display()),
                Err(e) => warn!("{path}: failed to write overlay copy: {e}"),
            }
        }

        Ok(Some(ResolvedFile {
            path,
            bytes,
            source,
        }))
    }

    pub fn get_file(&self, raw: &str) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(self.resolve(raw)?.map(|f| f.bytes))
    }

    /// Every entry name present in at least one loaded archive, sorted and
    /// deduplicated. Names keep the archives' backslash separators.
    pub fn list_files(&self) -> Vec<String> {
        self.registry.list_all_paths().into_iter().collect()
    }

    /// Case-insensitive regex filter over [`list_files`](Self::list_files).
    ///
    /// Patterns match the backslash entry names, so a literal separator is
    /// written `\\`.
    ///
    /// Returns an empty list when search is disabled.
    pub fn search(&self, pattern: &str) -> Result<Vec<String>, CoreError> {
        if !self.options.enable_search {
            warn!("search is disabled; ignoring query '{pattern}'");
            return Ok(Vec::new());
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| CoreError::InvalidPattern(e.to_string()))?;
        Ok(self
            .list_files()
            .into_iter()
            .filter(|p| regex.is_match(p))
            .collect())
    }
}
