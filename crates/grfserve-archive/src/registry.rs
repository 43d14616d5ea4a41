use crate::engine::{ArchiveEngine, EngineFactory};
use crate::header::{read_header, validate_header};
use crate::ArchiveError;
use grfserve_schema::LogicalPath;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// One manifest entry and the engine serving it.
///
/// `priority` is the position in the manifest; lower wins. An archive that
/// failed its header gate or its load keeps a descriptor with the reason so
/// callers can report it.
pub struct ArchiveDescriptor {
    name: String,
    priority: usize,
    path: PathBuf,
    engine: Option<Box<dyn ArchiveEngine>>,
    error: Option<String>,
}

impl ArchiveDescriptor {
    fn failed(name: &str, priority: usize, path: PathBuf, reason: String) -> Self {
        Self {
            name: name.to_owned(),
            priority,
            path,
            engine: None,
            error: Some(reason),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> usize {
        self.priority
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn loaded(&self) -> bool {
        self.engine.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn entry_count(&self) -> usize {
        self.engine.as_ref().map_or(0, |e| e.entry_count())
    }

    fn engine(&self) -> Option<&dyn ArchiveEngine> {
        self.engine.as_deref()
    }
}

impl std::fmt::Debug for ArchiveDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("path", &self.path)
            .field("loaded", &self.loaded())
            .field("error", &self.error)
            .finish()
    }
}

fn open_descriptor(
    resources_dir: &Path,
    priority: usize,
    name: &str,
    factory: &dyn EngineFactory,
) -> ArchiveDescriptor {
    let path = resources_dir.join(name);

    let header = match read_header(&path) {
        Ok(h) => h,
        Err(e) => {
            error!("{name}: cannot read header: {e}");
            return ArchiveDescriptor::failed(name, priority, path, e.to_string());
        }
    };
    let verdict = validate_header(&header);
    if !verdict.valid {
        error!("{name}: incompatible archive: {}", verdict.reason);
        return ArchiveDescriptor::failed(name, priority, path, verdict.reason);
    }

    if !factory.available() {
        let e = ArchiveError::EngineUnavailable(factory.name().to_owned());
        error!("{name}: {e}");
        return ArchiveDescriptor::failed(name, priority, path, e.to_string());
    }

    let loaded = factory.open(&path).and_then(|mut engine| {
        engine.load()?;
        Ok(engine)
    });
    match loaded {
        Ok(engine) => {
            info!("{name}: loaded {} entries", engine.entry_count());
            ArchiveDescriptor {
                name: name.to_owned(),
                priority,
                path,
                engine: Some(engine),
                error: None,
            }
        }
        Err(e) => {
            error!("{name}: failed to load: {e}");
            ArchiveDescriptor::failed(name, priority, path, e.to_string())
        }
    }
}

/// The manifest's archives, opened and held in priority order.
#[derive(Debug, Default)]
pub struct ArchiveRegistry {
    descriptors: Vec<ArchiveDescriptor>,
}

impl ArchiveRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Open every named archive under `resources_dir`.
    ///
    /// Archives are opened in parallel and independently: one failure never
    /// prevents the others from loading. The result is in `names` order
    /// regardless of completion order.
    pub fn open(resources_dir: &Path, names: &[String], factory: &dyn EngineFactory) -> Self {
        let descriptors = std::thread::scope(|scope| {
            let handles: Vec<_> = names
                .iter()
                .enumerate()
                .map(|(priority, name)| {
                    scope.spawn(move || open_descriptor(resources_dir, priority, name, factory))
                })
                .collect();

            handles
                .into_iter()
                .zip(names)
                .enumerate()
                .map(|(priority, (handle, name))| {
                    handle.join().unwrap_or_else(|_| {
                        ArchiveDescriptor::failed(
                            name,
                            priority,
                            resources_dir.join(name),
                            "archive loader panicked".to_owned(),
                        )
                    })
                })
                .collect()
        });

        Self { descriptors }
    }

    pub fn descriptors(&self) -> &[ArchiveDescriptor] {
        &self.descriptors
    }

    pub fn loaded_count(&self) -> usize {
        self.descriptors.iter().filter(|d| d.loaded()).count()
    }

    fn loaded(&self) -> impl Iterator<Item = (&ArchiveDescriptor, &dyn ArchiveEngine)> {
        self.descriptors
            .iter()
            .filter_map(|d| d.engine().map(|e| (d, e)))
    }

    /// First archive, in priority order, holding `path`, with its content.
    pub fn find_file_with_source(&self, path: &LogicalPath) -> Option<(&str, Vec<u8>)> {
        let entry = path.to_archive_path();
        for (descriptor, engine) in self.loaded() {
            match engine.get_file(&entry) {
                Ok(data) => {
                    debug!("{path}: found in {}", descriptor.name());
                    return Some((descriptor.name(), data));
                }
                Err(ArchiveError::EntryNotFound(_)) => {}
                Err(e) => warn!("{path}: {} failed to extract: {e}", descriptor.name()),
            }
        }
        None
    }

    pub fn find_file(&self, path: &LogicalPath) -> Option<Vec<u8>> {
        self.find_file_with_source(path).map(|(_, data)| data)
    }

    /// Union of all entry names across loaded archives, in the archives'
    /// native backslash form.
    pub fn list_all_paths(&self) -> BTreeSet<String> {
        self.loaded()
            .flat_map(|(_, engine)| engine.entries())
            .collect()
    }
}
