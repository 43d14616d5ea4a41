use crate::ArchiveError;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A decoder for one archive file.
///
/// Engines are created unloaded by an [`EngineFactory`]; [`load`](Self::load)
/// parses the file table. Entry names use the archive's native backslash form.
pub trait ArchiveEngine: Send + Sync {
    fn load(&mut self) -> Result<(), ArchiveError>;

    /// Extract one entry by its backslash-separated name.
    fn get_file(&self, name: &str) -> Result<Vec<u8>, ArchiveError>;

    /// Names of all indexed entries.
    fn entries(&self) -> Vec<String>;

    fn entry_count(&self) -> usize {
        self.entries().len()
    }
}

pub trait EngineFactory: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool {
        true
    }

    /// Open the archive at `path` without loading it.
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveEngine>, ArchiveError>;
}

/// Summary of a successful bounded load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub entries: usize,
    pub elapsed: Duration,
}

/// Open and fully load an archive on a worker thread, giving up after `timeout`.
///
/// A timed-out worker is detached and left to finish on its own; its result is
/// discarded. Timeouts are reported as [`ArchiveError::Timeout`].
pub fn load_with_timeout(
    factory: Arc<dyn EngineFactory>,
    path: PathBuf,
    timeout: Duration,
) -> Result<LoadReport, ArchiveError> {
    if !factory.available() {
        return Err(ArchiveError::EngineUnavailable(factory.name().to_owned()));
    }
    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    let worker_path = path.clone();

    std::thread::Builder::new()
        .name("archive-load".to_owned())
        .spawn(move || {
            let result = factory.open(&worker_path).and_then(|mut engine| {
                engine.load()?;
                Ok(engine.entry_count())
            });
            // The receiver is gone after a timeout; nothing to report then.
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(entries)) => {
            let elapsed = started.elapsed();
            debug!(
                "loaded {} ({entries} entries) in {elapsed:?}",
                path.display()
            );
            Ok(LoadReport { entries, elapsed })
        }
        Ok(Err(e)) => Err(e),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!("loading {} timed out after {timeout:?}", path.display());
            Err(ArchiveError::Timeout(timeout))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ArchiveError::Corrupt(
            "archive loader exited without a result".to_owned(),
        )),
    }
}
