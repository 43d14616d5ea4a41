use super::{EXIT_FAILURE, EXIT_SUCCESS};
use grfserve_core::ResolvedSource;
use std::io::Write;
use std::path::Path;
use tracing::info;

pub fn run(
    root: &Path,
    config_path: Option<&Path>,
    path: &str,
    output: Option<&Path>,
) -> Result<u8, String> {
    let context = super::open_context(root, config_path)?;
    let Some(file) = context
        .resolver()
        .resolve(path)
        .map_err(|e| e.to_string())?
    else {
        eprintln!("{path}: not found");
        return Ok(EXIT_FAILURE);
    };

    match &file.source {
        ResolvedSource::Overlay => info!("{}: served from overlay", file.path),
        ResolvedSource::Archive(name) => info!("{}: extracted from {name}", file.path),
    }

    match output {
        Some(dest) => {
            std::fs::write(dest, &file.bytes)
                .map_err(|e| format!("failed to write {}: {e}", dest.display()))?;
            eprintln!("{} bytes written to {}", file.bytes.len(), dest.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&file.bytes)
                .and_then(|()| stdout.flush())
                .map_err(|e| format!("failed to write to stdout: {e}"))?;
        }
    }
    Ok(EXIT_SUCCESS)
}
