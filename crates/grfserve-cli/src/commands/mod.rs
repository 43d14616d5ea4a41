pub mod completions;
pub mod doctor;
pub mod get;
pub mod inspect;
pub mod list;
pub mod search;
pub mod test_archive;

use grfserve_archive::GrfEngineFactory;
use grfserve_core::{ClientContext, EnvSnapshot, ServerConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_ARCHIVE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Effective config for a client root: explicit file, else discovered, then env overrides.
pub fn load_config(
    root: &Path,
    config_path: Option<&Path>,
    env: &EnvSnapshot,
) -> Result<ServerConfig, String> {
    match config_path {
        Some(path) => {
            let mut config = ServerConfig::load(path).map_err(|e| e.to_string())?;
            config.apply_env(env).map_err(|e| e.to_string())?;
            Ok(config)
        }
        None => ServerConfig::discover(root, env).map_err(|e| e.to_string()),
    }
}

/// Build the same context the server serves from.
pub fn open_context(root: &Path, config_path: Option<&Path>) -> Result<ClientContext, String> {
    let config = load_config(root, config_path, &EnvSnapshot::capture())?;
    ClientContext::init(config, &GrfEngineFactory::new()).map_err(|e| e.to_string())
}
