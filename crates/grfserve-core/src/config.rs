use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3338;

/// Optional config file looked up in the server root.
pub const CONFIG_FILE: &str = "grfserve.toml";

pub const ENV_PORT: &str = "PORT";
pub const ENV_PUBLIC_URL: &str = "CLIENT_PUBLIC_URL";
pub const ENV_MODE: &str = "GRFSERVE_ENV";
pub const ENV_AUTOEXTRACT: &str = "GRFSERVE_AUTOEXTRACT";
pub const ENV_ENABLE_SEARCH: &str = "GRFSERVE_ENABLE_SEARCH";
pub const ENV_DEBUG: &str = "GRFSERVE_DEBUG";

/// Point-in-time copy of the process environment.
///
/// Empty values count as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CoreError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CoreError::Config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Server root: the overlay lives here and relative paths resolve against it.
    pub root: PathBuf,
    /// Directory holding the manifest and archives, relative to `root`.
    pub resource_dir: PathBuf,
    /// Manifest file name inside `resource_dir`.
    pub manifest: String,
    pub port: u16,
    /// Public origin of the web client, used for CORS.
    pub public_url: Option<String>,
    /// `development` or `production`.
    pub environment: String,
    /// Persist archive hits into the overlay.
    pub auto_extract: bool,
    pub enable_search: bool,
    pub debug: bool,
    pub load_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            resource_dir: PathBuf::from("resources"),
            manifest: "DATA.INI".to_owned(),
            port: DEFAULT_PORT,
            public_url: None,
            environment: "development".to_owned(),
            auto_extract: true,
            enable_search: true,
            debug: false,
            load_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(input)?)
    }

    /// Load a config file. A relative `root` inside it is taken relative to the file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if config.root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.root = base.join(&config.root);
        }
        Ok(config)
    }

    /// Resolve the effective config for `root`: `grfserve.toml` if present,
    /// defaults otherwise, then environment overrides.
    pub fn discover(root: &Path, env: &EnvSnapshot) -> Result<Self, CoreError> {
        let file = root.join(CONFIG_FILE);
        let mut config = if file.is_file() {
            Self::load(&file)?
        } else {
            Self::with_root(root)
        };
        config.apply_env(env)?;
        Ok(config)
    }

    pub fn apply_env(&mut self, env: &EnvSnapshot) -> Result<(), CoreError> {
        if let Some(port) = env.get(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| CoreError::Config(format!("{ENV_PORT} must be a port number, got '{port}'")))?;
        }
        if let Some(url) = env.get(ENV_PUBLIC_URL) {
            self.public_url = Some(url.trim_end_matches('/').to_owned());
        }
        if let Some(mode) = env.get(ENV_MODE) {
            mode.clone_into(&mut self.environment);
        }
        if let Some(v) = env.get(ENV_AUTOEXTRACT) {
            self.auto_extract = parse_bool(ENV_AUTOEXTRACT, v)?;
        }
        if let Some(v) = env.get(ENV_ENABLE_SEARCH) {
            self.enable_search = parse_bool(ENV_ENABLE_SEARCH, v)?;
        }
        if let Some(v) = env.get(ENV_DEBUG) {
            self.debug = parse_bool(ENV_DEBUG, v)?;
        }
        Ok(())
    }

    #[inline]
    pub fn resources_path(&self) -> PathBuf {
        self.root.join(&self.resource_dir)
    }

    #[inline]
    pub fn manifest_path(&self) -> PathBuf {
        self.resources_path().join(&self.manifest)
    }

    /// Overlay files are stored directly under the server root.
    #[inline]
    pub fn overlay_root(&self) -> &Path {
        &self.root
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}
