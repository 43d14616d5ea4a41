//! Startup validation.
//!
//! [`StartupValidator`] runs an ordered list of checks and accumulates their
//! messages under three severities. Only the dependency check stops the
//! pipeline; every other check runs regardless of earlier failures so a
//! single report lists every problem at once.

use crate::config::{EnvSnapshot, ServerConfig, DEFAULT_PORT, ENV_MODE, ENV_PORT, ENV_PUBLIC_URL};
use crate::prereq::{check_prerequisites, default_prerequisites, format_missing, MissingPrereq, Prerequisite};
use grfserve_archive::{load_with_timeout, read_header, validate_header, EngineFactory, SUPPORTED_VERSION};
use grfserve_archive::header::format_version;
use grfserve_schema::{extract_archive_names, ARCHIVE_EXTENSION};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Directories tolerated as empty when their only entries are named like this.
const IGNORED_ENTRY_PREFIX: &str = "add-";

pub const REPACK_GUIDE: &str = "\n  FIX: Repack with GRF Builder:\n  \
1. Download GRF Builder: https://github.com/Tokeiburu/GRFEditor\n  \
2. Open GRF Builder\n  \
3. File > Options > Repack type > Decrypt\n  \
4. Click: Tools > Repack\n  \
5. Wait for completion and replace the original file";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeDetail {
    pub version: String,
    pub os: String,
    pub arch: String,
    pub debug_build: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyDetail {
    pub installed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<MissingPrereq>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Dir,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathCheck {
    pub path: String,
    pub name: String,
    pub kind: PathKind,
    pub required: bool,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_empty: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilesDetail {
    pub valid: bool,
    pub checks: Vec<PathCheck>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarCheck {
    pub defined: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub using_default: bool,
    pub invalid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvDetail {
    pub valid: bool,
    pub variables: BTreeMap<String, EnvVarCheck>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveCheck {
    pub file: String,
    pub exists: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivesDetail {
    pub valid: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub files: Vec<ArchiveCheck>,
}

/// One optional sub-result per check; `None` means the check never ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationDetails {
    pub runtime: Option<RuntimeDetail>,
    pub dependencies: Option<DependencyDetail>,
    pub files: Option<FilesDetail>,
    pub env: Option<EnvDetail>,
    pub grfs: Option<ArchivesDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
    pub details: ValidationDetails,
}

pub struct StartupValidator {
    config: ServerConfig,
    env: EnvSnapshot,
    factory: Arc<dyn EngineFactory>,
    prerequisites: Vec<Prerequisite>,
    errors: Vec<String>,
    warnings: Vec<String>,
    info: Vec<String>,
    details: ValidationDetails,
}

impl StartupValidator {
    pub fn new(config: ServerConfig, env: EnvSnapshot, factory: Arc<dyn EngineFactory>) -> Self {
        let prerequisites = default_prerequisites(Arc::clone(&factory));
        Self {
            config,
            env,
            factory,
            prerequisites,
            errors: Vec::new(),
            warnings: Vec::new(),
            info: Vec::new(),
            details: ValidationDetails::default(),
        }
    }

    #[must_use]
    pub fn with_prerequisites(mut self, prerequisites: Vec<Prerequisite>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn note(&mut self, msg: impl Into<String>) {
        self.info.push(msg.into());
    }

    /// Run every check in order and return the aggregate.
    ///
    /// A failed dependency check returns immediately; later checks leave their
    /// `details` entries empty.
    pub fn validate_all(&mut self) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();
        self.info.clear();
        self.details = ValidationDetails::default();

        info!("validating startup configuration");
        self.check_runtime();
        if !self.check_dependencies() {
            return self.results();
        }
        self.check_required_paths();
        self.check_environment();
        self.check_archives();

        let results = self.results();
        debug!(
            "validation finished: {} error(s), {} warning(s)",
            results.errors.len(),
            results.warnings.len()
        );
        results
    }

    /// Current aggregate, derived without re-running any check.
    pub fn results(&self) -> ValidationResult {
        ValidationResult {
            success: self.errors.is_empty(),
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
            info: self.info.clone(),
            details: self.details.clone(),
        }
    }

    pub fn check_runtime(&mut self) -> bool {
        let detail = RuntimeDetail {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            debug_build: cfg!(debug_assertions),
        };
        self.note(format!("grfserve: {}", detail.version));
        self.note(format!("platform: {}/{}", detail.os, detail.arch));
        if detail.debug_build {
            self.warning("running a debug build; use a release build for production");
        }
        self.details.runtime = Some(detail);
        true
    }

    pub fn check_dependencies(&mut self) -> bool {
        let missing = check_prerequisites(&self.prerequisites);
        let installed = missing.is_empty();
        if installed {
            self.note(format!(
                "dependencies available ({} engine)",
                self.factory.name()
            ));
        } else {
            self.error(format_missing(&missing));
        }
        self.details.dependencies = Some(DependencyDetail { installed, missing });
        installed
    }

    pub fn check_required_paths(&mut self) -> bool {
        let root = self.config.root.clone();
        let resources = self.config.resource_dir.clone();
        let manifest = resources.join(&self.config.manifest);

        let specs = [
            (resources.as_path(), PathKind::Dir, true),
            (manifest.as_path(), PathKind::File, true),
            (Path::new("BGM"), PathKind::Dir, false),
            (Path::new("data"), PathKind::Dir, false),
            (Path::new("System"), PathKind::Dir, false),
        ];

        let mut valid = true;
        let mut checks = Vec::with_capacity(specs.len());
        for (rel, kind, required) in specs {
            let display = rel.to_string_lossy().replace('\\', "/");
            let name = match kind {
                PathKind::Dir => format!("{display}/ folder"),
                PathKind::File => format!("{display} file"),
            };
            let full = root.join(rel);

            let (exists, is_empty) = match kind {
                PathKind::Dir => {
                    let exists = full.is_dir();
                    (exists, Some(!exists || dir_is_empty(&full)))
                }
                PathKind::File => (full.is_file(), None),
            };

            if required && !exists {
                self.error(format!("{name} not found!"));
                valid = false;
            } else if is_empty == Some(true) {
                if required {
                    self.warning(format!("{name} is empty"));
                } else {
                    self.warning(format!(
                        "{name} is empty - may cause issues depending on the client"
                    ));
                }
            } else if exists {
                self.note(format!("{name} OK"));
            }

            checks.push(PathCheck {
                path: display,
                name,
                kind,
                required,
                exists,
                is_empty,
            });
        }

        self.details.files = Some(FilesDetail { valid, checks });
        valid
    }

    #[allow(clippy::too_many_lines)]
    pub fn check_environment(&mut self) -> bool {
        let mut valid = true;
        let mut variables = BTreeMap::new();

        let port = self.env.get(ENV_PORT).map(str::to_owned);
        match port {
            None => {
                let port = self.config.port;
                let using_default = port == DEFAULT_PORT;
                if using_default {
                    self.warning(format!("{ENV_PORT} not set, using default: {port}"));
                } else {
                    self.note(format!("{ENV_PORT} not set, using configured port: {port}"));
                }
                variables.insert(
                    ENV_PORT.to_owned(),
                    EnvVarCheck {
                        defined: false,
                        value: Some(port.to_string()),
                        using_default,
                        invalid: false,
                    },
                );
            }
            Some(value) => {
                let invalid = value.trim().parse::<u16>().is_err();
                if invalid {
                    self.error(format!("Invalid {ENV_PORT}: {value}"));
                    valid = false;
                } else {
                    self.note(format!("{ENV_PORT}: {value}"));
                }
                variables.insert(
                    ENV_PORT.to_owned(),
                    EnvVarCheck {
                        defined: true,
                        value: Some(value),
                        using_default: false,
                        invalid,
                    },
                );
            }
        }

        let public_url = self
            .env
            .get(ENV_PUBLIC_URL)
            .map(str::to_owned)
            .or_else(|| self.config.public_url.clone());
        match public_url {
            None => {
                self.error(format!(
                    "{ENV_PUBLIC_URL} not set! Export it or set public_url in grfserve.toml"
                ));
                valid = false;
                variables.insert(
                    ENV_PUBLIC_URL.to_owned(),
                    EnvVarCheck {
                        defined: false,
                        value: None,
                        using_default: false,
                        invalid: false,
                    },
                );
            }
            Some(value) => {
                let invalid = !is_http_url(&value);
                if invalid {
                    self.error(format!("Invalid {ENV_PUBLIC_URL}: {value}"));
                    valid = false;
                } else {
                    self.note(format!("{ENV_PUBLIC_URL}: {value}"));
                }
                variables.insert(
                    ENV_PUBLIC_URL.to_owned(),
                    EnvVarCheck {
                        defined: true,
                        value: Some(value),
                        using_default: false,
                        invalid,
                    },
                );
            }
        }

        let mode_defined = self.env.get(ENV_MODE).is_some();
        let mode = self.config.environment.clone();
        if self.config.is_production() && self.config.debug {
            self.warning("DEBUG is enabled in PRODUCTION!");
        }
        if mode_defined {
            self.note(format!("{ENV_MODE}: {mode}"));
        } else {
            self.warning(format!("{ENV_MODE} not set, using: {mode}"));
        }
        variables.insert(
            ENV_MODE.to_owned(),
            EnvVarCheck {
                defined: mode_defined,
                value: Some(mode),
                using_default: !mode_defined,
                invalid: false,
            },
        );

        self.details.env = Some(EnvDetail { valid, variables });
        valid
    }

    pub fn check_archives(&mut self) -> bool {
        let resources = self.config.resources_path();
        let manifest_path = self.config.manifest_path();
        let manifest_label = format!(
            "{}/{}",
            self.config.resource_dir.display(),
            self.config.manifest
        );

        let content = match std::fs::read_to_string(&manifest_path) {
            Ok(c) => c,
            Err(e) => {
                let reason = if e.kind() == std::io::ErrorKind::NotFound {
                    format!("{manifest_label} not found!")
                } else {
                    format!("cannot read {manifest_label}: {e}")
                };
                self.error(reason.clone());
                self.details.grfs = Some(ArchivesDetail {
                    valid: false,
                    count: 0,
                    reason: Some(reason),
                    files: Vec::new(),
                });
                return false;
            }
        };

        let names = extract_archive_names(&content, ARCHIVE_EXTENSION);
        if names.is_empty() {
            self.error(format!("No GRF files found in {manifest_label}!"));
            self.details.grfs = Some(ArchivesDetail {
                valid: false,
                count: 0,
                reason: Some(format!("no GRF files in {}", self.config.manifest)),
                files: Vec::new(),
            });
            return false;
        }

        let mut valid = true;
        let mut files = Vec::with_capacity(names.len());
        for name in &names {
            let check = self.check_archive(&resources, name);
            valid &= check.valid;
            files.push(check);
        }

        self.details.grfs = Some(ArchivesDetail {
            valid,
            count: names.len(),
            reason: None,
            files,
        });
        valid
    }

    fn check_archive(&mut self, resources: &Path, name: &str) -> ArchiveCheck {
        let path = resources.join(name);
        let mut check = ArchiveCheck {
            file: name.to_owned(),
            exists: path.is_file(),
            valid: false,
            version: None,
            encrypted: None,
            entries: None,
            reason: None,
        };

        if !check.exists {
            self.error(format!("GRF not found: {name}"));
            return check;
        }

        let bytes = match read_header(&path) {
            Ok(b) => b,
            Err(e) => {
                let reason = format!("Failed to validate GRF: {e}");
                self.error(format!("Incompatible GRF: {name}\n  - {reason}"));
                check.version = Some("error".to_owned());
                check.reason = Some(reason);
                return check;
            }
        };

        let verdict = validate_header(&bytes);
        check.version = Some(verdict.version.clone());
        check.encrypted = Some(verdict.encrypted);

        if !verdict.valid {
            let mut msg = format!("Incompatible GRF: {name}\n");
            if verdict.version != "unknown" && verdict.version != format_version(SUPPORTED_VERSION) {
                msg.push_str(&format!(
                    "  - Version: {} (expected: {})\n",
                    verdict.version,
                    format_version(SUPPORTED_VERSION)
                ));
            }
            msg.push_str(&format!("  - {}\n", verdict.reason));
            msg.push_str(REPACK_GUIDE);
            self.error(msg);
            check.reason = Some(verdict.reason);
            return check;
        }

        match load_with_timeout(Arc::clone(&self.factory), path, self.config.load_timeout()) {
            Ok(report) => {
                self.note(format!(
                    "Valid GRF: {name} (version {}, {} entries, loaded in {} ms)",
                    verdict.version,
                    report.entries,
                    report.elapsed.as_millis()
                ));
                check.valid = true;
                check.entries = Some(report.entries);
                check.reason = Some("archive loaded successfully".to_owned());
            }
            Err(e) => {
                let reason = format!("Engine failed to load: {e}");
                self.error(format!(
                    "Incompatible GRF: {name}\n  - {reason}\n{REPACK_GUIDE}"
                ));
                check.reason = Some(reason);
            }
        }
        check
    }
}

fn dir_is_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => !entries
            .filter_map(Result::ok)
            .any(|e| !e.file_name().to_string_lossy().starts_with(IGNORED_ENTRY_PREFIX)),
        Err(_) => true,
    }
}

fn is_http_url(value: &str) -> bool {
    url::Url::parse(value).is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
}
