use grfserve_archive::grf::zlib_self_test;
use grfserve_archive::EngineFactory;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

type Detector = Box<dyn Fn() -> bool + Send + Sync>;

/// Something the service needs before it can serve archives, with a detector
/// that reports whether it is present.
pub struct Prerequisite {
    pub name: String,
    pub purpose: String,
    pub install_hint: String,
    detect: Detector,
}

impl Prerequisite {
    pub fn new(
        name: impl Into<String>,
        purpose: impl Into<String>,
        install_hint: impl Into<String>,
        detect: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            purpose: purpose.into(),
            install_hint: install_hint.into(),
            detect: Box::new(detect),
        }
    }

    pub fn is_met(&self) -> bool {
        (self.detect)()
    }
}

impl fmt::Debug for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prerequisite")
            .field("name", &self.name)
            .field("purpose", &self.purpose)
            .finish_non_exhaustive()
    }
}

/// A missing prerequisite with actionable install instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: String,
    pub install_hint: String,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (fix: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

/// The prerequisites every deployment needs: a usable archive engine, a working
/// zlib decoder, and writable temporary files for overlay writes.
pub fn default_prerequisites(factory: Arc<dyn EngineFactory>) -> Vec<Prerequisite> {
    let engine_name = factory.name().to_owned();
    vec![
        Prerequisite::new(
            format!("{engine_name} archive engine"),
            "decoding the archives listed in the manifest",
            "rebuild grfserve with the default features enabled",
            move || factory.available(),
        ),
        Prerequisite::new(
            "zlib",
            "decompressing archive file tables and entries",
            "rebuild grfserve; the bundled inflate backend failed its self-test",
            zlib_self_test,
        ),
        Prerequisite::new(
            "temporary files",
            "atomic writes into the overlay directory",
            "make sure TMPDIR points to a writable directory",
            || tempfile::tempfile().is_ok(),
        ),
    ]
}

/// Run every detector. An empty list means all prerequisites are met.
pub fn check_prerequisites(prereqs: &[Prerequisite]) -> Vec<MissingPrereq> {
    prereqs
        .iter()
        .filter(|p| !p.is_met())
        .map(|p| MissingPrereq {
            name: p.name.clone(),
            purpose: p.purpose.clone(),
            install_hint: p.install_hint.clone(),
        })
        .collect()
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\ngrfserve cannot read archives until these are available.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use grfserve_archive::{GrfEngineFactory, MemoryEngineFactory};

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "zlib".to_owned(),
            purpose: "decompression".to_owned(),
            install_hint: "rebuild".to_owned(),
        };
        let s = m.to_string();
        assert!(s.contains("zlib"));
        assert!(s.contains("decompression"));
        assert!(s.contains("rebuild"));
    }

    #[test]
    fn defaults_pass_on_a_working_build() {
        let prereqs = default_prerequisites(Arc::new(GrfEngineFactory::new()));
        assert_eq!(prereqs.len(), 3);
        assert!(check_prerequisites(&prereqs).is_empty());
    }

    #[test]
    fn engine_prerequisite_is_named_after_factory() {
        let prereqs = default_prerequisites(Arc::new(MemoryEngineFactory::new()));
        assert_eq!(prereqs[0].name, "memory archive engine");
    }

    #[test]
    fn failing_detector_is_reported() {
        let prereqs = vec![
            Prerequisite::new("ok", "fine", "none", || true),
            Prerequisite::new("broken", "needed", "install it", || false),
        ];
        let missing = check_prerequisites(&prereqs);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "broken");
        let output = format_missing(&missing);
        assert!(output.contains("missing prerequisites:"));
        assert!(output.contains("install it"));
    }
}
