use crate::config::DEFAULT_PORT;
use crate::validation::{ValidationDetails, ValidationResult, REPACK_GUIDE};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Messages {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
}

/// Health document served by `/health` and printed by `doctor --json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    /// `"ok"` or `"error"`.
    pub status: String,
    pub has_warnings: bool,
    pub summary: Summary,
    pub details: ValidationDetails,
    pub messages: Messages,
}

impl StatusSnapshot {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

const RULE_WIDTH: usize = 80;

fn push_block(out: &mut String, title: &str, messages: &[String]) {
    if messages.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title}");
    for msg in messages {
        for line in msg.lines() {
            let _ = writeln!(out, "  {line}");
        }
    }
    out.push('\n');
}

impl ValidationResult {
    pub fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            timestamp: Utc::now(),
            status: if self.success { "ok" } else { "error" }.to_owned(),
            has_warnings: !self.warnings.is_empty(),
            summary: Summary {
                errors: self.errors.len(),
                warnings: self.warnings.len(),
                info: self.info.len(),
            },
            details: self.details.clone(),
            messages: Messages {
                errors: self.errors.clone(),
                warnings: self.warnings.clone(),
                info: self.info.clone(),
            },
        }
    }

    /// Human-readable report: info, warnings, errors, then a verdict line.
    pub fn render_report(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut out = String::new();
        let _ = writeln!(out, "\n{rule}\nVALIDATION REPORT\n{rule}\n");

        push_block(&mut out, "✓ INFO:", &self.info);
        push_block(&mut out, "⚠ WARNINGS:", &self.warnings);
        push_block(&mut out, "✗ ERRORS:", &self.errors);

        let _ = writeln!(out, "{rule}");
        if self.success {
            out.push_str("✓ Validation completed successfully!\n");
            if !self.warnings.is_empty() {
                let _ = writeln!(out, "⚠ {} warning(s) found", self.warnings.len());
            }
        } else {
            out.push_str("✗ Validation failed!\n");
            let _ = writeln!(out, "  {} error(s) found", self.errors.len());
            out.push_str("\nTip: run `grfserve doctor` for a detailed diagnosis\n");
        }
        let _ = writeln!(out, "{rule}");
        out
    }

    /// Numbered fix instructions for every failing area, or `None` on success.
    pub fn remediation_guide(&self) -> Option<String> {
        if self.success {
            return None;
        }
        let details = &self.details;
        let mut out = String::from("FIX GUIDE:\n\n");
        let mut step = 0;
        let mut section = |out: &mut String, title: &str| {
            step += 1;
            let _ = writeln!(out, "{step}. {title}");
        };

        if details.dependencies.as_ref().is_some_and(|d| !d.installed) {
            section(&mut out, "MISSING DEPENDENCIES:");
            if let Some(deps) = &details.dependencies {
                for m in &deps.missing {
                    let _ = writeln!(out, "   - {}: {}", m.name, m.install_hint);
                }
            }
            if let Some(rt) = &details.runtime {
                let _ = writeln!(out, "   Build: grfserve {} ({}/{})", rt.version, rt.os, rt.arch);
            }
            out.push('\n');
        }

        if details.env.as_ref().is_some_and(|e| !e.valid) {
            section(&mut out, "ENVIRONMENT VARIABLES:");
            out.push_str("   Export these before starting, or set them in grfserve.toml:\n\n");
            let _ = writeln!(out, "   PORT={DEFAULT_PORT}");
            out.push_str("   CLIENT_PUBLIC_URL=http://127.0.0.1:8000\n");
            out.push_str("   GRFSERVE_ENV=development\n\n");
        }

        if details.files.as_ref().is_some_and(|f| !f.valid) {
            section(&mut out, "REQUIRED FILES AND FOLDERS:");
            out.push_str("   Make sure these exist:\n");
            out.push_str("   - resources/\n");
            out.push_str("   - resources/DATA.INI\n");
            out.push_str("   - at least one .grf file in resources/\n\n");
        }

        if details.grfs.as_ref().is_some_and(|g| !g.valid) {
            section(&mut out, "INCOMPATIBLE GRF FILES:");
            out.push_str("   Only GRF version 0x200 without DES encryption is supported.\n");
            for line in REPACK_GUIDE.lines().filter(|l| !l.trim().is_empty()) {
                let _ = writeln!(out, "  {line}");
            }
            out.push_str("\n   This converts the archive to version 0x200 without DES.\n\n");
        }

        let rule = "=".repeat(RULE_WIDTH);
        let _ = writeln!(out, "{rule}\nAfter fixing, run again: grfserve doctor\n{rule}");
        Some(out)
    }
}
