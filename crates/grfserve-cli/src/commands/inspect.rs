use super::{json_pretty, load_config, EXIT_FAILURE, EXIT_SUCCESS};
use console::Style;
use grfserve_archive::{read_header, HeaderDump};
use grfserve_core::EnvSnapshot;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct Inspection {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<HeaderDump>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(
    root: &Path,
    config_path: Option<&Path>,
    paths: &[PathBuf],
    json_output: bool,
) -> Result<u8, String> {
    let targets = if paths.is_empty() {
        let config = load_config(root, config_path, &EnvSnapshot::capture())?;
        discover_archives(&config.resources_path())?
    } else {
        paths.to_vec()
    };

    let inspections: Vec<Inspection> = targets.iter().map(|p| inspect_one(p)).collect();
    let all_valid = inspections
        .iter()
        .all(|i| i.header.as_ref().is_some_and(|h| h.verdict.valid));

    if json_output {
        println!("{}", json_pretty(&inspections)?);
    } else {
        for inspection in &inspections {
            print_inspection(inspection);
        }
    }
    Ok(if all_valid { EXIT_SUCCESS } else { EXIT_FAILURE })
}

/// Every `.grf` file directly under `dir`, sorted by name.
fn discover_archives(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| format!("cannot read {}: {e}", dir.display()))?;
    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("grf"))
        })
        .collect();
    found.sort();
    if found.is_empty() {
        return Err(format!("no .grf files found in {}", dir.display()));
    }
    Ok(found)
}

fn inspect_one(path: &Path) -> Inspection {
    let file = path.display().to_string();
    match read_header(path) {
        Ok(bytes) => Inspection {
            file,
            header: Some(HeaderDump::from_bytes(&bytes)),
            error: None,
        },
        Err(e) => Inspection {
            file,
            header: None,
            error: Some(e.to_string()),
        },
    }
}

fn print_inspection(inspection: &Inspection) {
    let bold = Style::new().bold();
    println!("{}", bold.apply_to(&inspection.file));

    let Some(dump) = &inspection.header else {
        println!(
            "  ✗ {}\n",
            inspection.error.as_deref().unwrap_or("unreadable header")
        );
        return;
    };

    println!("\n  Header (46 bytes):");
    for line in &dump.hex {
        println!("    {line}");
    }

    println!("\n  Signature (0-14):   \"{}\"", dump.magic);
    println!(
        "    {}",
        if dump.signature_ok {
            "✓ matches \"Master of Magic\""
        } else {
            "✗ does not match \"Master of Magic\""
        }
    );

    println!("\n  Key (15-28):");
    for key in &dump.key {
        let verdict = if key.zero { "ok" } else { "ENCRYPTED" };
        println!("    [{:02}] 0x{:02X}  {verdict}", key.offset, key.value);
    }
    let nonzero = dump.nonzero_key_bytes();
    if nonzero == 0 {
        println!("    ✓ no encryption key");
    } else {
        println!("    ✗ {nonzero} nonzero key byte(s): archive is encrypted");
    }

    println!("\n  Table offset (30): {}", dump.table_offset);
    println!("  Seed (34):         {}", dump.seed);
    println!("  File count (38):   {}", dump.raw_file_count);
    println!("  Version (42):      {}", dump.version);

    let verdict = &dump.verdict;
    if verdict.valid {
        println!("\n  {}\n", Style::new().green().apply_to("✓ compatible"));
    } else {
        println!(
            "\n  {}\n",
            Style::new()
                .red()
                .apply_to(format!("✗ incompatible: {}", verdict.reason))
        );
    }
}
