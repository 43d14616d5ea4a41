use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_FAILURE, EXIT_SUCCESS};
use grfserve_archive::{ArchiveEngine, EngineFactory, GrfEngineFactory};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Serialize)]
struct ArchiveReadReport {
    file: String,
    entries: usize,
    load_ms: u128,
    sample: Vec<String>,
    extracted: Option<Extracted>,
}

#[derive(Debug, Serialize)]
struct Extracted {
    name: String,
    bytes: Option<usize>,
    error: Option<String>,
}

pub fn run(path: &Path, sample: usize, json_output: bool) -> Result<u8, String> {
    let pb = (!json_output).then(|| spinner(&format!("loading {}", path.display())));
    let started = Instant::now();

    let loaded = GrfEngineFactory::new().open(path).and_then(|mut engine| {
        engine.load()?;
        Ok(engine)
    });
    let engine = match loaded {
        Ok(engine) => engine,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, &format!("{}: {e}", path.display()));
            }
            return Err(format!("archive error: {e}"));
        }
    };
    let load_ms = started.elapsed().as_millis();
    if let Some(pb) = &pb {
        spin_ok(
            pb,
            &format!(
                "loaded {} ({} entries in {load_ms} ms)",
                path.display(),
                engine.entry_count()
            ),
        );
    }

    let report = read_report(path, engine.as_ref(), sample, load_ms);
    let extraction_ok = report
        .extracted
        .as_ref()
        .is_none_or(|x| x.error.is_none());

    if json_output {
        println!("{}", json_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(if extraction_ok {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

fn read_report(
    path: &Path,
    engine: &dyn ArchiveEngine,
    sample: usize,
    load_ms: u128,
) -> ArchiveReadReport {
    let mut names = engine.entries();
    names.sort();

    let extracted = names.first().map(|name| match engine.get_file(name) {
        Ok(data) => Extracted {
            name: name.clone(),
            bytes: Some(data.len()),
            error: None,
        },
        Err(e) => Extracted {
            name: name.clone(),
            bytes: None,
            error: Some(e.to_string()),
        },
    });

    ArchiveReadReport {
        file: path.display().to_string(),
        entries: names.len(),
        load_ms,
        sample: names.into_iter().take(sample).collect(),
        extracted,
    }
}

fn print_report(report: &ArchiveReadReport) {
    println!("file:     {}", report.file);
    println!("entries:  {}", report.entries);
    println!("load:     {} ms", report.load_ms);
    if !report.sample.is_empty() {
        println!("sample:");
        for name in &report.sample {
            println!("  {name}");
        }
    }
    match &report.extracted {
        Some(Extracted {
            name,
            bytes: Some(n),
            ..
        }) => println!("✓ extracted {name} ({n} bytes)"),
        Some(Extracted {
            name,
            error: Some(e),
            ..
        }) => println!("✗ failed to extract {name}: {e}"),
        _ => println!("ℹ archive has no entries to extract"),
    }
}
