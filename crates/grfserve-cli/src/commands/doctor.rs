use super::{json_pretty, load_config, EXIT_FAILURE, EXIT_SUCCESS};
use console::Style;
use grfserve_archive::{EngineFactory, GrfEngineFactory};
use grfserve_core::{EnvSnapshot, StartupValidator, ValidationResult};
use std::path::Path;
use std::sync::Arc;

pub fn run(root: &Path, config_path: Option<&Path>, json_output: bool) -> Result<u8, String> {
    let env = EnvSnapshot::capture();
    let config = load_config(root, config_path, &env)?;
    let factory: Arc<dyn EngineFactory> = Arc::new(GrfEngineFactory::new());

    let mut validator = StartupValidator::new(config, env, factory);
    let results = validator.validate_all();
    print_results(&results, json_output)
}

fn print_results(results: &ValidationResult, json_output: bool) -> Result<u8, String> {
    if json_output {
        println!("{}", json_pretty(&results.status_snapshot())?);
    } else {
        println!("grfserve doctor");
        print!("{}", results.render_report());
        if let Some(guide) = results.remediation_guide() {
            println!();
            print!("{guide}");
        }
        println!();
        if results.success {
            println!("{}", Style::new().green().apply_to("All checks passed."));
        } else {
            println!(
                "{}",
                Style::new()
                    .red()
                    .apply_to("Some checks failed. See above for details.")
            );
        }
    }
    Ok(if results.success {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}
