use super::{json_pretty, open_context, EXIT_SUCCESS};
use std::path::Path;

pub fn run(
    root: &Path,
    config_path: Option<&Path>,
    pattern: &str,
    json: bool,
) -> Result<u8, String> {
    let context = open_context(root, config_path)?;
    if !context.config().enable_search {
        eprintln!("search is disabled (enable_search = false)");
    }
    let matches = context
        .resolver()
        .search(pattern)
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&matches)?);
    } else {
        for path in &matches {
            println!("{path}");
        }
    }
    Ok(EXIT_SUCCESS)
}
