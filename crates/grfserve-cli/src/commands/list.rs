use super::{json_pretty, open_context, EXIT_SUCCESS};
use std::path::Path;

pub fn run(root: &Path, config_path: Option<&Path>, json: bool) -> Result<u8, String> {
    let context = open_context(root, config_path)?;
    let files = context.resolver().list_files();
    if json {
        println!("{}", json_pretty(&files)?);
    } else if files.is_empty() {
        eprintln!("no files found");
    } else {
        for file in &files {
            println!("{file}");
        }
    }
    Ok(EXIT_SUCCESS)
}
