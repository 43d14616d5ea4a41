mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_ARCHIVE_ERROR, EXIT_FAILURE, EXIT_MANIFEST_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "grfserve",
    version,
    about = "Inspect, validate, and query a layered GRF client directory"
)]
struct Cli {
    /// Client root directory holding resources/ and the overlay.
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (default: <root>/grfserve.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the startup validation pipeline and print a fix guide for failures.
    Doctor,
    /// Dump and analyse archive headers (default: every .grf in the resource dir).
    Inspect {
        /// Archive files to inspect.
        paths: Vec<PathBuf>,
    },
    /// Open and fully load one archive, then extract a sample entry.
    TestArchive {
        /// Archive file.
        path: PathBuf,
        /// Number of entry names to print.
        #[arg(long, default_value_t = 10)]
        sample: usize,
    },
    /// List every path served from the archives.
    List,
    /// Resolve one path through the overlay and archives.
    Get {
        /// Logical path, e.g. data/clientinfo.xml.
        path: String,
        /// Write the content to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Case-insensitive regex search over archive paths.
    Search {
        /// Regular expression.
        pattern: String,
    },
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GRFSERVE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Doctor => commands::doctor::run(&cli.root, config_path, json_output),
        Commands::Inspect { paths } => {
            commands::inspect::run(&cli.root, config_path, &paths, json_output)
        }
        Commands::TestArchive { path, sample } => {
            commands::test_archive::run(&path, sample, json_output)
        }
        Commands::List => commands::list::run(&cli.root, config_path, json_output),
        Commands::Get { path, output } => {
            commands::get::run(&cli.root, config_path, &path, output.as_deref())
        }
        Commands::Search { pattern } => {
            commands::search::run(&cli.root, config_path, &pattern, json_output)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") {
                EXIT_MANIFEST_ERROR
            } else if msg.starts_with("archive error:") {
                EXIT_ARCHIVE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
