use clap::Parser;
use grfserve_archive::{EngineFactory, GrfEngineFactory};
use grfserve_core::{ClientContext, EnvSnapshot, ServerConfig, StartupValidator};
use grfserve_server::AppState;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "grfserve-server", about = "Serve a layered GRF client over HTTP")]
struct Cli {
    /// Port to listen on (overrides PORT and the config file).
    #[arg(long)]
    port: Option<u16>,

    /// Client root directory holding resources/ and the overlay.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Config file (default: <root>/grfserve.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GRFSERVE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn load_config(cli: &Cli, env: &EnvSnapshot) -> Result<ServerConfig, String> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut c = ServerConfig::load(path).map_err(|e| e.to_string())?;
            c.apply_env(env).map_err(|e| e.to_string())?;
            c
        }
        None => ServerConfig::discover(&cli.root, env).map_err(|e| e.to_string())?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let env = EnvSnapshot::capture();

    let config = match load_config(&cli, &env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.debug);

    let factory: Arc<dyn EngineFactory> = Arc::new(GrfEngineFactory::new());
    let mut validator = StartupValidator::new(config.clone(), env, Arc::clone(&factory));
    let results = validator.validate_all();
    if !results.success {
        eprint!("{}", results.render_report());
        if let Some(guide) = results.remediation_guide() {
            eprint!("{guide}");
        }
        error!("startup validation failed; refusing to serve");
        return ExitCode::FAILURE;
    }
    for warning in &results.warnings {
        warn!("{warning}");
    }

    let context = match ClientContext::init(config, factory.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to initialise client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let addr = format!("{}:{}", cli.bind, context.config().port);
    info!("starting grfserve-server on {addr}");
    info!("client root: {}", context.config().root.display());

    let state = Arc::new(AppState::new(context, results.status_snapshot()));
    if let Err(e) = grfserve_server::run_server(&state, &addr) {
        error!("server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
