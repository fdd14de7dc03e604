use clap::Parser;
use std::path::PathBuf;

use code_runner::RunnerConfig;

/// Interactive compile-and-run server
#[derive(Parser, Debug)]
#[command(name = "code-runner", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "CODE_RUNNER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overrides the config file
    #[arg(short, long, env = "CODE_RUNNER_BIND")]
    bind: Option<String>,

    /// Directory for per-session workspaces, overrides the config file
    #[arg(long, env = "CODE_RUNNER_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,

    /// Kill the program after this many seconds
    #[arg(long, env = "CODE_RUNNER_MAX_RUN_SECS")]
    max_run_secs: Option<u64>,
}

/// Thin entry point; the server lives in the library crate.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(root) = args.workspace_root {
        config.workspace.root = root;
    }
    if args.max_run_secs.is_some() {
        config.engine.max_run_secs = args.max_run_secs;
    }

    code_runner::serve(config).await
}
