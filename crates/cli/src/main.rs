mod config_commands;
mod doctor_commands;
mod robots_commands;
mod run_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "pagemine", version, about = "pagemine, browser-driven page structure miner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: discover pagemine.{toml,yaml,yml,json}).
    #[arg(long, short, global = true, env = "PAGEMINE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured mining instances to completion.
    Run(run_commands::RunArgs),
    /// Show the robots.txt decision for a URL.
    Robots {
        /// URL to check.
        url: String,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Check the browser, config and host resources.
    Doctor,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries bundle JSON, so logs go to stderr
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "pagemine starting");

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => run_commands::handle_run(config_path, args).await,
        Commands::Robots { url } => robots_commands::handle_robots(config_path, &url).await,
        Commands::Config { action } => config_commands::handle_config(config_path, action),
        Commands::Doctor => doctor_commands::handle_doctor(config_path).await,
    }
}
