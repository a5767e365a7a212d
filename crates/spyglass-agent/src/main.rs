use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use spyglass_agent::{config, Settings};

#[derive(Debug, Parser)]
#[command(name = "spyglass-agent", version, about = "JSON/HTTP bridge to the in-process management bus")]
struct Cli {
    /// Listen address (overrides the config file).
    #[arg(long)]
    listen: Option<String>,

    /// Path to the agent TOML config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Register the built-in demo beans.
    #[arg(long)]
    demo: bool,

    /// Verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = start(cli).await {
        eprintln!("spyglass-agent: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn start(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    let settings = Settings {
        listen: config.listen_addr()?,
        demo: cli.demo || config.demo,
        bridge: config.bridge,
    };
    spyglass_agent::run(settings).await
}
