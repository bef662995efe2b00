use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use repopulse::config::{self, Config};

#[derive(Parser)]
#[command(author, version, about = "RepoPulse activity server CLI")]
struct Cli {
    /// Path to the configuration file. Defaults to ~/.config/repopulse/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the RepoPulse server
    Start(StartArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct StartArgs {
    /// Listen port, overriding the configuration file
    #[arg(long)]
    port: Option<u16>,

    /// Seconds between aggregation cycles
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Feed the pipeline from the built-in demo connector
    #[arg(long)]
    demo: bool,
}

impl StartArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval_secs = interval;
        }
        if self.demo {
            config.demo_mode = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    repopulse::logging::init()?;

    let cli = Cli::parse();
    let (mut config, config_path) = config::load_or_default(cli.config)?;

    match cli.command {
        Commands::Start(args) => {
            args.apply(&mut config);
            tracing::info!(config = %config_path.display(), "starting repopulse");
            repopulse::server::run(config).await?;
        }
        Commands::Config => {
            println!("# {}", config_path.display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
