mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, drift::DriftSubcommand, inventory::InventorySubcommand,
};
use settings::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cma",
    about = "Collector management agent: keeps local collectors converged with the control plane",
    version,
    propagate_version = true
)]
struct Cli {
    /// Directory holding cma.yaml, the inventory and credentials
    /// (default: <exe dir>/../etc)
    #[arg(long, global = true, env = "CMA_ETC_DIR")]
    etc_dir: Option<PathBuf>,

    /// Agent config file (default: <etc-dir>/cma.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Control-plane API base URL, overrides api.url
    #[arg(long, global = true, env = "CMA_API_URL")]
    api_url: Option<String>,

    /// Log level or filter directive, overrides log.level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent: pollers plus the local HTTP server (default)
    Run,

    /// Inspect and validate the agent config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Inspect the collector inventory
    Inventory {
        #[command(subcommand)]
        subcommand: InventorySubcommand,
    },

    /// Detect out-of-band config changes
    Drift {
        #[command(subcommand)]
        subcommand: DriftSubcommand,
    },

    /// Probe every installed collector once and print its status
    Status,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() {
    let cli = Cli::parse();

    let settings = match Settings::resolve(
        cli.etc_dir,
        cli.config,
        cli.api_url,
        cli.log_level,
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    };

    init_tracing(&settings.config.log.level, settings.config.log.json);

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd::run::run(&settings),
        Commands::Config { subcommand } => cmd::config::run(&settings, subcommand, cli.json),
        Commands::Inventory { subcommand } => {
            cmd::inventory::run(&settings, subcommand, cli.json)
        }
        Commands::Drift { subcommand } => cmd::drift::run(&settings, subcommand, cli.json),
        Commands::Status => cmd::status::run(&settings, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
