use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod init;
pub mod inspect;
pub mod run;
pub mod version;

#[derive(Parser)]
#[command(name = "attestor")]
#[command(author = "Attestor Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Link project contributors to subjects and relationships on a ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Summary output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Attest every contributor in a manifest
    Run {
        /// Path to the JSON manifest (project + contributors)
        #[arg(long)]
        manifest: String,

        /// Path to config file (default: ~/.local/share/attestor/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Simulated ledger state file; created if missing, updated after the run
        #[arg(long)]
        ledger_state: Option<String>,

        /// Override the configured failure mode (abort or continue)
        #[arg(long)]
        failure_mode: Option<String>,

        /// Override the configured attempts per ledger operation (1-10)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Override the configured base retry delay (e.g. 250ms)
        #[arg(long)]
        base_delay: Option<String>,

        /// Summary output format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },

    /// Write a default configuration file
    Init {
        /// Where to write the config (default: ~/.local/share/attestor/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Show the contents of a simulated ledger state file
    Inspect {
        /// Simulated ledger state file
        #[arg(long)]
        ledger_state: String,
    },

    /// Display version information
    Version,
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run {
            manifest,
            config,
            ledger_state,
            failure_mode,
            max_attempts,
            base_delay,
            output,
        } => {
            let overrides = run::Overrides {
                failure_mode,
                max_attempts,
                base_delay,
            };
            run::execute(manifest, config, ledger_state, overrides, output).await
        }
        Commands::Init { config, force } => init::execute(config, force),
        Commands::Inspect { ledger_state } => inspect::execute(ledger_state),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
