//! qattempt CLI — run scenarios against the attempt engine, inspect and
//! regrade stored usages.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(name = "qattempt", version, about = "Question attempt engine and regrader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a usage from a scenario file and play its actions
    Run {
        /// Path to the scenario .toml
        #[arg(long)]
        scenario: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print every step of a stored usage
    Show {
        /// Usage id
        #[arg(long)]
        usage: Uuid,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List stored usages
    List {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Regrade stored usages against a question bank
    Regrade {
        /// Usage ids (repeatable)
        #[arg(long = "usage", required_unless_present = "all")]
        usages: Vec<Uuid>,

        /// Regrade every stored usage
        #[arg(long, conflicts_with = "usages")]
        all: bool,

        /// Question bank file or directory
        #[arg(long)]
        bank: PathBuf,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate question bank TOML files
    Validate {
        /// Path to bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Create starter config and example scenario
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("qattempt=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            scenario,
            format,
            config,
        } => commands::run::execute(scenario, format, config).await,
        Commands::Show { usage, config } => commands::show::execute(usage, config).await,
        Commands::List { config } => commands::show::list(config).await,
        Commands::Regrade {
            usages,
            all,
            bank,
            dry_run,
            format,
            config,
        } => commands::regrade::execute(usages, all, bank, dry_run, format, config).await,
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
