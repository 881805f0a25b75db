use clap::{Parser, Subcommand};

use crmlookup::cli::lookup::{run_lookup, LookupCommand};

#[derive(Parser)]
#[command(name = "crmlookup", version, about = "Look up CRM locations and custom values over OAuth")]
struct Cli {
    /// Config file to load before the default locations
    #[arg(long, global = true)]
    config: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search locations
    Locations {
        /// Free-text search
        #[arg(long)]
        query: Option<String>,

        /// Maximum results (1-100)
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show one location
    Location {
        /// Location id
        id: String,
    },

    /// List a location's custom values, probing known endpoints
    #[command(name = "custom-values")]
    CustomValues {
        /// Location id
        id: String,
    },

    /// Acquire an access token and report its expiry
    Token {
        /// Also print the refresh token the provider returned
        #[arg(long)]
        show_refresh: bool,
    },
}

impl From<Commands> for LookupCommand {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Locations { query, limit } => LookupCommand::Locations { query, limit },
            Commands::Location { id } => LookupCommand::Location { id },
            Commands::CustomValues { id } => LookupCommand::CustomValues { id },
            Commands::Token { show_refresh } => LookupCommand::Token { show_refresh },
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CRMLOOKUP_LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if !run_lookup(cli.config.as_deref(), cli.command.into(), cli.json).await {
        std::process::exit(1);
    }
}
