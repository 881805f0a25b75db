use std::io::IsTerminal;

use crate::client::CrmClient;
use crate::error::LookupError;

use super::output::{
    print_error, print_json, print_pretty, render_custom_values, render_location,
    render_locations, render_token, OutputMode,
};

/// The lookup a single CLI invocation performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupCommand {
    Locations {
        query: Option<String>,
        limit: Option<u32>,
    },
    Location {
        id: String,
    },
    CustomValues {
        id: String,
    },
    Token {
        show_refresh: bool,
    },
}

/// Run one command end to end. Returns `false` when an error was printed.
pub async fn run_lookup(config_path: Option<&str>, command: LookupCommand, json: bool) -> bool {
    let mode = OutputMode::from_flag(json);
    let is_tty = std::io::stdout().is_terminal();
    match execute(config_path, command, mode, is_tty).await {
        Ok(()) => true,
        Err(err) => {
            print_error(&err, mode, std::io::stderr().is_terminal());
            false
        }
    }
}

async fn execute(
    config_path: Option<&str>,
    command: LookupCommand,
    mode: OutputMode,
    is_tty: bool,
) -> Result<(), LookupError> {
    let client = CrmClient::from_env(config_path)?;
    tracing::debug!(base_url = %client.config().api_base_url, "client ready");

    match command {
        LookupCommand::Locations { query, limit } => {
            let lookup = client.list_locations(query.as_deref(), limit).await?;
            match mode {
                OutputMode::Json => print_json(&lookup),
                OutputMode::Pretty => print_pretty(&render_locations(&lookup, is_tty)),
            }
        }
        LookupCommand::Location { id } => {
            let lookup = client.location(&id).await?;
            match mode {
                OutputMode::Json => print_json(&lookup),
                OutputMode::Pretty => print_pretty(&render_location(&lookup, is_tty)),
            }
        }
        LookupCommand::CustomValues { id } => {
            let lookup = client.custom_values(&id).await?;
            match mode {
                OutputMode::Json => print_json(&lookup),
                OutputMode::Pretty => print_pretty(&render_custom_values(&lookup, is_tty)),
            }
        }
        LookupCommand::Token { show_refresh } => {
            let status = client.token_status(show_refresh).await?;
            match mode {
                OutputMode::Json => print_json(&status),
                OutputMode::Pretty => print_pretty(&render_token(&status, is_tty)),
            }
        }
    }
    Ok(())
}
