pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "tenant-db-router")]
#[command(about = "Multi-tenant connection router - one PostgreSQL pool per tenant")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve,

    #[command(about = "Encrypt a tenant database password for the tenants table")]
    Encrypt {
        #[arg(help = "Plaintext password")]
        password: String,
    },

    #[command(about = "Mint a development JWT")]
    Token {
        #[arg(long, help = "User id (sub claim)")]
        user: Uuid,
        #[arg(long, help = "Organization id (org claim)")]
        org: Uuid,
        #[arg(long, default_value = "user", help = "Access level, e.g. root")]
        access: String,
    },

    #[command(about = "Check the /health endpoint of a running server")]
    Ping {
        #[arg(long, help = "Server base URL (defaults to http://127.0.0.1:$PORT)")]
        url: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli, config: &AppConfig) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => commands::serve::handle(config).await,
        Commands::Encrypt { password } => commands::encrypt::handle(config, &password, output_format),
        Commands::Token { user, org, access } => {
            commands::token::handle(config, user, org, &access, output_format)
        }
        Commands::Ping { url } => commands::ping::handle(config, url, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["tenant-db-router"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn parses_token_arguments() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "tenant-db-router",
            "token",
            "--user",
            &user.to_string(),
            "--org",
            &org.to_string(),
            "--access",
            "root",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Some(Commands::Token { user: u, org: o, access }) => {
                assert_eq!((u, o, access.as_str()), (user, org, "root"));
            }
            _ => panic!("expected token command"),
        }
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(Cli::try_parse_from(["tenant-db-router", "token", "--user", "nope", "--org", "nope"]).is_err());
    }
}
