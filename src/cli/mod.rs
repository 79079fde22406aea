//! # CLI
//!
//! Command-line surface for tokencap.
//!
//! - `serve` - start the gateway
//! - `config init` - write a starter TOML config
//! - `budget get/set/reset/delete` - manage a project's budget from a
//!   terminal without going through the HTTP API

pub mod budget;
pub mod config;
pub mod serve;

pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tokencap", version, about = "Cost-governing gateway for LLM chat APIs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway server
    Serve(ServeArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Manage a project's budget
    #[command(subcommand)]
    Budget(BudgetCommands),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "tokencap.toml")]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long, env = "TOKENCAP_PORT")]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long, env = "TOKENCAP_HOST")]
    pub host: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "TOKENCAP_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a starter configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "tokencap.toml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Subcommand, Debug)]
pub enum BudgetCommands {
    /// Show a project's budget and current spend
    Get(BudgetProjectArgs),
    /// Create or replace a project's budget
    Set(BudgetSetArgs),
    /// Zero a project's spend, keeping historical usage
    Reset(BudgetProjectArgs),
    /// Remove a project's budget (ungates it)
    Delete(BudgetProjectArgs),
}

#[derive(Args, Debug)]
pub struct BudgetProjectArgs {
    /// Project id
    pub project_id: String,

    /// Path to the ledger database
    #[arg(short, long, default_value = "./tokencap.db")]
    pub database: PathBuf,
}

#[derive(Args, Debug)]
pub struct BudgetSetArgs {
    /// Project id
    pub project_id: String,

    /// Budget limit in USD
    #[arg(short, long)]
    pub limit_usd: f64,

    /// Budget period length in days (omit for no expiry)
    #[arg(short = 'd', long)]
    pub period_days: Option<i64>,

    /// Path to the ledger database
    #[arg(long, default_value = "./tokencap.db")]
    pub database: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_defaults() {
        let cli = Cli::try_parse_from(["tokencap", "serve"]).unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.config, PathBuf::from("tokencap.toml"));
                assert!(args.port.is_none());
            }
            _ => panic!("expected Serve command"),
        }
    }

    #[test]
    fn parses_budget_set() {
        let cli = Cli::try_parse_from(["tokencap", "budget", "set", "acme", "--limit-usd", "10"]).unwrap();
        match cli.command {
            Commands::Budget(BudgetCommands::Set(args)) => {
                assert_eq!(args.project_id, "acme");
                assert_eq!(args.limit_usd, 10.0);
            }
            _ => panic!("expected Budget Set command"),
        }
    }

    #[test]
    fn parses_config_init() {
        let cli = Cli::try_parse_from(["tokencap", "config", "init"]).unwrap();
        assert!(matches!(cli.command, Commands::Config(ConfigCommands::Init(_))));
    }
}
