use clap::{Parser, Subcommand};

/// CLI surface definition: operator commands for the bridge's durable
/// session cache and storage health.
#[derive(Parser, Debug)]
#[command(
    name = "palantir",
    about = "Operator tooling for the embedded wallet bridge",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to a storage health check when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Run a health check against the encrypted session store.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Inspect or clear the cached session facts.
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Print the cached session facts.
    Show,
    /// Clear the auth-login cache unit (email, login flag, chain, username).
    Clear,
}
