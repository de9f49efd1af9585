//! CLI command definitions and dispatch.

mod login;
mod logout;
mod sign;
mod version;

use a3s_sign_core::config::LogLevel;
use clap::{Parser, Subcommand};

/// A3S Sign: sign OCI artifacts in registries and local layouts.
#[derive(Parser)]
#[command(name = "a3s-sign", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Log level requested on the command line.
    pub fn log_level(&self) -> LogLevel {
        match &self.command {
            Command::Sign(args) => args.log_level(),
            _ => LogLevel::Warn,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Sign an artifact stored in a registry or an OCI layout
    Sign(sign::SignArgs),
    /// Store registry credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Sign(args) => sign::execute(args).await,
        Command::Login(args) => login::execute(args).await,
        Command::Logout(args) => logout::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
