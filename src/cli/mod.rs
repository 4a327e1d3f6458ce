//! CLI module - Command-line interface for umdm
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

use crate::domain::AuthMode;

/// umdm - User management with local and Active Directory authentication
#[derive(Parser)]
#[command(name = "umdm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    #[command(alias = "daemon", alias = "web")]
    Serve,

    /// Create default config file
    Init,

    /// Manage accounts
    #[command(alias = "users")]
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// List accounts
    #[command(alias = "ls")]
    List {
        /// Only accounts with this auth mode (LOCAL, AD, LOCAL_OR_AD)
        #[arg(long)]
        auth_mode: Option<AuthMode>,
        /// Free-text search over username, names, email and AD identifier
        #[arg(long, short)]
        query: Option<String>,
    },
    /// Show the full authentication record of an account
    Show {
        /// Username
        username: String,
    },
    /// Create an account
    Create {
        /// Username
        username: String,
        /// Local password; without one the account cannot log in locally
        #[arg(long)]
        password: Option<String>,
        /// Grant access to the admin console
        #[arg(long)]
        staff: bool,
        /// Directory identifier (UPN or DOMAIN\user)
        #[arg(long)]
        ad_identifier: Option<String>,
        /// LOCAL, AD or LOCAL_OR_AD; anything but LOCAL enables AD
        #[arg(long, default_value = "LOCAL")]
        auth_mode: AuthMode,
    },
    /// Set a new local password
    SetPassword {
        /// Username
        username: String,
        /// New password
        password: String,
    },
}

pub use commands::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_a_plain_subcommand() {
        let args = Cli::try_parse_from(["umdm", "init"]).unwrap();
        assert!(matches!(args.command, Some(Commands::Init)));

        assert!(Cli::try_parse_from(["umdm", "--init"]).is_err());
    }

    #[test]
    fn user_list_accepts_auth_mode_filter() {
        let args = Cli::try_parse_from(["umdm", "users", "ls", "--auth-mode", "AD"]).unwrap();
        let Some(Commands::User {
            command: UserCommands::List { auth_mode, query },
        }) = args.command
        else {
            panic!("expected user list");
        };
        assert_eq!(auth_mode, Some(AuthMode::Ad));
        assert!(query.is_none());
    }
}
