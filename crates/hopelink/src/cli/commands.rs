//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::auth::{LoginRequest, Role};
use crate::listing::ListFilter;

/// Credentials shared by every command that needs a session.
#[derive(Debug, Clone, Args)]
pub struct LoginArgs {
    /// Log in as the administrator or as center staff
    #[arg(long, value_enum, default_value = "admin")]
    pub role: RoleArg,

    /// Center to log in as (center role; defaults to the first center)
    #[arg(long)]
    pub center: Option<String>,

    /// Shared password
    #[arg(long)]
    pub password: String,
}

impl LoginArgs {
    /// The login request these flags describe.
    #[must_use]
    pub fn to_request(&self) -> LoginRequest {
        LoginRequest {
            role: self.role.into(),
            center: self.center.clone(),
            password: self.password.clone(),
        }
    }
}

/// Role argument for logging in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Program administrator, sees every center
    Admin,
    /// Center staff, sees one center
    Center,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Self::Admin,
            RoleArg::Center => Self::Center,
        }
    }
}

/// Search flags of the list and export commands.
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Substring of name, serial number or guardian name
    #[arg(short, long, default_value = "")]
    pub search: String,

    /// Only records of this center
    #[arg(long, value_name = "CENTER")]
    pub only_center: Option<String>,
}

impl From<&FilterArgs> for ListFilter {
    fn from(args: &FilterArgs) -> Self {
        Self {
            search: args.search.clone(),
            center: args.only_center.clone(),
        }
    }
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    #[command(flatten)]
    pub login: LoginArgs,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    #[command(flatten)]
    pub login: LoginArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Add command arguments.
#[derive(Debug, Args)]
pub struct AddCommand {
    #[command(flatten)]
    pub login: LoginArgs,

    /// JSON file with registration fields (camelCase keys)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Patient name (overrides the input file)
    #[arg(long)]
    pub name: Option<String>,

    /// Device serial number (overrides the input file)
    #[arg(long)]
    pub serial: Option<String>,

    /// Consent document to attach (at most 2 MiB)
    #[arg(long, value_name = "FILE")]
    pub consent: Option<PathBuf>,
}

/// Delete command arguments.
#[derive(Debug, Args)]
pub struct DeleteCommand {
    #[command(flatten)]
    pub login: LoginArgs,

    /// Id of the record to delete
    pub id: String,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    #[command(flatten)]
    pub login: LoginArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Output file (defaults to the dated registry file name)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    #[command(flatten)]
    pub login: LoginArgs,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Summary command arguments.
#[derive(Debug, Args)]
pub struct SummaryCommand {
    #[command(flatten)]
    pub login: LoginArgs,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
