//! Command-line interface for hopelink.
//!
//! This module provides the CLI structure for the `hopelink` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AddCommand, ConfigCommand, DeleteCommand, ExportCommand, FilterArgs, ListCommand, LoginArgs,
    OutputFormat, RoleArg, StatsCommand, StatusCommand, SummaryCommand, WatchCommand,
};

/// hopelink - wandering-detector registry for dementia care centers
///
/// Registers GPS wandering detectors handed out to patients and keeps the
/// registry in a shared cloud collection, or in a local database when no
/// cloud project is configured.
#[derive(Debug, Parser)]
#[command(name = "hopelink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show which backend is active and how many records it holds
    Status(StatusCommand),

    /// Print a line whenever the visible record set changes
    Watch(WatchCommand),

    /// List visible records
    List(ListCommand),

    /// Register a new patient
    Add(AddCommand),

    /// Delete a record
    Delete(DeleteCommand),

    /// Export visible records as CSV
    Export(ExportCommand),

    /// Show dashboard figures
    Stats(StatsCommand),

    /// Ask the AI service for a narrative summary
    Summary(SummaryCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "hopelink");
    }

    #[test]
    fn test_verbosity_levels() {
        use crate::logging::Verbosity;
        assert_eq!(cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(3, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_status() {
        let cli = Cli::try_parse_from(["hopelink", "status", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Status(StatusCommand { json: true })));
    }

    #[test]
    fn test_parse_list_as_center() {
        let cli = Cli::try_parse_from([
            "hopelink",
            "list",
            "--role",
            "center",
            "--center",
            "광주광역시 남구 치매안심센터",
            "--password",
            "3333",
            "--search",
            "김",
            "--format",
            "json",
        ])
        .unwrap();

        let Command::List(cmd) = cli.command else {
            panic!("expected list command");
        };
        assert_eq!(cmd.login.role, RoleArg::Center);
        assert_eq!(cmd.login.center.as_deref(), Some("광주광역시 남구 치매안심센터"));
        assert_eq!(cmd.filter.search, "김");
        assert_eq!(cmd.format, OutputFormat::Json);
    }

    #[test]
    fn test_login_defaults_to_admin() {
        let cli = Cli::try_parse_from(["hopelink", "stats", "--password", "1234"]).unwrap();
        let Command::Stats(cmd) = cli.command else {
            panic!("expected stats command");
        };
        assert_eq!(cmd.login.role, RoleArg::Admin);
        assert!(!cmd.json);
    }

    #[test]
    fn test_password_required() {
        assert!(Cli::try_parse_from(["hopelink", "list"]).is_err());
    }

    #[test]
    fn test_parse_add() {
        let cli = Cli::try_parse_from([
            "hopelink",
            "add",
            "--password",
            "1234",
            "--name",
            "홍길동",
            "--serial",
            "1234567",
            "--consent",
            "consent.pdf",
        ])
        .unwrap();
        let Command::Add(cmd) = cli.command else {
            panic!("expected add command");
        };
        assert_eq!(cmd.name.as_deref(), Some("홍길동"));
        assert_eq!(cmd.consent, Some(PathBuf::from("consent.pdf")));
        assert!(cmd.input.is_none());
    }

    #[test]
    fn test_parse_delete() {
        let cli =
            Cli::try_parse_from(["hopelink", "delete", "--password", "1234", "1700000000001"])
                .unwrap();
        assert!(matches!(cli.command, Command::Delete(DeleteCommand { ref id, .. }) if id == "1700000000001"));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(["hopelink", "config", "validate", "--file", "x.toml"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }
}
