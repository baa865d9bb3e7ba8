//! Command-line interface for the `cardlog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ExportCommand, ListCommand, RenameCommand, RunCommand, ScanCommand,
};

use crate::logging::Verbosity;

/// cardlog - Record RFID card scans
///
/// Reads card UIDs from a reader, stamps each scan with the local time and
/// stores it, and serves a small web UI for naming cards and exporting data.
#[derive(Debug, Parser)]
#[command(name = "cardlog")]
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
    /// Read cards and serve the web UI until interrupted
    Run(RunCommand),

    /// Record a single scan of the given UID
    Scan(ScanCommand),

    /// List recorded cards
    List(ListCommand),

    /// Set a card's display name
    Rename(RenameCommand),

    /// Export all records as JSON
    Export(ExportCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "cardlog");
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["cardlog", "list"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["cardlog", "-q", "list"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["cardlog", "-v", "list"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["cardlog", "-vv", "list"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_run() {
        let cli = parse(&["cardlog", "run", "--device", "/dev/ttyUSB0", "--no-server"]);
        let Command::Run(run) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(run.device, Some(PathBuf::from("/dev/ttyUSB0")));
        assert!(run.no_server);
        assert!(run.bind.is_none());
    }

    #[test]
    fn test_parse_scan() {
        let cli = parse(&["cardlog", "scan", "041AFF"]);
        assert!(matches!(cli.command, Command::Scan(ScanCommand { ref uid }) if uid == "041AFF"));
    }

    #[test]
    fn test_parse_rename() {
        let cli = parse(&["cardlog", "rename", "041AFF", "Alice Smith"]);
        let Command::Rename(rename) = cli.command else {
            panic!("expected rename command");
        };
        assert_eq!(rename.uid, "041AFF");
        assert_eq!(rename.name, "Alice Smith");
    }

    #[test]
    fn test_rename_requires_name() {
        assert!(Cli::try_parse_from(["cardlog", "rename", "041AFF"]).is_err());
    }

    #[test]
    fn test_parse_export_with_output() {
        let cli = parse(&["cardlog", "export", "-o", "out.json"]);
        let Command::Export(export) = cli.command else {
            panic!("expected export command");
        };
        assert_eq!(export.output, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_parse_list_json() {
        let cli = parse(&["cardlog", "list", "--json"]);
        assert!(matches!(cli.command, Command::List(ListCommand { json: true })));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = parse(&["cardlog", "config", "validate", "--file", "x.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["cardlog", "-c", "/custom/config.toml", "list"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }
}
