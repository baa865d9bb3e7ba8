//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Run command arguments.
#[derive(Debug, Default, Args)]
pub struct RunCommand {
    /// Read card UIDs from this device or file instead of the configured one
    #[arg(short, long, value_name = "PATH")]
    pub device: Option<PathBuf>,

    /// Listen on this address instead of the configured one
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Do not start the web server
    #[arg(long)]
    pub no_server: bool,
}

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Card UID in hex, e.g. 041AFF or "04 1A FF"
    pub uid: String,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output the raw record document as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Rename command arguments.
#[derive(Debug, Args)]
pub struct RenameCommand {
    /// Card UID in hex
    pub uid: String,

    /// New display name
    pub name: String,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Write to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_default() {
        let cmd = RunCommand::default();
        assert!(cmd.device.is_none());
        assert!(cmd.bind.is_none());
        assert!(!cmd.no_server);
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: true };
        assert!(format!("{cmd:?}").contains("Show"));
    }
}
