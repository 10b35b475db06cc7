// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Connect and stream tag values (default)
//! - `validate`: Check the parameter file
//! - `version`: Show version information

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// tagwatch - OPC UA telemetry client
///
/// Connects to one OPC UA server, subscribes to the tags listed in the
/// parameter file and prints every value change.
#[derive(Parser, Debug)]
#[command(
    name = "tagwatch",
    author = "Sylvex <contact@sylvex.io>",
    version = crate::VERSION,
    about = "Console OPC UA telemetry client",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Parameter file path
    #[arg(
        short,
        long,
        default_value = "params.txt",
        env = "TAGWATCH_PARAMS",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        default_value = "info",
        env = "TAGWATCH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json, compact)
    #[arg(long, default_value = "text", env = "TAGWATCH_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Enable quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Connect to the server and stream tag values
    ///
    /// This is the default command when no subcommand is specified.
    /// Runs until interrupted or until the session faults.
    Run(RunArgs),

    /// Validate the parameter file
    ///
    /// Parses the parameter file without connecting and prints a summary.
    Validate(ValidateArgs),

    /// Show version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Trust server certificates that are only missing from the trusted store
    #[arg(long, env = "TAGWATCH_AUTO_ACCEPT")]
    pub auto_accept_untrusted: bool,

    /// PKI directory (own, private, trusted, rejected)
    #[arg(long, env = "TAGWATCH_PKI_DIR")]
    pub pki_dir: Option<PathBuf>,

    /// Create a self-signed application certificate when none exists
    #[arg(long)]
    pub generate_certificate: bool,

    /// Subscription publishing interval (e.g. 500ms, 1s)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub publishing_interval: Option<Duration>,

    /// Requested session timeout
    #[arg(long, value_parser = humantime::parse_duration)]
    pub session_timeout: Option<Duration>,

    /// Budget for secure channel and session creation
    #[arg(long, value_parser = humantime::parse_duration)]
    pub operation_timeout: Option<Duration>,

    /// Budget for endpoint discovery
    #[arg(long, value_parser = humantime::parse_duration)]
    pub discovery_timeout: Option<Duration>,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Check if verbose logging is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Get the effective log level based on flags.
    pub fn effective_log_level(&self) -> &str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["tagwatch"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
        assert_eq!(cli.config, PathBuf::from("params.txt"));
    }

    #[test]
    fn test_run_defaults_keep_auto_accept_off() {
        let cli = Cli::parse_from(["tagwatch", "run"]);
        if let Some(Commands::Run(args)) = cli.command {
            assert!(!args.auto_accept_untrusted);
            assert!(args.publishing_interval.is_none());
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_run_durations() {
        let cli = Cli::parse_from([
            "tagwatch",
            "run",
            "--auto-accept-untrusted",
            "--publishing-interval",
            "250ms",
            "--discovery-timeout",
            "3s",
            "--pki-dir",
            "/var/lib/tagwatch/pki",
        ]);
        if let Some(Commands::Run(args)) = cli.command {
            assert!(args.auto_accept_untrusted);
            assert_eq!(args.publishing_interval, Some(Duration::from_millis(250)));
            assert_eq!(args.discovery_timeout, Some(Duration::from_secs(3)));
            assert_eq!(args.pki_dir, Some(PathBuf::from("/var/lib/tagwatch/pki")));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_bad_duration_rejected() {
        let result = Cli::try_parse_from(["tagwatch", "run", "--session-timeout", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["tagwatch", "validate", "--format", "json"]);
        if let Some(Commands::Validate(args)) = cli.command {
            assert_eq!(args.format, OutputFormat::Json);
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["tagwatch", "-c", "/etc/tagwatch/line1.txt"]);
        assert_eq!(cli.config, PathBuf::from("/etc/tagwatch/line1.txt"));
    }

    #[test]
    fn test_log_flags() {
        let cli = Cli::parse_from(["tagwatch", "-l", "trace", "--log-format", "json"]);
        assert_eq!(cli.effective_log_level(), "trace");
        assert_eq!(cli.log_format, LogFormat::Json);

        let cli = Cli::parse_from(["tagwatch", "-q"]);
        assert_eq!(cli.effective_log_level(), "warn");

        let cli = Cli::parse_from(["tagwatch", "-v"]);
        assert!(cli.is_verbose());
        assert_eq!(cli.effective_log_level(), "debug");
    }
}
