//! Command-line interface for safeguard.
//!
//! This module provides the CLI structure, the session command language and
//! the step driver used by the `safeguard` binary.

mod commands;
pub mod script;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CapabilityArg, ConfigCommand, DemoCommand, MatchCommand, OutputFormat, RunCommand,
};
pub use script::{parse_script, read_script, Driver, Outcome, Step, DEFAULT_SCENARIO};

/// safeguard - Emergency trigger engine
///
/// Watches sound levels, voice commands and the emergency button, and
/// switches into emergency mode on the first qualifying signal. Devices are
/// simulated; alerts are logged, never sent.
#[derive(Debug, Parser)]
#[command(name = "safeguard")]
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
    /// Run an interactive session, reading commands from stdin
    Run(RunCommand),

    /// Run a scripted session and print the timeline
    Demo(DemoCommand),

    /// Show which trigger phrase a transcript matches
    Match(MatchCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.verbose, self.quiet)
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
            command: Command::Config(ConfigCommand::Path),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "safeguard");
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
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_denials() {
        let args = vec!["safeguard", "run", "--deny", "microphone", "-d", "speech"];
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Run(run) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(run.deny, vec![CapabilityArg::Microphone, CapabilityArg::Speech]);
    }

    #[test]
    fn test_parse_demo_steps_keep_order() {
        let args = vec![
            "safeguard", "demo", "--step", "level 85", "--step", "sos", "--format", "json",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Demo(demo) = cli.command else {
            panic!("expected demo command");
        };
        assert_eq!(demo.step, vec!["level 85", "sos"]);
        assert_eq!(demo.format, OutputFormat::Json);
        assert!(demo.script.is_none());
    }

    #[test]
    fn test_parse_demo_script_conflicts_with_steps() {
        let args = vec!["safeguard", "demo", "--script", "a.txt", "--step", "sos"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_parse_match() {
        let args = vec!["safeguard", "match", "I need HELP now", "--all"];
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Match(cmd) = cli.command else {
            panic!("expected match command");
        };
        assert_eq!(cmd.transcript, "I need HELP now");
        assert!(cmd.all);
    }

    #[test]
    fn test_parse_with_config() {
        let args = vec!["safeguard", "-c", "/custom/config.toml", "config", "show"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_after_subcommand() {
        let args = vec!["safeguard", "demo", "-vv"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
