//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::capability::Capability;

/// Interactive session arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Refuse a simulated capability (repeatable)
    #[arg(short, long, value_enum, value_name = "CAPABILITY")]
    pub deny: Vec<CapabilityArg>,
}

/// Scripted session arguments.
#[derive(Debug, Args)]
pub struct DemoCommand {
    /// Read steps from a script file, one command per line
    #[arg(short, long, value_name = "FILE", conflicts_with = "step")]
    pub script: Option<PathBuf>,

    /// Add a step (repeatable, run in order), e.g. --step "level 85"
    #[arg(long, value_name = "COMMAND")]
    pub step: Vec<String>,

    /// Refuse a simulated capability (repeatable)
    #[arg(short, long, value_enum, value_name = "CAPABILITY")]
    pub deny: Vec<CapabilityArg>,

    /// Output format for the final timeline
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Keyword match arguments.
#[derive(Debug, Args)]
pub struct MatchCommand {
    /// The transcript to check
    pub transcript: String,

    /// List every matching phrase, not just the first
    #[arg(short, long)]
    pub all: bool,
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

/// Capability argument for the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CapabilityArg {
    /// Audio input
    Microphone,
    /// Video input
    Camera,
    /// Position updates
    Geolocation,
    /// Speech recognition
    Speech,
    /// Vibration motor
    Vibration,
}

impl From<CapabilityArg> for Capability {
    fn from(arg: CapabilityArg) -> Self {
        match arg {
            CapabilityArg::Microphone => Self::Microphone,
            CapabilityArg::Camera => Self::Camera,
            CapabilityArg::Geolocation => Self::Geolocation,
            CapabilityArg::Speech => Self::SpeechRecognition,
            CapabilityArg::Vibration => Self::Vibration,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// JSON output
    Json,
}
