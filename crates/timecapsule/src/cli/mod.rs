//! Command-line interface for timecapsule.
//!
//! This module provides the CLI structure for the `tcc` binary.

mod commands;

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};

pub use commands::{
    AuthCommand, CapsuleCommand, ClipCommand, ConfigCommand, OutputFormat, StatusCommand,
    SweepCommand,
};

/// tcc - Record together, watch together later
///
/// Create time capsules, invite friends, add video clips and watch them all
/// in recording order once the capsule unseals.
#[derive(Debug, Parser)]
#[command(name = "tcc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
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
    /// Sign up, sign in and out
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Create, join and share capsules
    #[command(subcommand)]
    Capsule(CapsuleCommand),

    /// Upload and list clips
    #[command(subcommand)]
    Clip(ClipCommand),

    /// Unseal capsules whose unlock time has passed
    Sweep(SweepCommand),

    /// Show storage status
    Status(StatusCommand),

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
                2 => crate::logging::Verbosity::Debug,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

/// Parse a point in time given on the command line. Times without an
/// offset are taken as UTC; a bare date means midnight.
///
/// # Errors
///
/// Returns a message listing the accepted forms.
pub fn parse_when(input: &str) -> Result<DateTime<Utc>, String> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    Err(format!(
        "invalid time '{input}': expected RFC 3339, YYYY-MM-DD or \"YYYY-MM-DD HH:MM\""
    ))
}
