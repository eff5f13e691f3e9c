//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand, ValueEnum};

use super::parse_when;

/// Account commands.
#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Create an account and sign in
    SignUp {
        /// Email address
        email: String,

        /// Name shown to other members
        #[arg(short, long)]
        name: String,

        /// Password (at least 6 characters)
        #[arg(short, long)]
        password: String,
    },

    /// Sign in to an existing account
    SignIn {
        /// Email address
        email: String,

        /// Password
        #[arg(short, long)]
        password: String,
    },

    /// Sign out
    SignOut,

    /// Show the signed-in user
    Whoami,
}

/// Capsule commands.
#[derive(Debug, Subcommand)]
pub enum CapsuleCommand {
    /// Create a capsule
    Create {
        /// Capsule name
        name: String,

        /// Unlock time (RFC 3339, "YYYY-MM-DD" or "YYYY-MM-DD HH:MM", UTC)
        #[arg(short, long, value_parser = parse_when)]
        unlock: DateTime<Utc>,
    },

    /// List your capsules
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one capsule
    Show {
        /// Capsule id
        id: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Join a capsule with its six-digit share code
    Join {
        /// Share code
        code: String,
    },

    /// Invite users by email
    Invite {
        /// Capsule id
        id: String,

        /// Comma, semicolon or newline separated addresses
        emails: String,
    },

    /// Remove a member (or leave, when given your own id)
    RemoveMember {
        /// Capsule id
        id: String,

        /// User id to remove
        user_id: String,
    },

    /// Print the share link and invite message
    Link {
        /// Capsule id
        id: String,
    },
}

/// Clip commands.
#[derive(Debug, Subcommand)]
pub enum ClipCommand {
    /// Upload a video into a capsule
    Upload {
        /// Capsule id
        capsule: String,

        /// Video file (mov, mp4 or m4v)
        file: PathBuf,

        /// When the video was recorded; defaults to the file's timestamps
        #[arg(long, value_parser = parse_when)]
        recorded_at: Option<DateTime<Utc>>,

        /// Video length in milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,
    },

    /// List an unsealed capsule's clips in playback order
    List {
        /// Capsule id
        capsule: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Sweep command arguments.
#[derive(Debug, Args)]
pub struct SweepCommand {
    /// Keep sweeping at the configured interval until interrupted
    #[arg(short, long)]
    pub watch: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
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

    /// Show configuration file path
    Path,

    /// Validate configuration file
    Validate {
        /// Path to config file (uses default if not specified)
        file: Option<PathBuf>,
    },
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned table
    #[default]
    Table,
    /// JSON
    Json,
}
