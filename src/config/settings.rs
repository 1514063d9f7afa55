use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ctxwatch_core::config::Settings;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Context-window usage tracking for AI coding agent sessions"
)]
pub struct Config {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Context-window limit in tokens
    #[arg(short = 'l', long, global = true)]
    pub limit: Option<u64>,

    /// Directory holding per-session snapshots
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Follow a transcript and keep the session's usage snapshot current
    Watch {
        /// Session id (letters, digits, '-' and '_')
        session: String,
        /// Transcript file to follow (NDJSON)
        transcript: PathBuf,
        /// Polling interval in milliseconds
        #[arg(short = 'i', long)]
        poll_interval: Option<u64>,
        /// Disable filesystem event wakeups (poll only)
        #[arg(long)]
        no_fs_events: bool,
    },
    /// Show the current usage and advisory level of a session
    Status {
        session: String,
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Back up the session's snapshot and start a new iteration from zero
    Reset { session: String },
    /// Summarize a complete transcript without touching any snapshot
    Scan {
        transcript: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Merge CLI flags into settings (CLI takes precedence)
    pub fn merge_into(&self, settings: &mut Settings) {
        if let Some(limit) = self.limit {
            settings.context_limit = limit;
        }
        if let Some(dir) = &self.state_dir {
            settings.state_dir = Some(dir.clone());
        }
        if let Command::Watch {
            poll_interval,
            no_fs_events,
            ..
        } = &self.command
        {
            if let Some(interval) = poll_interval {
                settings.poll_interval_ms = *interval;
            }
            if *no_fs_events {
                settings.fs_events = false;
            }
        }
    }
}
