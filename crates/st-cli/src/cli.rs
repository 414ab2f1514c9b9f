//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use st_core::Period;

/// Per-domain screen-time tracker.
///
/// Attributes active browsing time to web domains from a stream of tab and
/// window focus events, and reports where the time went.
#[derive(Debug, Parser)]
#[command(name = "st", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Track time live from a JSON-lines event feed on stdin.
    ///
    /// Each line is one event, e.g.
    /// `{"type":"tab_activated","tab_id":1,"window_id":1}`. Events are
    /// stamped on arrival; a line carrying an `at` timestamp is an error, use
    /// `replay` for recorded feeds. The session is flushed at EOF.
    Run,

    /// Replay a timestamped event feed deterministically.
    ///
    /// Every line must carry an `at` timestamp. Periodic flushes are
    /// simulated at the configured interval.
    Replay {
        /// JSON-lines file to replay.
        file: PathBuf,
    },

    /// Show totals and the top domains for a period.
    Report {
        /// Period to report: today, week or all.
        #[arg(long, default_value_t = Period::All)]
        period: Period,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export all recorded data as JSON.
    Export {
        /// File or directory to write to. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete all recorded data.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },

    /// Delete expired daily buckets now.
    Sweep,

    /// Show database location and tracked data.
    Status,
}
