use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::rules::Severity;
use crate::utils::config::OutputFormat;

#[derive(Parser)]
#[command(name = "snare")]
#[command(about = "A static scanner for injection, XSS, traversal and weak-crypto patterns in Java sources")]
#[command(version)]
pub struct Cli {
    /// Config file merged over the defaults (instead of `snare.local`)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to stderr as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan files or directories (`-` reads one file from stdin)
    Scan {
        /// Files or directories to scan
        #[arg(required = true)]
        paths: Vec<String>,

        /// Run only these rule ids
        #[arg(long, value_delimiter = ',')]
        rules: Vec<String>,

        /// Skip these rule ids
        #[arg(long, value_delimiter = ',')]
        disable: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Do not report findings below this severity
        #[arg(long)]
        min_severity: Option<Severity>,

        /// Exit with status 1 when a finding at or above this severity is reported
        #[arg(long)]
        fail_on: Option<Severity>,

        /// Report at most this many findings
        #[arg(long)]
        max_results: Option<usize>,

        /// Name reported for source read from stdin
        #[arg(long, default_value = "stdin.java")]
        stdin_name: String,
    },

    /// List the rule catalog
    Rules {
        /// Show description and remediation
        #[arg(short, long)]
        verbose: bool,
    },

    /// Scan two versions and report which rules were fixed, remain or were introduced
    Compare {
        before: PathBuf,
        after: PathBuf,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Print the effective configuration
    Config,
}
