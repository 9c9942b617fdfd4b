//! CLI module for A.R.E.S Research
//!
//! Provides command-line interface parsing for the ares-research binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod init;
pub mod output;

use crate::types::ReportMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// A.R.E.S Research - recursive and multi-agent research orchestration
#[derive(Parser, Debug)]
#[command(
    name = "ares-research",
    author = "Dirmacs <build@dirmacs.com>",
    version,
    about = "A.R.E.S Research - recursive and multi-agent research orchestration",
    long_about = "Explores a query as a tree of subtopics or with a crew of role agents,\n\
                  deduplicates section headers across branches, and writes one ordered\n\
                  markdown report with a deduplicated reference list.",
    after_help = "EXAMPLES:\n    \
                  ares-research init                                  # Scaffold ares-research.toml and a fixture\n    \
                  ares-research run \"grid storage\"                    # Deep-recursive run with configured limits\n    \
                  ares-research run \"grid storage\" -m multi-agent     # Role crew with review rounds\n    \
                  ares-research config --validate                     # Check the configuration file"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "ares-research.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Research a query and write the report
    Run {
        /// The research query
        query: String,

        /// Report mode
        #[arg(short, long, value_enum, default_value_t = ReportMode::DeepRecursive)]
        mode: ReportMode,

        /// Maximum recursion depth (deep-recursive mode)
        #[arg(short, long)]
        depth: Option<u32>,

        /// Maximum subtopics per branch
        #[arg(short, long)]
        breadth: Option<usize>,

        /// Branches or sections in flight at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Write the markdown report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replay fixture overriding `[gateway].fixture`
        #[arg(long, env = "ARES_RESEARCH_FIXTURE")]
        fixture: Option<PathBuf>,
    },

    /// Initialize a project with a configuration file and a sample fixture
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration information
    Config {
        /// Validate the configuration file and exit
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
