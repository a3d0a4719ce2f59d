//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use crate::config::Environment;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Course asset synchronizer CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name, relative to root (default: coursync.toml)
    #[arg(short = 'C', long, default_value = "coursync.toml")]
    pub config: PathBuf,

    /// Content directory searched for images (relative to project root)
    #[arg(short, long)]
    pub content: Option<PathBuf>,

    /// Environment that selects the destination directory
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Override the destination directory of the selected environment
    #[arg(short, long)]
    pub dest: Option<PathBuf>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Copy images from the content tree into the destination when they are stale
    Sync {
        /// Print the sync report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Watch the content tree and keep the destination in sync
    Watch,

    /// Serve the site, resyncing and restarting on image changes
    Serve {
        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// The port you should provide
        #[arg(short, long)]
        port: Option<u16>,

        /// enable watch
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },

    /// Replace %COURSE_NAME% / %COURSE_URL% and normalize code languages in an HTML file
    Html {
        /// HTML file to process
        input: PathBuf,

        /// Write the result here instead of rewriting the input in place
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    pub const fn is_watch(&self) -> bool {
        matches!(self.command, Commands::Watch)
    }
    pub const fn is_serve(&self) -> bool {
        matches!(self.command, Commands::Serve { .. })
    }
}
