//! CLI command definitions using clap.
//!
//! - serve: run the MCP server on stdio (default)
//! - call: invoke one tool and print its structured result
//! - tools: list the available tools
//! - config: print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// MCP server for authoring, checking and running Snowfakery recipes
#[derive(Parser, Debug)]
#[command(name = "snowfakery-mcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory every recipe path and run directory is confined to
    #[arg(short, long, global = true)]
    pub workspace_root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve MCP over stdin/stdout
    Serve,

    /// Invoke a single tool
    Call {
        /// Tool name, e.g. validate_recipe
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },

    /// List available tools
    Tools,

    /// Print the effective configuration
    Config,
}
