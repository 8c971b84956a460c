//! CLI module for snowfakery-mcp - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
