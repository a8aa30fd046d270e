//! CLI module for reviewq - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
