//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - resolve/set/clear: read and write node priorities
//! - rank: percentile-ranked priority list
//! - scope: materialize a scope
//! - next: simulate review steps
//! - shield/history: priority shield now and over time

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// reviewq - priority ranking and scheduling for knowledge-graph review queues
#[derive(Parser, Debug)]
#[command(name = "reviewq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Graph snapshot (JSON) to operate on
    #[arg(short, long, global = true, default_value = "graph.json")]
    pub graph: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show a node's effective priority and where it comes from
    Resolve {
        /// Node ID
        node: String,
    },

    /// Set a manual priority on a node
    Set {
        /// Node ID
        node: String,

        /// Priority, 0 (most important) to 100
        priority: i64,
    },

    /// Remove a node's priority tag
    Clear {
        /// Node ID
        node: String,
    },

    /// List cached priorities with their percentiles
    Rank {
        /// Only nodes in the scope of this root
        #[arg(short, long)]
        scope: Option<String>,

        /// Maximum rows to print
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Build the cache in two phases: tagged nodes first, the rest in paced batches
        #[arg(long)]
        deferred: bool,
    },

    /// Print the node set belonging to a root
    Scope {
        /// Root node ID
        root: String,
    },

    /// Run review steps and print what would be shown
    Next {
        /// Restrict the session to this root's scope
        #[arg(short, long)]
        scope: Option<String>,

        /// Queue mode (due, practice-all, in-order)
        #[arg(short, long)]
        mode: Option<String>,

        /// Number of steps to run
        #[arg(long, default_value_t = 10)]
        steps: usize,

        /// 0.0 (sorted) to 1.0 (shuffled)
        #[arg(short, long)]
        randomness: Option<f64>,

        /// RNG seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Start the configured cooldown before the first step
        #[arg(long)]
        cooldown: bool,
    },

    /// Compute today's priority shield and record it
    Shield {
        /// Also compute the shield for this root's scope
        #[arg(short, long)]
        scope: Option<String>,

        /// Build the cache in two phases before computing
        #[arg(long)]
        deferred: bool,
    },

    /// Show recorded shield history
    History {
        /// Scope root (knowledge base when omitted)
        #[arg(short, long)]
        scope: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_next() {
        let cli = Cli::try_parse_from([
            "reviewq", "--graph", "g.json", "next", "--scope", "doc", "--steps", "3", "--seed", "9",
        ])
        .unwrap();
        assert_eq!(cli.graph, PathBuf::from("g.json"));
        match cli.command {
            Commands::Next { scope, steps, seed, .. } => {
                assert_eq!(scope.as_deref(), Some("doc"));
                assert_eq!(steps, 3);
                assert_eq!(seed, Some(9));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_set_and_default_graph() {
        let cli = Cli::try_parse_from(["reviewq", "set", "n1", "42", "-v"]).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.graph, PathBuf::from("graph.json"));
        assert!(matches!(cli.command, Commands::Set { priority: 42, .. }));
    }

    #[test]
    fn test_parse_rank_deferred() {
        let cli = Cli::try_parse_from(["reviewq", "rank", "--deferred", "-n", "5"]).unwrap();
        match cli.command {
            Commands::Rank { deferred, limit, scope } => {
                assert!(deferred);
                assert_eq!(limit, 5);
                assert!(scope.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["reviewq", "shield"]).unwrap();
        assert!(matches!(cli.command, Commands::Shield { deferred: false, .. }));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["reviewq"]).is_err());
    }
}
