//! CLI argument definitions using clap
//!
//! Commands:
//! - rtstore inspect-log (--config <path> | --data-dir <path>) [--from-generation <g>]
//! - rtstore verify-log  (--config <path> | --data-dir <path>)
//! - rtstore get         (--config <path> | --data-dir <path>) --id <id>... [--committed] [--fl <f,..>]
//! - rtstore apply       (--config <path> | --data-dir <path>)
//! - rtstore compact     (--config <path> | --data-dir <path>)

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// rtstore - versioned document store with real-time get
#[derive(Parser, Debug)]
#[command(name = "rtstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Where the store lives: a config file or a bare data directory.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct StoreTarget {
    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Data directory, with default settings
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print update log records as JSON
    InspectLog {
        #[command(flatten)]
        target: StoreTarget,

        /// Only records applied after the commit of this generation
        #[arg(long)]
        from_generation: Option<u64>,

        /// Print at most this many records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check every record checksum in the update log
    VerifyLog {
        #[command(flatten)]
        target: StoreTarget,
    },

    /// Real-time get of one or more documents
    Get {
        #[command(flatten)]
        target: StoreTarget,

        /// Document id (repeatable)
        #[arg(long = "id", required = true)]
        ids: Vec<String>,

        /// Read the installed snapshot only
        #[arg(long)]
        committed: bool,

        /// Return only these fields (comma separated)
        #[arg(long, value_delimiter = ',')]
        fl: Vec<String>,
    },

    /// Apply operations read from stdin, one JSON request per line
    Apply {
        #[command(flatten)]
        target: StoreTarget,

        /// Soft-commit after the last operation
        #[arg(long)]
        commit: bool,
    },

    /// Run a durable commit, folding the log into the index and compacting it
    Compact {
        #[command(flatten)]
        target: StoreTarget,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["rtstore", "verify-log"]).is_err());
        assert!(Cli::try_parse_from([
            "rtstore",
            "verify-log",
            "--config",
            "a.json",
            "--data-dir",
            "data"
        ])
        .is_err());

        let cli = Cli::try_parse_from(["rtstore", "verify-log", "--data-dir", "data"]).unwrap();
        match cli.command {
            Command::VerifyLog { target } => {
                assert_eq!(target.data_dir, Some(PathBuf::from("data")));
                assert!(target.config.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_get_collects_repeated_ids() {
        let cli = Cli::try_parse_from([
            "rtstore", "get", "--data-dir", "d", "--id", "1", "--id", "2", "--committed",
            "--fl", "id,title",
        ])
        .unwrap();
        match cli.command {
            Command::Get {
                ids, committed, fl, ..
            } => {
                assert_eq!(ids, vec!["1", "2"]);
                assert!(committed);
                assert_eq!(fl, vec!["id", "title"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
