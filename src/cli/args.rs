//! Command line argument parsing for the spanlab CLI using clap.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// spanlab - run span queries against a JSON corpus
#[derive(Parser, Debug, Clone)]
#[command(name = "spanlab")]
#[command(about = "Run and inspect positional span queries over an in-memory corpus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct SpanlabArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl SpanlabArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }

    /// Default log filter for the verbosity level; `RUST_LOG` wins when set.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbosity() {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a query against a corpus and print its hits
    Run(RunArgs),

    /// Print the rewritten query tree and its guarantees
    Explain(ExplainArgs),
}

/// Arguments for running a query
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Corpus file (JSON)
    #[arg(short, long, value_name = "CORPUS_FILE")]
    pub index: PathBuf,

    /// Query tree file (JSON)
    #[arg(long, value_name = "QUERY_FILE")]
    pub query: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE", env = "SPANLAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Field used by query leaves that don't name one
    #[arg(long)]
    pub field: Option<String>,

    /// Maximum number of hits to print
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Arguments for explaining a query
#[derive(Parser, Debug, Clone)]
pub struct ExplainArgs {
    /// Query tree file (JSON)
    #[arg(long, value_name = "QUERY_FILE")]
    pub query: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE", env = "SPANLAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Field used by query leaves that don't name one
    #[arg(long)]
    pub field: Option<String>,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        let args =
            SpanlabArgs::try_parse_from(["spanlab", "explain", "--query", "q.json"]).unwrap();
        assert_eq!(args.verbosity(), 1);
        assert_eq!(args.log_level(), log::LevelFilter::Warn);

        let args =
            SpanlabArgs::try_parse_from(["spanlab", "-vv", "explain", "--query", "q.json"]).unwrap();
        assert_eq!(args.verbosity(), 2);

        let args =
            SpanlabArgs::try_parse_from(["spanlab", "-v", "--quiet", "explain", "--query", "q.json"])
                .unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_run_args() {
        let args = SpanlabArgs::try_parse_from([
            "spanlab",
            "run",
            "--index",
            "corpus.json",
            "--query",
            "q.json",
            "-f",
            "json",
            "--pretty",
            "--limit",
            "5",
        ])
        .unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
        assert!(args.pretty);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.index, PathBuf::from("corpus.json"));
                assert_eq!(run.limit, Some(5));
                assert!(run.field.is_none());
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_index() {
        assert!(SpanlabArgs::try_parse_from(["spanlab", "run", "--query", "q.json"]).is_err());
    }
}
