//! Command implementations for the spanlab CLI.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use log::info;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::collect::collect_hits_per_segment;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::index::MemoryIndex;
use crate::query::{IndexContext, SpanQuery};

/// Execute a CLI command.
pub fn execute_command(args: SpanlabArgs) -> Result<()> {
    match &args.command {
        Command::Run(run_args) => run_query(run_args, &args),
        Command::Explain(explain_args) => explain_query(explain_args, &args),
    }
}

/// Load a query tree from a JSON file.
pub fn load_query(path: &Path) -> Result<SpanQuery> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read query file {}", path.display()))?;
    let query = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse query file {}", path.display()))?;
    Ok(query)
}

/// Build the index context from the optional config file and field override.
pub fn load_context(config: Option<&Path>, field: Option<&str>) -> Result<IndexContext> {
    let config = match config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config file {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let context = IndexContext::new(config);
    Ok(match field {
        Some(field) => context.with_default_field(field),
        None => context,
    })
}

/// Run a query and print its hits.
fn run_query(args: &RunArgs, cli_args: &SpanlabArgs) -> Result<()> {
    let context = load_context(args.config.as_deref(), args.field.as_deref())?;
    let query = load_query(&args.query)?;
    let index = MemoryIndex::from_file(&args.index)
        .with_context(|| format!("failed to load corpus {}", args.index.display()))?;
    info!(
        "loaded {} documents in {} segments from {}",
        index.doc_count(),
        index.segments().len(),
        args.index.display()
    );

    let start_time = Instant::now();
    let bound = query.bind(&context)?;
    let results = collect_hits_per_segment(&bound, &index)?;
    let duration_ms = start_time.elapsed().as_millis() as u64;

    let total_hits = results.iter().map(|segment| segment.hits.len()).sum();
    let limit = args.limit.unwrap_or(usize::MAX);
    let hits = results
        .iter()
        .flat_map(|segment| {
            segment
                .global_hits()
                .map(move |(doc, hit)| HitOutput::new(segment.segment, doc, hit))
        })
        .take(limit)
        .collect();

    output_run_results(
        &RunResults {
            total_hits,
            duration_ms,
            match_infos: bound.defs().iter().collect(),
            hits,
        },
        cli_args,
    )
}

/// Print the rewritten query tree.
fn explain_query(args: &ExplainArgs, cli_args: &SpanlabArgs) -> Result<()> {
    let context = load_context(args.config.as_deref(), args.field.as_deref())?;
    let query = load_query(&args.query)?;
    let bound = query.bind(&context)?;
    output_explain(
        &ExplainResult {
            query: bound.query(),
            guarantees: bound.query().guarantees(),
            match_infos: bound.defs().iter().collect(),
        },
        cli_args,
    )
}
