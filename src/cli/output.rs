//! Output formatting for CLI commands.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cli::args::{OutputFormat, SpanlabArgs};
use crate::collect::Hit;
use crate::error::Result;
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::{MatchInfo, MatchInfoDef};
use crate::spans::position::{DocId, Position};

/// One printed hit, with its document id made index-wide.
#[derive(Debug, Serialize)]
pub struct HitOutput<'a> {
    pub segment: usize,
    pub doc: DocId,
    pub start: Position,
    pub end: Position,
    #[serde(skip_serializing_if = "no_captures")]
    pub captures: &'a BTreeMap<String, MatchInfo>,
}

fn no_captures(captures: &&BTreeMap<String, MatchInfo>) -> bool {
    captures.is_empty()
}

impl<'a> HitOutput<'a> {
    /// Wrap `hit` found in `segment`, whose global document id is `doc`.
    pub fn new(segment: usize, doc: DocId, hit: &'a Hit) -> Self {
        HitOutput {
            segment,
            doc,
            start: hit.start,
            end: hit.end,
            captures: &hit.captures,
        }
    }
}

/// Result of the `run` command.
#[derive(Debug, Serialize)]
pub struct RunResults<'a> {
    pub total_hits: usize,
    pub duration_ms: u64,
    pub match_infos: Vec<&'a MatchInfoDef>,
    pub hits: Vec<HitOutput<'a>>,
}

/// Result of the `explain` command.
#[derive(Debug, Serialize)]
pub struct ExplainResult<'a> {
    pub query: &'a crate::query::SpanQuery,
    pub guarantees: Guarantees,
    pub match_infos: Vec<&'a MatchInfoDef>,
}

/// Print `results` in the requested format.
pub fn output_run_results(results: &RunResults<'_>, args: &SpanlabArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => output_json(results, args),
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                println!("{} hits ({} ms)", results.total_hits, results.duration_ms);
                println!();
            }
            for hit in &results.hits {
                println!("{}", format_hit(hit));
            }
            if results.hits.len() < results.total_hits && args.verbosity() > 0 {
                println!("... {} more", results.total_hits - results.hits.len());
            }
            Ok(())
        }
    }
}

/// Print an explained query in the requested format.
pub fn output_explain(result: &ExplainResult<'_>, args: &SpanlabArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => output_json(result, args),
        OutputFormat::Human => {
            println!("{}", serde_json::to_string_pretty(result.query)?);
            println!();
            println!("guarantees: {}", format_guarantees(&result.guarantees));
            for def in &result.match_infos {
                println!("match info {}: {} ({:?}, field {})", def.index, def.name, def.kind, def.field);
            }
            Ok(())
        }
    }
}

fn output_json<T: Serialize>(result: &T, args: &SpanlabArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

fn format_hit(hit: &HitOutput<'_>) -> String {
    let mut line = format!("doc {} [{}, {})", hit.doc, hit.start, hit.end);
    for (name, info) in hit.captures {
        line.push_str(&format!(" {name}={}", format_match_info(info)));
    }
    line
}

fn format_match_info(info: &MatchInfo) -> String {
    match info {
        MatchInfo::Span { start, end } => format!("[{start}, {end})"),
        MatchInfo::Relation(relation) => format!(
            "[{}, {})->[{}, {})",
            relation.source_start, relation.source_end, relation.target_start, relation.target_end
        ),
        MatchInfo::RelationList(list) => format!(
            "{{{}}}",
            list.iter()
                .map(|r| format!("[{}, {})->[{}, {})", r.source_start, r.source_end, r.target_start, r.target_end))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn format_guarantees(g: &Guarantees) -> String {
    let mut flags = Vec::new();
    if g.start_sorted {
        flags.push("start-sorted".to_string());
    }
    if g.end_sorted {
        flags.push("end-sorted".to_string());
    }
    if g.unique_start {
        flags.push("unique-start".to_string());
    }
    if g.unique_end {
        flags.push("unique-end".to_string());
    }
    if g.unique {
        flags.push("unique".to_string());
    }
    let max = g.max_length.map_or("inf".to_string(), |m| m.to_string());
    flags.push(format!("length {}..{}", g.min_length, max));
    flags.join(", ")
}
