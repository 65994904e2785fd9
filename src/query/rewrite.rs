//! Query rewriting.
//!
//! Rewriting normalizes a tree before iterators are built: nested
//! conjunctions, sequences and disjunctions are flattened, trivial nodes are
//! collapsed, [`SpanQuery::NoHits`] is propagated, leaf fields are resolved
//! and the sort/dedup wrappers that operators need are inserted, choosing
//! the cheapest one the clause guarantees allow. Rules are applied until the
//! tree no longer changes, so rewriting a rewritten tree returns it
//! unchanged.

use log::debug;

use crate::error::{Result, SpanlabError};
use crate::query::IndexContext;
use crate::query::node::SpanQuery;

/// Passes after which rewriting is considered not to converge.
const MAX_REWRITE_PASSES: usize = 64;

impl SpanQuery {
    /// Rewrite this tree into its normal form.
    pub fn rewrite(&self, context: &IndexContext) -> Result<SpanQuery> {
        let mut current = self.clone();
        for pass in 0..MAX_REWRITE_PASSES {
            let next = current.clone().rewrite_pass(&context.default_field)?;
            if next == current {
                return Ok(current);
            }
            debug!("rewrite pass {pass}: {} -> {}", current.kind(), next.kind());
            current = next;
        }
        Err(SpanlabError::query(format!(
            "rewrite did not converge after {MAX_REWRITE_PASSES} passes"
        )))
    }

    /// One bottom-up pass: rewrite the children, then this node.
    fn rewrite_pass(self, field: &str) -> Result<SpanQuery> {
        let node = match self {
            SpanQuery::Term { field: f, annotation, value } => SpanQuery::Term {
                field: f.or_else(|| Some(field.to_string())),
                annotation,
                value,
            },
            SpanQuery::Tags { field: f, name, capture } => SpanQuery::Tags {
                field: f.or_else(|| Some(field.to_string())),
                name,
                capture,
            },
            SpanQuery::Relations {
                field: f,
                relation_type,
                direction,
                mode,
                capture,
            } => SpanQuery::Relations {
                field: f.or_else(|| Some(field.to_string())),
                relation_type,
                direction,
                mode,
                capture,
            },
            SpanQuery::And {
                clauses,
                unique_relations,
            } => rewrite_and(rewrite_all(clauses, field)?, unique_relations)?,
            SpanQuery::Sequence { clauses } => rewrite_sequence(rewrite_all(clauses, field)?)?,
            SpanQuery::Or { clauses } => rewrite_or(rewrite_all(clauses, field)?),
            SpanQuery::Repetition { clause, min, max } => {
                rewrite_repetition(clause.rewrite_pass(field)?, min, max)
            }
            SpanQuery::Edge { clause, trailing } => match clause.rewrite_pass(field)? {
                SpanQuery::NoHits => SpanQuery::NoHits,
                clause => SpanQuery::Edge {
                    clause: Box::new(clause),
                    trailing,
                },
            },
            SpanQuery::Capture {
                clause,
                name,
                left_adjust,
                right_adjust,
            } => match clause.rewrite_pass(field)? {
                SpanQuery::NoHits => SpanQuery::NoHits,
                clause => SpanQuery::Capture {
                    clause: Box::new(clause),
                    name,
                    left_adjust,
                    right_adjust,
                },
            },
            SpanQuery::PositionFilter {
                producer,
                filter,
                op,
                invert,
                left_adjust,
                right_adjust,
            } => {
                let producer = producer.rewrite_pass(field)?;
                let filter = filter.rewrite_pass(field)?;
                match (producer, filter) {
                    (SpanQuery::NoHits, _) => SpanQuery::NoHits,
                    (producer, SpanQuery::NoHits) if invert => producer,
                    (_, SpanQuery::NoHits) => SpanQuery::NoHits,
                    (producer, filter) => SpanQuery::PositionFilter {
                        producer: Box::new(producer),
                        filter: Box::new(filter),
                        op,
                        invert,
                        left_adjust,
                        right_adjust,
                    },
                }
            }
            SpanQuery::CaptureRelationsWithinSpan {
                clause,
                relation_type,
                capture,
                within,
            } => match clause.rewrite_pass(field)? {
                SpanQuery::NoHits => SpanQuery::NoHits,
                clause => SpanQuery::CaptureRelationsWithinSpan {
                    clause: Box::new(clause),
                    relation_type,
                    capture,
                    within,
                },
            },
            SpanQuery::Constrained { clause, constraint } => match clause.rewrite_pass(field)? {
                SpanQuery::NoHits => SpanQuery::NoHits,
                clause => SpanQuery::Constrained {
                    clause: Box::new(clause),
                    constraint,
                },
            },
            SpanQuery::FilterDocs { clause, mut docs } => {
                docs.sort_unstable();
                docs.dedup();
                match clause.rewrite_pass(field)? {
                    SpanQuery::NoHits => SpanQuery::NoHits,
                    _ if docs.is_empty() => SpanQuery::NoHits,
                    clause => SpanQuery::FilterDocs {
                        clause: Box::new(clause),
                        docs,
                    },
                }
            }
            SpanQuery::Sorted { clause, by_end, dedup } => {
                rewrite_sorted(clause.rewrite_pass(field)?, by_end, dedup)
            }
            SpanQuery::Unique { clause } => rewrite_unique(clause.rewrite_pass(field)?),
            SpanQuery::OverrideField {
                clause,
                field: override_field,
            } => match clause.rewrite_pass(&override_field)? {
                SpanQuery::NoHits => SpanQuery::NoHits,
                clause => SpanQuery::OverrideField {
                    clause: Box::new(clause),
                    field: override_field,
                },
            },
            SpanQuery::NoHits => SpanQuery::NoHits,
        };
        Ok(node)
    }
}

fn rewrite_all(clauses: Vec<SpanQuery>, field: &str) -> Result<Vec<SpanQuery>> {
    clauses.into_iter().map(|c| c.rewrite_pass(field)).collect()
}

fn rewrite_and(clauses: Vec<SpanQuery>, unique_relations: bool) -> Result<SpanQuery> {
    let mut flat = Vec::with_capacity(clauses.len());
    for clause in clauses {
        match clause {
            SpanQuery::NoHits => return Ok(SpanQuery::NoHits),
            SpanQuery::And {
                clauses,
                unique_relations: inner,
            } if inner == unique_relations => flat.extend(clauses),
            clause => flat.push(clause),
        }
    }
    match flat.len() {
        0 => Err(SpanlabError::query("conjunction without clauses")),
        1 => Ok(flat.remove(0)),
        _ => Ok(SpanQuery::And {
            clauses: flat,
            unique_relations,
        }),
    }
}

fn rewrite_sequence(clauses: Vec<SpanQuery>) -> Result<SpanQuery> {
    let mut flat = Vec::with_capacity(clauses.len());
    for clause in clauses {
        match clause {
            SpanQuery::NoHits => return Ok(SpanQuery::NoHits),
            SpanQuery::Sequence { clauses } => flat.extend(clauses),
            clause => flat.push(clause),
        }
    }
    match flat.len() {
        0 => Err(SpanlabError::query("sequence without clauses")),
        1 => Ok(flat.remove(0)),
        _ => Ok(SpanQuery::Sequence { clauses: flat }),
    }
}

fn rewrite_or(clauses: Vec<SpanQuery>) -> SpanQuery {
    let mut flat = Vec::with_capacity(clauses.len());
    for clause in clauses {
        match clause {
            SpanQuery::NoHits => {}
            SpanQuery::Or { clauses } => flat.extend(clauses),
            clause => flat.push(clause),
        }
    }
    match flat.len() {
        0 => SpanQuery::NoHits,
        1 => flat.remove(0),
        _ => SpanQuery::Or { clauses: flat },
    }
}

fn rewrite_repetition(clause: SpanQuery, min: u32, max: Option<u32>) -> SpanQuery {
    if clause == SpanQuery::NoHits {
        return SpanQuery::NoHits;
    }
    if min == 1 && max == Some(1) {
        return clause;
    }
    let guarantees = clause.guarantees();
    let clause = if !guarantees.start_sorted {
        debug!(
            "repetition: clause {} is not start-sorted, inserting sort{}",
            clause.kind(),
            if guarantees.hits_are_unique_with_match_info() { "" } else { " with dedup" }
        );
        SpanQuery::Sorted {
            clause: Box::new(clause),
            by_end: false,
            dedup: !guarantees.hits_are_unique_with_match_info(),
        }
    } else if !guarantees.hits_are_unique_with_match_info() {
        debug!("repetition: clause {} may repeat hits, inserting dedup", clause.kind());
        SpanQuery::Unique {
            clause: Box::new(clause),
        }
    } else {
        clause
    };
    SpanQuery::Repetition {
        clause: Box::new(clause),
        min,
        max,
    }
}

fn rewrite_sorted(clause: SpanQuery, by_end: bool, dedup: bool) -> SpanQuery {
    let (clause, dedup) = match clause {
        SpanQuery::NoHits => return SpanQuery::NoHits,
        SpanQuery::Sorted {
            clause,
            dedup: inner_dedup,
            ..
        } => (*clause, dedup || inner_dedup),
        SpanQuery::Unique { clause } => (*clause, true),
        clause => (clause, dedup),
    };
    let guarantees = clause.guarantees();
    let sorted = if by_end {
        guarantees.end_sorted
    } else {
        guarantees.start_sorted
    };
    let unique = !dedup || guarantees.hits_are_unique_with_match_info();
    match (sorted, unique) {
        (true, true) => {
            debug!("sort: clause {} is already sorted, dropping wrapper", clause.kind());
            clause
        }
        (true, false) if !by_end => SpanQuery::Unique {
            clause: Box::new(clause),
        },
        _ => SpanQuery::Sorted {
            clause: Box::new(clause),
            by_end,
            dedup,
        },
    }
}

fn rewrite_unique(clause: SpanQuery) -> SpanQuery {
    match clause {
        SpanQuery::NoHits => SpanQuery::NoHits,
        SpanQuery::Unique { clause } => rewrite_unique(*clause),
        SpanQuery::Sorted { clause, by_end: false, .. } => rewrite_sorted(*clause, false, true),
        clause if clause.guarantees().hits_are_unique_with_match_info() => clause,
        clause if !clause.guarantees().start_sorted => SpanQuery::Sorted {
            clause: Box::new(clause),
            by_end: false,
            dedup: true,
        },
        clause => SpanQuery::Unique {
            clause: Box::new(clause),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::spans::relation_info::{Direction, SpanMode};

    fn context() -> IndexContext {
        IndexContext::new(EngineConfig::default())
    }

    fn term(value: &str) -> SpanQuery {
        SpanQuery::Term {
            field: Some("contents".to_string()),
            annotation: None,
            value: value.to_string(),
        }
    }

    fn relations(direction: Direction, mode: SpanMode) -> SpanQuery {
        SpanQuery::Relations {
            field: Some("contents".to_string()),
            relation_type: ".*".to_string(),
            direction,
            mode,
            capture: None,
        }
    }

    #[test]
    fn test_flatten_and_collapse() {
        let query = SpanQuery::sequence(vec![
            SpanQuery::term("a"),
            SpanQuery::sequence(vec![SpanQuery::term("b"), SpanQuery::term("c").repeat(1, Some(1))]),
        ]);
        let rewritten = query.rewrite(&context()).unwrap();
        assert_eq!(rewritten, SpanQuery::sequence(vec![term("a"), term("b"), term("c")]));
    }

    #[test]
    fn test_no_hits_propagates() {
        let query = SpanQuery::or(vec![
            SpanQuery::and(vec![SpanQuery::term("a"), SpanQuery::NoHits]),
            SpanQuery::term("b"),
        ]);
        assert_eq!(query.rewrite(&context()).unwrap(), term("b"));

        let query = SpanQuery::sequence(vec![SpanQuery::NoHits, SpanQuery::term("a")]).capture("x");
        assert_eq!(query.rewrite(&context()).unwrap(), SpanQuery::NoHits);
    }

    #[test]
    fn test_repetition_gets_minimal_wrapper() {
        // Start-sorted but not unique: dedup only.
        let query = SpanQuery::Repetition {
            clause: Box::new(relations(Direction::Both, SpanMode::Source)),
            min: 1,
            max: Some(3),
        };
        let rewritten = query.rewrite(&context()).unwrap();
        assert_eq!(
            rewritten,
            SpanQuery::Repetition {
                clause: Box::new(SpanQuery::Unique {
                    clause: Box::new(relations(Direction::Both, SpanMode::Source)),
                }),
                min: 1,
                max: Some(3),
            }
        );

        // Not sorted: sort with dedup.
        let query = SpanQuery::Repetition {
            clause: Box::new(relations(Direction::Both, SpanMode::Target)),
            min: 2,
            max: None,
        };
        match query.rewrite(&context()).unwrap() {
            SpanQuery::Repetition { clause, .. } => assert!(matches!(
                *clause,
                SpanQuery::Sorted {
                    by_end: false,
                    dedup: true,
                    ..
                }
            )),
            other => panic!("unexpected {other:?}"),
        }

        // Terms need nothing.
        let query = SpanQuery::term("a").repeat(2, Some(3));
        assert_eq!(query.rewrite(&context()).unwrap(), term("a").repeat(2, Some(3)));
    }

    #[test]
    fn test_redundant_wrappers_removed() {
        let query = SpanQuery::Sorted {
            clause: Box::new(SpanQuery::Sorted {
                clause: Box::new(SpanQuery::term("a")),
                by_end: true,
                dedup: false,
            }),
            by_end: false,
            dedup: true,
        };
        assert_eq!(query.rewrite(&context()).unwrap(), term("a"));

        let query = SpanQuery::Unique {
            clause: Box::new(SpanQuery::Unique {
                clause: Box::new(relations(Direction::Both, SpanMode::Source)),
            }),
        };
        assert_eq!(
            query.rewrite(&context()).unwrap(),
            SpanQuery::Unique {
                clause: Box::new(relations(Direction::Both, SpanMode::Source)),
            }
        );
    }

    #[test]
    fn test_override_field_resolves_leaves() {
        let query = SpanQuery::OverrideField {
            clause: Box::new(SpanQuery::term("Katze")),
            field: "translation".to_string(),
        };
        let rewritten = query.rewrite(&context()).unwrap();
        assert_eq!(
            rewritten,
            SpanQuery::OverrideField {
                clause: Box::new(SpanQuery::Term {
                    field: Some("translation".to_string()),
                    annotation: None,
                    value: "Katze".to_string(),
                }),
                field: "translation".to_string(),
            }
        );
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let query = SpanQuery::and(vec![
            SpanQuery::sequence(vec![
                SpanQuery::term("a"),
                relations(Direction::Forward, SpanMode::FullSpan).repeat(1, None),
            ]),
            SpanQuery::or(vec![SpanQuery::term("b"), SpanQuery::NoHits]),
            SpanQuery::Unique {
                clause: Box::new(relations(Direction::Root, SpanMode::Target)),
            },
        ]);
        let once = query.rewrite(&context()).unwrap();
        let twice = once.rewrite(&context()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_conjunction_is_an_error() {
        let query = SpanQuery::and(Vec::new());
        assert!(matches!(query.rewrite(&context()), Err(SpanlabError::Query(_))));
    }
}
