//! Binding a query and building its iterator tree.

use std::sync::Arc;

use log::debug;
use regex::Regex;

use crate::config::EngineConfig;
use crate::error::{Result, SpanlabError};
use crate::index::forward::ForwardIndexAccessor;
use crate::index::posting::PostingListSource;
use crate::index::segment::{tag_term, Segment, DEFAULT_ANNOTATION, RELATION_ANNOTATION, TAG_PREFIX};
use crate::query::IndexContext;
use crate::query::node::SpanQuery;
use crate::spans::and::{AndMultiSpans, AndSpans};
use crate::spans::capture::CaptureSpans;
use crate::spans::constrained::ConstrainedSpans;
use crate::spans::edge::EdgeSpans;
use crate::spans::filter::{DocFilterSpans, SortedDocSet};
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::{MatchInfoDefs, MatchInfoKind, MatchInfoRegistry};
use crate::spans::or::OrSpans;
use crate::spans::override_field::OverrideFieldSpans;
use crate::spans::position::{EmptySpans, PositionIterator};
use crate::spans::position_filter::PositionFilterSpans;
use crate::spans::relation_info::{Direction, SpanMode};
use crate::spans::relations::RelationsSpans;
use crate::spans::relations_within::RelationsWithinSpans;
use crate::spans::repetition::RepetitionSpans;
use crate::spans::sequence::{SequenceRawSpans, SequenceSimpleSpans};
use crate::spans::sorted::{PerDocumentSortedSpans, UniqueSpans};
use crate::spans::tags::TagSpans;
use crate::spans::term::TermSpans;

impl SpanQuery {
    /// Rewrite this tree, register all match info names and freeze them.
    ///
    /// Names are registered from the tree as written as well as from the
    /// rewritten tree, so a capture removed by rewriting (because its clause
    /// can never match) keeps its slot.
    pub fn bind(&self, context: &IndexContext) -> Result<BoundQuery> {
        let mut registry = MatchInfoRegistry::new();
        register(self, &context.default_field, &mut registry)?;
        let query = self.rewrite(context)?;
        register(&query, &context.default_field, &mut registry)?;
        let defs = registry.freeze();
        validate_constraints(&query, &defs)?;
        debug!("bound query with {} match info slots", defs.len());
        Ok(BoundQuery {
            query,
            defs,
            context: context.clone(),
        })
    }
}

fn register(query: &SpanQuery, field: &str, registry: &mut MatchInfoRegistry) -> Result<()> {
    let leaf_field = |f: &Option<String>| f.clone().unwrap_or_else(|| field.to_string());
    match query {
        SpanQuery::Tags {
            field: f,
            capture: Some(name),
            ..
        } => {
            registry.register(name, MatchInfoKind::InlineTag, &leaf_field(f))?;
        }
        SpanQuery::Relations {
            field: f,
            capture: Some(name),
            ..
        } => {
            registry.register(name, MatchInfoKind::Relation, &leaf_field(f))?;
        }
        SpanQuery::Capture { name, .. } => {
            registry.register(name, MatchInfoKind::Span, field)?;
        }
        SpanQuery::CaptureRelationsWithinSpan { capture, within, .. } => {
            registry.register(capture, MatchInfoKind::RelationList, field)?;
            if let Some(within) = within {
                registry.register(within, MatchInfoKind::Unknown, field)?;
            }
        }
        _ => {}
    }
    let field = match query {
        SpanQuery::OverrideField { field, .. } => field.as_str(),
        _ => field,
    };
    for child in query.children() {
        register(child, field, registry)?;
    }
    Ok(())
}

fn validate_constraints(query: &SpanQuery, defs: &MatchInfoDefs) -> Result<()> {
    if let SpanQuery::Constrained { constraint, .. } = query {
        constraint.bind(defs)?;
    }
    query
        .children()
        .into_iter()
        .try_for_each(|child| validate_constraints(child, defs))
}

/// A rewritten query with frozen match info definitions, ready to be run on
/// any number of segments.
#[derive(Debug, Clone)]
pub struct BoundQuery {
    query: SpanQuery,
    defs: Arc<MatchInfoDefs>,
    context: IndexContext,
}

impl BoundQuery {
    /// The rewritten query.
    pub fn query(&self) -> &SpanQuery {
        &self.query
    }

    /// Match info slot definitions.
    pub fn defs(&self) -> &Arc<MatchInfoDefs> {
        &self.defs
    }

    /// The context the query was bound with.
    pub fn context(&self) -> &IndexContext {
        &self.context
    }

    /// Build the iterator tree for `segment`.
    pub fn create_iterator(&self, segment: &Segment) -> Result<Box<dyn PositionIterator>> {
        let builder = IteratorBuilder {
            segment,
            defs: &self.defs,
            config: &self.context.config,
        };
        builder.build(&self.query, &self.context.default_field)
    }
}

struct IteratorBuilder<'a> {
    segment: &'a Segment,
    defs: &'a MatchInfoDefs,
    config: &'a EngineConfig,
}

impl IteratorBuilder<'_> {
    fn num_infos(&self) -> usize {
        self.defs.len()
    }

    fn slot(&self, name: &str) -> Result<usize> {
        self.defs
            .index_of(name)
            .ok_or_else(|| SpanlabError::query(format!("match info '{name}' was not registered")))
    }

    fn postings(
        &self,
        field: &str,
        annotation: &str,
        term: &str,
        guarantees: Guarantees,
    ) -> Option<Box<dyn PositionIterator>> {
        self.segment.postings(field, annotation, term).map(|list| {
            let spans = TermSpans::new(Box::new(PostingListSource::new(list))).with_guarantees(guarantees);
            Box::new(spans) as Box<dyn PositionIterator>
        })
    }

    /// Postings of every relation type fully matching `pattern`.
    fn relation_postings(&self, field: &str, pattern: &str) -> Result<Option<Box<dyn PositionIterator>>> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| SpanlabError::query(format!("invalid relation type pattern '{pattern}': {e}")))?;
        let Some(index) = self.segment.field(field) else {
            return Ok(None);
        };
        let mut clauses: Vec<Box<dyn PositionIterator>> = index
            .terms(RELATION_ANNOTATION)
            .into_iter()
            .filter(|term| !term.starts_with(TAG_PREFIX) && regex.is_match(term))
            .filter_map(|term| self.postings(field, RELATION_ANNOTATION, term, Guarantees::SORTED))
            .collect();
        debug!("relation type '{pattern}' matches {} types in field '{field}'", clauses.len());
        Ok(match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Box::new(OrSpans::new(clauses))),
        })
    }

    fn relations(
        &self,
        field: &str,
        pattern: &str,
        direction: Direction,
        mode: SpanMode,
        capture: Option<usize>,
    ) -> Result<Box<dyn PositionIterator>> {
        Ok(match self.relation_postings(field, pattern)? {
            Some(inner) => Box::new(RelationsSpans::relations(inner, direction, mode, capture)?),
            None => Box::new(EmptySpans::new()),
        })
    }

    fn build_all(&self, clauses: &[SpanQuery], field: &str) -> Result<Vec<Box<dyn PositionIterator>>> {
        clauses.iter().map(|clause| self.build(clause, field)).collect()
    }

    fn build(&self, query: &SpanQuery, field: &str) -> Result<Box<dyn PositionIterator>> {
        let leaf_field = |f: &Option<String>| f.clone().unwrap_or_else(|| field.to_string());
        let spans: Box<dyn PositionIterator> = match query {
            SpanQuery::Term {
                field: f,
                annotation,
                value,
            } => {
                let annotation = annotation.as_deref().unwrap_or(DEFAULT_ANNOTATION);
                self.postings(&leaf_field(f), annotation, value, Guarantees::TERM)
                    .unwrap_or_else(|| Box::new(EmptySpans::new()))
            }
            SpanQuery::Tags {
                field: f,
                name,
                capture,
            } => {
                let capture = capture.as_deref().map(|c| self.slot(c)).transpose()?;
                match self.postings(&leaf_field(f), RELATION_ANNOTATION, &tag_term(name), Guarantees::SORTED) {
                    Some(inner) => Box::new(TagSpans::new(inner, capture)),
                    None => Box::new(EmptySpans::new()),
                }
            }
            SpanQuery::Relations {
                field: f,
                relation_type,
                direction,
                mode,
                capture,
            } => {
                let capture = capture.as_deref().map(|c| self.slot(c)).transpose()?;
                self.relations(&leaf_field(f), relation_type, *direction, *mode, capture)?
            }
            SpanQuery::And {
                clauses,
                unique_relations,
            } => self.and(self.build_all(clauses, field)?, *unique_relations)?,
            SpanQuery::Sequence { clauses } => {
                let mut clauses = self.build_all(clauses, field)?.into_iter();
                let first = clauses
                    .next()
                    .ok_or_else(|| SpanlabError::query("sequence without clauses"))?;
                clauses.try_fold(first, |left, right| self.sequence(left, right))?
            }
            SpanQuery::Or { clauses } => Box::new(OrSpans::new(self.build_all(clauses, field)?)),
            SpanQuery::Repetition { clause, min, max } => Box::new(RepetitionSpans::new(
                self.build(clause, field)?,
                *min,
                *max,
                self.num_infos(),
                self.config,
            )?),
            SpanQuery::Edge { clause, trailing } => Box::new(EdgeSpans::new(self.build(clause, field)?, *trailing)),
            SpanQuery::Capture {
                clause,
                name,
                left_adjust,
                right_adjust,
            } => Box::new(CaptureSpans::with_adjust(
                self.build(clause, field)?,
                self.slot(name)?,
                *left_adjust,
                *right_adjust,
            )),
            SpanQuery::PositionFilter {
                producer,
                filter,
                op,
                invert,
                left_adjust,
                right_adjust,
            } => Box::new(PositionFilterSpans::position_filter(
                self.build(producer, field)?,
                self.build(filter, field)?,
                *op,
                *invert,
                *left_adjust,
                *right_adjust,
                self.num_infos(),
                self.config,
            )),
            SpanQuery::CaptureRelationsWithinSpan {
                clause,
                relation_type,
                capture,
                within,
            } => {
                let relations = self.relations(field, relation_type, Direction::Both, SpanMode::FullSpan, None)?;
                let within = within.as_deref().map(|w| self.slot(w)).transpose()?;
                Box::new(RelationsWithinSpans::relations_within(
                    self.build(clause, field)?,
                    relations,
                    self.slot(capture)?,
                    within,
                    self.num_infos(),
                    self.config,
                ))
            }
            SpanQuery::Constrained { clause, constraint } => {
                let forward: Arc<dyn ForwardIndexAccessor> = self.segment.forward_index(field)?;
                Box::new(ConstrainedSpans::constrained(
                    self.build(clause, field)?,
                    constraint.bind(self.defs)?,
                    forward,
                    self.num_infos(),
                ))
            }
            SpanQuery::FilterDocs { clause, docs } => Box::new(DocFilterSpans::new(
                self.build(clause, field)?,
                SortedDocSet::new(docs.clone()),
            )),
            SpanQuery::Sorted { clause, by_end, dedup } => Box::new(PerDocumentSortedSpans::new(
                self.build(clause, field)?,
                *by_end,
                *dedup,
                self.num_infos(),
                self.config,
            )),
            SpanQuery::Unique { clause } => {
                let clause = self.build(clause, field)?;
                if clause.guarantees().start_sorted {
                    Box::new(UniqueSpans::new(clause, self.num_infos())?)
                } else {
                    Box::new(PerDocumentSortedSpans::new(clause, false, true, self.num_infos(), self.config))
                }
            }
            SpanQuery::OverrideField { clause, field } => {
                Box::new(OverrideFieldSpans::new(self.build(clause, field)?, field, self.defs))
            }
            SpanQuery::NoHits => Box::new(EmptySpans::new()),
        };
        Ok(spans)
    }

    /// Choose the conjunction engine for `clauses`.
    fn and(&self, clauses: Vec<Box<dyn PositionIterator>>, unique_relations: bool) -> Result<Box<dyn PositionIterator>> {
        let simple = !unique_relations
            && self.config.allow_simple_and
            && clauses.iter().all(|c| c.guarantees().is_sorted_unique());
        if simple {
            debug!("and: two-pointer engine for {} sorted, unique clauses", clauses.len());
            let mut clauses = clauses.into_iter();
            let first = clauses
                .next()
                .ok_or_else(|| SpanlabError::query("conjunction without clauses"))?;
            return clauses.try_fold(first, |left, right| {
                Ok(Box::new(AndSpans::new(left, right)?) as Box<dyn PositionIterator>)
            });
        }

        let mut clauses: Vec<Box<dyn PositionIterator>> = clauses
            .into_iter()
            .enumerate()
            .map(|(i, clause)| {
                if clause.guarantees().start_sorted {
                    clause
                } else {
                    debug!("and: sorting clause {i} by start point");
                    Box::new(PerDocumentSortedSpans::new(clause, false, false, self.num_infos(), self.config))
                        as Box<dyn PositionIterator>
                }
            })
            .collect();
        if clauses.len() == 1 && !unique_relations {
            return clauses
                .pop()
                .ok_or_else(|| SpanlabError::query("conjunction without clauses"));
        }
        debug!(
            "and: general engine for {} clauses{}",
            clauses.len(),
            if unique_relations { " with unique relations" } else { "" }
        );
        Ok(Box::new(AndMultiSpans::new(clauses, unique_relations, self.num_infos(), self.config)?))
    }

    /// Choose the sequence engine for one pair of clauses.
    fn sequence(
        &self,
        left: Box<dyn PositionIterator>,
        right: Box<dyn PositionIterator>,
    ) -> Result<Box<dyn PositionIterator>> {
        let (l, r) = (left.guarantees(), right.guarantees());
        let simple = self.config.allow_simple_sequence
            && l.end_sorted
            && l.unique_end
            && r.start_sorted
            && r.unique_start;
        if simple {
            debug!("sequence: two-pointer engine");
            Ok(Box::new(SequenceSimpleSpans::new(left, right)?))
        } else {
            debug!("sequence: bucketed engine");
            Ok(Box::new(SequenceRawSpans::new(left, right, self.num_infos(), self.config)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::collect_hits;
    use crate::index::MemoryIndex;
    use crate::query::constraint::ConstraintExpr;
    use crate::spans::list::drain_hits;

    const CORPUS: &str = r#"{"documents": [
        {"fields": {"contents": {
            "annotations": {"word": ["the", "big", "cat", "saw", "the", "cat"]},
            "tags": [{"name": "np", "start": 0, "end": 3}, {"name": "np", "start": 4, "end": 6}],
            "relations": [
                {"type": "dep::amod", "source": [2, 3], "target": [1, 2]},
                {"type": "dep::nsubj", "source": [3, 4], "target": [2, 3]}
            ]
        }}}
    ]}"#;

    fn run(query: SpanQuery) -> Vec<(i32, i32, i32)> {
        let index = MemoryIndex::from_json_str(CORPUS).unwrap();
        let bound = query.bind(&IndexContext::default()).unwrap();
        let mut spans = bound.create_iterator(&index.segments()[0]).unwrap();
        drain_hits(spans.as_mut()).unwrap()
    }

    #[test]
    fn test_term_and_sequence() {
        assert_eq!(run(SpanQuery::term("cat")), vec![(0, 2, 3), (0, 5, 6)]);
        assert_eq!(
            run(SpanQuery::sequence(vec![SpanQuery::term("the"), SpanQuery::term("cat")])),
            vec![(0, 4, 6)]
        );
        assert_eq!(run(SpanQuery::term("dog")), vec![]);
    }

    #[test]
    fn test_tags_containing_term() {
        let query = SpanQuery::PositionFilter {
            producer: Box::new(SpanQuery::Tags {
                field: None,
                name: "np".to_string(),
                capture: None,
            }),
            filter: Box::new(SpanQuery::term("big")),
            op: crate::spans::position_filter::PositionFilterOp::Containing,
            invert: false,
            left_adjust: 0,
            right_adjust: 0,
        };
        assert_eq!(run(query), vec![(0, 0, 3)]);
    }

    #[test]
    fn test_relations_by_pattern() {
        let query = SpanQuery::Relations {
            field: None,
            relation_type: "dep::.*".to_string(),
            direction: Direction::Both,
            mode: SpanMode::Target,
            capture: None,
        };
        let mut hits = run(query);
        hits.sort();
        assert_eq!(hits, vec![(0, 1, 2), (0, 2, 3)]);
    }

    #[test]
    fn test_captures_and_constraint() {
        let query = SpanQuery::Constrained {
            clause: Box::new(SpanQuery::sequence(vec![
                SpanQuery::term("the").capture("A"),
                SpanQuery::Repetition {
                    clause: Box::new(SpanQuery::Term {
                        field: None,
                        annotation: None,
                        value: "big".to_string(),
                    }),
                    min: 1,
                    max: None,
                }
                .capture("B"),
            ])),
            constraint: serde_json::from_str::<ConstraintExpr>(
                r#"{"type": "compare", "op": "lt", "left": {"capture": "A"}, "right": {"capture": "B"}}"#,
            )
            .unwrap(),
        };
        let index = MemoryIndex::from_json_str(CORPUS).unwrap();
        let bound = query.bind(&IndexContext::default()).unwrap();
        assert_eq!(bound.defs().len(), 2);
        let mut spans = bound.create_iterator(&index.segments()[0]).unwrap();
        let hits = collect_hits(spans.as_mut(), bound.defs()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].start, hits[0].end), (0, 2));
        assert_eq!(hits[0].captures["B"], crate::spans::MatchInfo::span(1, 2));
    }

    #[test]
    fn test_unknown_constraint_capture() {
        let query = SpanQuery::Constrained {
            clause: Box::new(SpanQuery::term("the").capture("A")),
            constraint: ConstraintExpr::TokenValue {
                capture: "Z".to_string(),
                annotation: "word".to_string(),
            },
        };
        assert!(matches!(
            query.bind(&IndexContext::default()),
            Err(SpanlabError::Query(_))
        ));
    }

    #[test]
    fn test_engines_agree() {
        let query = SpanQuery::and(vec![
            SpanQuery::sequence(vec![SpanQuery::term("the"), SpanQuery::term("cat")]),
            SpanQuery::Tags {
                field: None,
                name: "np".to_string(),
                capture: None,
            },
        ]);
        let index = MemoryIndex::from_json_str(CORPUS).unwrap();
        let mut results = Vec::new();
        for simple in [true, false] {
            let config = EngineConfig::default()
                .with_simple_and(simple)
                .with_simple_sequence(simple);
            let bound = query.bind(&IndexContext::new(config)).unwrap();
            let mut spans = bound.create_iterator(&index.segments()[0]).unwrap();
            results.push(drain_hits(spans.as_mut()).unwrap());
        }
        assert_eq!(results[0], vec![(0, 4, 6)]);
        assert_eq!(results[0], results[1]);
    }
}
