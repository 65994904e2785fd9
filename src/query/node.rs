//! The query tree.

use serde::{Deserialize, Serialize};

use crate::query::constraint::ConstraintExpr;
use crate::spans::guarantees::Guarantees;
use crate::spans::position::DocId;
use crate::spans::position_filter::PositionFilterOp;
use crate::spans::relation_info::{Direction, SpanMode};

fn default_relation_type() -> String {
    ".*".to_string()
}

fn default_direction() -> Direction {
    Direction::Both
}

fn default_span_mode() -> SpanMode {
    SpanMode::Source
}

/// A node of a span query tree.
///
/// Fields left unset on leaves are taken from the surrounding
/// [`OverrideField`](SpanQuery::OverrideField) node, or from the default
/// field of the [`IndexContext`](crate::query::IndexContext).
///
/// # Examples
///
/// ```
/// use spanlab::query::SpanQuery;
///
/// let json = r#"{
///     "type": "sequence",
///     "clauses": [
///         { "type": "term", "value": "the" },
///         { "type": "capture", "name": "noun", "clause": { "type": "term", "annotation": "pos", "value": "NOUN" } }
///     ]
/// }"#;
/// let query: SpanQuery = serde_json::from_str(json).unwrap();
/// assert!(query.guarantees().start_sorted);
/// assert_eq!(query.guarantees().min_length, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpanQuery {
    /// Every occurrence of a token value.
    Term {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        annotation: Option<String>,
        value: String,
    },

    /// Every occurrence of an inline tag, optionally captured.
    Tags {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capture: Option<String>,
    },

    /// Relations whose type fully matches the regular expression
    /// `relation_type`.
    Relations {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default = "default_relation_type")]
        relation_type: String,
        #[serde(default = "default_direction")]
        direction: Direction,
        #[serde(default = "default_span_mode")]
        mode: SpanMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capture: Option<String>,
    },

    /// Hits present in all clauses.
    And {
        clauses: Vec<SpanQuery>,
        /// Never match the same relation twice in one hit.
        #[serde(default)]
        unique_relations: bool,
    },

    /// Concatenation of the clauses.
    Sequence { clauses: Vec<SpanQuery> },

    /// Hits of any clause.
    Or { clauses: Vec<SpanQuery> },

    /// `min` to `max` consecutive hits of the clause (`max` of `None` is
    /// unbounded).
    Repetition {
        clause: Box<SpanQuery>,
        min: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<u32>,
    },

    /// Leading (or trailing) edge of each hit.
    Edge {
        clause: Box<SpanQuery>,
        #[serde(default)]
        trailing: bool,
    },

    /// Capture each hit under `name`.
    Capture {
        clause: Box<SpanQuery>,
        name: String,
        #[serde(default)]
        left_adjust: i32,
        #[serde(default)]
        right_adjust: i32,
    },

    /// Producer hits positioned relative to filter hits.
    PositionFilter {
        producer: Box<SpanQuery>,
        filter: Box<SpanQuery>,
        op: PositionFilterOp,
        #[serde(default)]
        invert: bool,
        #[serde(default)]
        left_adjust: i32,
        #[serde(default)]
        right_adjust: i32,
    },

    /// Capture the relations inside each hit (or inside capture `within`)
    /// as a relation list called `capture`.
    CaptureRelationsWithinSpan {
        clause: Box<SpanQuery>,
        #[serde(default = "default_relation_type")]
        relation_type: String,
        capture: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        within: Option<String>,
    },

    /// Hits whose captures satisfy a constraint.
    Constrained {
        clause: Box<SpanQuery>,
        constraint: ConstraintExpr,
    },

    /// Hits in the listed documents only.
    FilterDocs {
        clause: Box<SpanQuery>,
        docs: Vec<DocId>,
    },

    /// Hits sorted per document by start (or end), optionally deduplicated.
    Sorted {
        clause: Box<SpanQuery>,
        #[serde(default)]
        by_end: bool,
        #[serde(default)]
        dedup: bool,
    },

    /// Adjacent duplicate hits removed.
    Unique { clause: Box<SpanQuery> },

    /// The clause is matched in `field` instead of the surrounding field.
    OverrideField { clause: Box<SpanQuery>, field: String },

    /// Matches nothing.
    NoHits,
}

impl SpanQuery {
    /// Create a term query on the default field and annotation.
    pub fn term<S: Into<String>>(value: S) -> Self {
        SpanQuery::Term {
            field: None,
            annotation: None,
            value: value.into(),
        }
    }

    /// Create a term query on `annotation`.
    pub fn annotated_term<A: Into<String>, S: Into<String>>(annotation: A, value: S) -> Self {
        SpanQuery::Term {
            field: None,
            annotation: Some(annotation.into()),
            value: value.into(),
        }
    }

    /// Create a sequence of `clauses`.
    pub fn sequence(clauses: Vec<SpanQuery>) -> Self {
        SpanQuery::Sequence { clauses }
    }

    /// Create a conjunction of `clauses`.
    pub fn and(clauses: Vec<SpanQuery>) -> Self {
        SpanQuery::And {
            clauses,
            unique_relations: false,
        }
    }

    /// Create a disjunction of `clauses`.
    pub fn or(clauses: Vec<SpanQuery>) -> Self {
        SpanQuery::Or { clauses }
    }

    /// Repeat this query `min` to `max` times.
    pub fn repeat(self, min: u32, max: Option<u32>) -> Self {
        SpanQuery::Repetition {
            clause: Box::new(self),
            min,
            max,
        }
    }

    /// Capture this query's hits as `name`.
    pub fn capture<S: Into<String>>(self, name: S) -> Self {
        SpanQuery::Capture {
            clause: Box::new(self),
            name: name.into(),
            left_adjust: 0,
            right_adjust: 0,
        }
    }

    /// Short name of the node kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SpanQuery::Term { .. } => "term",
            SpanQuery::Tags { .. } => "tags",
            SpanQuery::Relations { .. } => "relations",
            SpanQuery::And { .. } => "and",
            SpanQuery::Sequence { .. } => "sequence",
            SpanQuery::Or { .. } => "or",
            SpanQuery::Repetition { .. } => "repetition",
            SpanQuery::Edge { .. } => "edge",
            SpanQuery::Capture { .. } => "capture",
            SpanQuery::PositionFilter { .. } => "position_filter",
            SpanQuery::CaptureRelationsWithinSpan { .. } => "capture_relations_within_span",
            SpanQuery::Constrained { .. } => "constrained",
            SpanQuery::FilterDocs { .. } => "filter_docs",
            SpanQuery::Sorted { .. } => "sorted",
            SpanQuery::Unique { .. } => "unique",
            SpanQuery::OverrideField { .. } => "override_field",
            SpanQuery::NoHits => "no_hits",
        }
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&SpanQuery> {
        match self {
            SpanQuery::Term { .. }
            | SpanQuery::Tags { .. }
            | SpanQuery::Relations { .. }
            | SpanQuery::NoHits => Vec::new(),
            SpanQuery::And { clauses, .. } | SpanQuery::Sequence { clauses } | SpanQuery::Or { clauses } => {
                clauses.iter().collect()
            }
            SpanQuery::PositionFilter { producer, filter, .. } => vec![producer.as_ref(), filter.as_ref()],
            SpanQuery::Repetition { clause, .. }
            | SpanQuery::Edge { clause, .. }
            | SpanQuery::Capture { clause, .. }
            | SpanQuery::CaptureRelationsWithinSpan { clause, .. }
            | SpanQuery::Constrained { clause, .. }
            | SpanQuery::FilterDocs { clause, .. }
            | SpanQuery::Sorted { clause, .. }
            | SpanQuery::Unique { clause }
            | SpanQuery::OverrideField { clause, .. } => vec![clause.as_ref()],
        }
    }

    /// Guarantees of the hits this node produces.
    pub fn guarantees(&self) -> Guarantees {
        match self {
            SpanQuery::Term { .. } | SpanQuery::NoHits => Guarantees::TERM,
            SpanQuery::Tags { .. } => Guarantees::tags(),
            SpanQuery::Relations { direction, mode, .. } => {
                Guarantees::relations(&Guarantees::SORTED, *direction, *mode)
            }
            SpanQuery::And { clauses, .. } => {
                Guarantees::and(&clauses.iter().map(|c| c.guarantees()).collect::<Vec<_>>())
            }
            SpanQuery::Sequence { clauses } => sequence_guarantees(clauses),
            SpanQuery::Or { clauses } => {
                Guarantees::or(&clauses.iter().map(|c| c.guarantees()).collect::<Vec<_>>())
            }
            SpanQuery::Repetition { clause, min, max } => {
                Guarantees::repetition(&clause.guarantees(), *min, *max)
            }
            SpanQuery::Edge { clause, trailing } => Guarantees::edge(&clause.guarantees(), *trailing),
            SpanQuery::Sorted { clause, by_end, dedup } => {
                Guarantees::sorted(&clause.guarantees(), *by_end, *dedup)
            }
            SpanQuery::Unique { clause } => Guarantees::unique(&clause.guarantees()),
            SpanQuery::PositionFilter { producer, .. } => producer.guarantees(),
            SpanQuery::Capture { clause, .. }
            | SpanQuery::CaptureRelationsWithinSpan { clause, .. }
            | SpanQuery::Constrained { clause, .. }
            | SpanQuery::FilterDocs { clause, .. }
            | SpanQuery::OverrideField { clause, .. } => clause.guarantees(),
        }
    }
}

/// Guarantees of concatenating `clauses` pairwise from the left.
pub(crate) fn sequence_guarantees(clauses: &[SpanQuery]) -> Guarantees {
    let mut iter = clauses.iter().map(|c| c.guarantees());
    let Some(first) = iter.next() else {
        return Guarantees::NONE;
    };
    iter.fold(first, |left, right| pair_sequence_guarantees(&left, &right))
}

/// Guarantees of concatenating one `left` and one `right` clause.
pub(crate) fn pair_sequence_guarantees(left: &Guarantees, right: &Guarantees) -> Guarantees {
    let mut guarantees = Guarantees::sequence(&[*left, *right]);
    if !left.hits_are_unique() {
        guarantees.start_sorted = false;
        guarantees.end_sorted = false;
    }
    guarantees
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_keeps_sorted_unique() {
        let query = SpanQuery::and(vec![SpanQuery::term("a"), SpanQuery::term("b")]);
        let guarantees = query.guarantees();
        assert!(guarantees.start_sorted);
        assert!(guarantees.unique_start);
        assert!(guarantees.is_sorted_unique());
    }

    #[test]
    fn test_sequence_lengths() {
        let query = SpanQuery::sequence(vec![
            SpanQuery::term("a"),
            SpanQuery::term("b").repeat(1, Some(3)),
        ]);
        let guarantees = query.guarantees();
        assert_eq!(guarantees.min_length, 2);
        assert_eq!(guarantees.max_length, Some(4));
        assert!(guarantees.start_sorted);
    }

    #[test]
    fn test_serde_tagged() {
        let query = SpanQuery::Tags {
            field: None,
            name: "s".to_string(),
            capture: Some("sentence".to_string()),
        };
        let json = serde_json::to_string(&query).unwrap();
        assert_eq!(json, r#"{"type":"tags","name":"s","capture":"sentence"}"#);
        let back: SpanQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(back, query);

        let relations: SpanQuery = serde_json::from_str(r#"{"type": "relations"}"#).unwrap();
        assert_eq!(
            relations,
            SpanQuery::Relations {
                field: None,
                relation_type: ".*".to_string(),
                direction: Direction::Both,
                mode: SpanMode::Source,
                capture: None,
            }
        );
    }

    #[test]
    fn test_children() {
        let query = SpanQuery::PositionFilter {
            producer: Box::new(SpanQuery::term("a")),
            filter: Box::new(SpanQuery::NoHits),
            op: PositionFilterOp::Within,
            invert: false,
            left_adjust: 0,
            right_adjust: 0,
        };
        assert_eq!(query.kind(), "position_filter");
        assert_eq!(query.children(), vec![&SpanQuery::term("a"), &SpanQuery::NoHits]);
    }
}
