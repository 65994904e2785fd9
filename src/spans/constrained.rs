//! Global constraints over captures (`A.word = B.word`, `A < B`).
//!
//! The constraint is evaluated last, on the fully resolved match info of
//! each hit, looking token values up in the forward index. Truth is
//! three-valued: a constraint touching an unset capture is undefined, and
//! only true constraints accept a hit.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::forward::{ForwardDocument, ForwardIndexAccessor};
use crate::spans::filter::{AcceptStatus, FilteredSpans, HitFilter};
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{DocId, Position, PositionIterator};

/// Three-valued truth of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    /// A capture the constraint depends on is not set.
    Undefined,
}

impl Truth {
    fn from_bool(value: bool) -> Self {
        if value { Truth::True } else { Truth::False }
    }

    fn and(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::False, _) | (_, Truth::False) => Truth::False,
            (Truth::True, Truth::True) => Truth::True,
            _ => Truth::Undefined,
        }
    }

    fn or(self, other: Truth) -> Truth {
        match (self, other) {
            (Truth::True, _) | (_, Truth::True) => Truth::True,
            (Truth::False, Truth::False) => Truth::False,
            _ => Truth::Undefined,
        }
    }

    fn not(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Undefined => Truth::Undefined,
        }
    }
}

/// Case handling when comparing token values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    #[default]
    Sensitive,
    Insensitive,
}

/// Comparison between two capture positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl CompareOp {
    fn apply(self, left: Position, right: Position) -> bool {
        match self {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Ge => left >= right,
            CompareOp::Gt => left > right,
        }
    }
}

/// Which edge of a captured span a position comparison reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureEdge {
    #[default]
    Start,
    End,
}

/// A constraint whose capture names are resolved to match info slots.
#[derive(Debug, Clone)]
pub enum BoundConstraint {
    /// Value of `annotation` at the first token of the captured span.
    TokenValue { slot: usize, annotation: String },
    Literal(String),
    Equals(Box<BoundConstraint>, Box<BoundConstraint>, Sensitivity),
    NotEquals(Box<BoundConstraint>, Box<BoundConstraint>, Sensitivity),
    /// `pattern` must match the whole value.
    Matches(Box<BoundConstraint>, Regex),
    Compare {
        op: CompareOp,
        left: (usize, CaptureEdge),
        right: (usize, CaptureEdge),
    },
    And(Vec<BoundConstraint>),
    Or(Vec<BoundConstraint>),
    Not(Box<BoundConstraint>),
}

impl BoundConstraint {
    /// Evaluate as a boolean expression.
    pub fn evaluate(&self, match_info: &[Option<MatchInfo>], document: &dyn ForwardDocument) -> Truth {
        match self {
            BoundConstraint::TokenValue { .. } | BoundConstraint::Literal(_) => {
                match self.value(match_info, document) {
                    Some(value) => Truth::from_bool(!value.is_empty()),
                    None => Truth::Undefined,
                }
            }
            BoundConstraint::Equals(left, right, sensitivity) => {
                Self::compare_values(left, right, *sensitivity, match_info, document)
            }
            BoundConstraint::NotEquals(left, right, sensitivity) => {
                Self::compare_values(left, right, *sensitivity, match_info, document).not()
            }
            BoundConstraint::Matches(value, pattern) => match value.value(match_info, document) {
                Some(value) => Truth::from_bool(pattern.is_match(&value)),
                None => Truth::Undefined,
            },
            BoundConstraint::Compare { op, left, right } => {
                match (Self::position(match_info, *left), Self::position(match_info, *right)) {
                    (Some(l), Some(r)) => Truth::from_bool(op.apply(l, r)),
                    _ => Truth::Undefined,
                }
            }
            BoundConstraint::And(clauses) => clauses
                .iter()
                .fold(Truth::True, |acc, c| acc.and(c.evaluate(match_info, document))),
            BoundConstraint::Or(clauses) => clauses
                .iter()
                .fold(Truth::False, |acc, c| acc.or(c.evaluate(match_info, document))),
            BoundConstraint::Not(clause) => clause.evaluate(match_info, document).not(),
        }
    }

    /// Evaluate as a string value; `None` if undefined.
    fn value(&self, match_info: &[Option<MatchInfo>], document: &dyn ForwardDocument) -> Option<String> {
        match self {
            BoundConstraint::TokenValue { slot, annotation } => {
                let info = match_info.get(*slot)?.as_ref()?;
                if info.span_end() <= info.span_start() {
                    return None;
                }
                document.token(annotation, info.span_start()).map(str::to_string)
            }
            BoundConstraint::Literal(value) => Some(value.clone()),
            other => match other.evaluate(match_info, document) {
                Truth::True => Some("true".to_string()),
                Truth::False => Some("false".to_string()),
                Truth::Undefined => None,
            },
        }
    }

    fn compare_values(
        left: &BoundConstraint,
        right: &BoundConstraint,
        sensitivity: Sensitivity,
        match_info: &[Option<MatchInfo>],
        document: &dyn ForwardDocument,
    ) -> Truth {
        match (left.value(match_info, document), right.value(match_info, document)) {
            (Some(l), Some(r)) => Truth::from_bool(match sensitivity {
                Sensitivity::Sensitive => l == r,
                Sensitivity::Insensitive => l.to_lowercase() == r.to_lowercase(),
            }),
            _ => Truth::Undefined,
        }
    }

    fn position(match_info: &[Option<MatchInfo>], (slot, edge): (usize, CaptureEdge)) -> Option<Position> {
        let info = match_info.get(slot)?.as_ref()?;
        Some(match edge {
            CaptureEdge::Start => info.span_start(),
            CaptureEdge::End => info.span_end(),
        })
    }
}

/// Hits whose captures satisfy a constraint.
pub type ConstrainedSpans = FilteredSpans<ConstraintFilter>;

/// Evaluates a [`BoundConstraint`] against each hit.
#[derive(Debug)]
pub struct ConstraintFilter {
    constraint: BoundConstraint,
    forward: Arc<dyn ForwardIndexAccessor>,
    document: Option<(DocId, Arc<dyn ForwardDocument>)>,
    scratch: Vec<Option<MatchInfo>>,
}

impl ConstraintFilter {
    fn document(&mut self, doc: DocId) -> Result<Arc<dyn ForwardDocument>> {
        match &self.document {
            Some((cached, document)) if *cached == doc => Ok(Arc::clone(document)),
            _ => {
                let document = self.forward.document(doc)?;
                self.document = Some((doc, Arc::clone(&document)));
                Ok(document)
            }
        }
    }
}

impl HitFilter for ConstraintFilter {
    fn accept(&mut self, inner: &mut dyn PositionIterator) -> Result<AcceptStatus> {
        self.scratch.iter_mut().for_each(|slot| *slot = None);
        inner.get_match_info(&mut self.scratch);
        let document = self.document(inner.doc_id())?;
        Ok(match self.constraint.evaluate(&self.scratch, document.as_ref()) {
            Truth::True => AcceptStatus::Yes,
            Truth::False | Truth::Undefined => AcceptStatus::No,
        })
    }

    fn cost(&self) -> f32 {
        10.0
    }
}

impl ConstrainedSpans {
    /// Keep `clause` hits satisfying `constraint`, reading token values from
    /// `forward`. `num_infos` is the number of match info slots.
    pub fn constrained(
        clause: Box<dyn PositionIterator>,
        constraint: BoundConstraint,
        forward: Arc<dyn ForwardIndexAccessor>,
        num_infos: usize,
    ) -> Self {
        let guarantees = *clause.guarantees();
        let filter = ConstraintFilter {
            constraint,
            forward,
            document: None,
            scratch: vec![None; num_infos],
        };
        FilteredSpans::new(clause, filter, guarantees)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::index::forward::{MemoryForwardDocument, MemoryForwardIndex};
    use crate::spans::capture::CaptureSpans;
    use crate::spans::list::{drain_hits, ListSpans};

    fn words(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn forward() -> Arc<dyn ForwardIndexAccessor> {
        let mut index = MemoryForwardIndex::new();
        let mut doc = MemoryForwardDocument::new();
        doc.set_annotation("word", words(&["The", "the", "cat", "Cat"]));
        index.insert(0, doc);
        Arc::new(index)
    }

    fn token(slot: usize) -> Box<BoundConstraint> {
        Box::new(BoundConstraint::TokenValue {
            slot,
            annotation: "word".to_string(),
        })
    }

    /// Pairs of one-token captures: A = first token, B = second token.
    fn pairs(hits: &[(DocId, Position, Position)]) -> Box<dyn PositionIterator> {
        let infos = |offset: i32| -> Vec<Option<MatchInfo>> {
            hits.iter()
                .map(|(_, s, _)| Some(MatchInfo::span(s + offset, s + offset + 1)))
                .collect()
        };
        let clause = ListSpans::from_triples(hits)
            .with_match_info(0, infos(0))
            .with_match_info(1, infos(1));
        Box::new(clause)
    }

    #[test]
    fn test_equal_token_values() {
        let constraint = BoundConstraint::Equals(token(0), token(1), Sensitivity::Insensitive);
        let mut spans = ConstrainedSpans::constrained(
            pairs(&[(0, 0, 2), (0, 1, 3), (0, 2, 4)]),
            constraint,
            forward(),
            2,
        );
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![(0, 0, 2), (0, 2, 4)]);

        let constraint = BoundConstraint::Equals(token(0), token(1), Sensitivity::Sensitive);
        let mut spans = ConstrainedSpans::constrained(pairs(&[(0, 0, 2), (0, 2, 4)]), constraint, forward(), 2);
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![]);
    }

    #[test]
    fn test_regex_and_literal() {
        let constraint = BoundConstraint::Or(vec![
            BoundConstraint::Matches(token(0), Regex::new("^(?:c.t)$").unwrap()),
            BoundConstraint::Equals(token(0), Box::new(BoundConstraint::Literal("The".to_string())), Sensitivity::Sensitive),
        ]);
        let clause = CaptureSpans::new(Box::new(ListSpans::from_triples(&[(0, 0, 1), (0, 1, 2), (0, 2, 3), (0, 3, 4)])), 0);
        let mut spans = ConstrainedSpans::constrained(Box::new(clause), constraint, forward(), 1);
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![(0, 0, 1), (0, 2, 3)]);
    }

    #[test]
    fn test_unset_capture_is_undefined() {
        let constraint = BoundConstraint::Not(Box::new(BoundConstraint::Equals(
            token(0),
            token(1),
            Sensitivity::Sensitive,
        )));
        // Slot 1 is never filled, so the negation stays undefined.
        let clause = CaptureSpans::new(Box::new(ListSpans::from_triples(&[(0, 0, 1)])), 0);
        let mut spans = ConstrainedSpans::constrained(Box::new(clause), constraint, forward(), 2);
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![]);
    }

    #[test]
    fn test_compare_positions() {
        let constraint = BoundConstraint::Compare {
            op: CompareOp::Lt,
            left: (1, CaptureEdge::Start),
            right: (0, CaptureEdge::Start),
        };
        let mut spans = ConstrainedSpans::constrained(pairs(&[(0, 0, 2)]), constraint, forward(), 2);
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![]);

        let truth = Truth::Undefined;
        assert_eq!(truth.and(Truth::False), Truth::False);
        assert_eq!(truth.or(Truth::True), Truth::True);
        assert_eq!(truth.not(), Truth::Undefined);
    }

    /// Counts document fetches.
    #[derive(Debug)]
    struct CountingForward {
        inner: MemoryForwardIndex,
        fetches: AtomicUsize,
    }

    impl ForwardIndexAccessor for CountingForward {
        fn document(&self, doc: DocId) -> Result<Arc<dyn ForwardDocument>> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            self.inner.document(doc)
        }
    }

    #[test]
    fn test_document_fetched_once_per_doc() {
        let mut inner = MemoryForwardIndex::new();
        for doc in 0..2 {
            let mut document = MemoryForwardDocument::new();
            document.set_annotation("word", words(&["a", "b", "c"]));
            inner.insert(doc, document);
        }
        let forward = Arc::new(CountingForward {
            inner,
            fetches: AtomicUsize::new(0),
        });

        let hits = [(0, 0, 1), (0, 1, 2), (0, 2, 3), (1, 0, 1), (1, 2, 3)];
        let clause = CaptureSpans::new(Box::new(ListSpans::from_triples(&hits)), 0);
        let accessor: Arc<dyn ForwardIndexAccessor> = forward.clone();
        let mut spans = ConstrainedSpans::constrained(Box::new(clause), *token(0), accessor, 1);
        assert_eq!(drain_hits(&mut spans).unwrap(), hits.to_vec());
        assert_eq!(forward.fetches.load(Ordering::Relaxed), 2);
    }
}
