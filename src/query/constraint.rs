//! Constraint expressions as written in a query tree.
//!
//! A [`ConstraintExpr`] refers to captures by name. [`ConstraintExpr::bind`]
//! resolves the names against the frozen match info slots and compiles
//! regular expressions, producing the [`BoundConstraint`] evaluated by
//! [`ConstrainedSpans`](crate::spans::constrained::ConstrainedSpans).

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanlabError};
use crate::index::segment::DEFAULT_ANNOTATION;
use crate::spans::constrained::{BoundConstraint, CaptureEdge, CompareOp, Sensitivity};
use crate::spans::match_info::MatchInfoDefs;

fn default_annotation() -> String {
    DEFAULT_ANNOTATION.to_string()
}

/// A capture position used in a position comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturePosition {
    pub capture: String,
    #[serde(default)]
    pub edge: CaptureEdge,
}

/// A boolean or string-valued expression over captures.
///
/// # Examples
///
/// ```
/// use spanlab::query::constraint::ConstraintExpr;
///
/// let json = r#"{
///     "type": "equals",
///     "left": { "type": "token_value", "capture": "A", "annotation": "lemma" },
///     "right": { "type": "token_value", "capture": "B", "annotation": "lemma" }
/// }"#;
/// let expr: ConstraintExpr = serde_json::from_str(json).unwrap();
/// assert_eq!(expr.capture_names(), vec!["A", "B"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintExpr {
    /// Value of `annotation` at the first token of capture `capture`.
    TokenValue {
        capture: String,
        #[serde(default = "default_annotation")]
        annotation: String,
    },
    Literal {
        value: String,
    },
    Equals {
        left: Box<ConstraintExpr>,
        right: Box<ConstraintExpr>,
        #[serde(default)]
        sensitivity: Sensitivity,
    },
    NotEquals {
        left: Box<ConstraintExpr>,
        right: Box<ConstraintExpr>,
        #[serde(default)]
        sensitivity: Sensitivity,
    },
    /// `value` must match `pattern` entirely.
    Matches {
        value: Box<ConstraintExpr>,
        pattern: String,
    },
    Compare {
        op: CompareOp,
        left: CapturePosition,
        right: CapturePosition,
    },
    And {
        clauses: Vec<ConstraintExpr>,
    },
    Or {
        clauses: Vec<ConstraintExpr>,
    },
    Not {
        clause: Box<ConstraintExpr>,
    },
}

impl ConstraintExpr {
    /// Names of all captures referred to, in order of appearance.
    pub fn capture_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            ConstraintExpr::TokenValue { capture, .. } => names.push(capture),
            ConstraintExpr::Literal { .. } => {}
            ConstraintExpr::Equals { left, right, .. } | ConstraintExpr::NotEquals { left, right, .. } => {
                left.collect_names(names);
                right.collect_names(names);
            }
            ConstraintExpr::Matches { value, .. } => value.collect_names(names),
            ConstraintExpr::Compare { left, right, .. } => {
                names.push(&left.capture);
                names.push(&right.capture);
            }
            ConstraintExpr::And { clauses } | ConstraintExpr::Or { clauses } => {
                for clause in clauses {
                    clause.collect_names(names);
                }
            }
            ConstraintExpr::Not { clause } => clause.collect_names(names),
        }
    }

    /// Resolve capture names to slots and compile patterns.
    pub fn bind(&self, defs: &MatchInfoDefs) -> Result<BoundConstraint> {
        let slot = |name: &str| {
            defs.index_of(name)
                .ok_or_else(|| SpanlabError::query(format!("constraint refers to unknown capture '{name}'")))
        };
        Ok(match self {
            ConstraintExpr::TokenValue { capture, annotation } => BoundConstraint::TokenValue {
                slot: slot(capture)?,
                annotation: annotation.clone(),
            },
            ConstraintExpr::Literal { value } => BoundConstraint::Literal(value.clone()),
            ConstraintExpr::Equals { left, right, sensitivity } => BoundConstraint::Equals(
                Box::new(left.bind(defs)?),
                Box::new(right.bind(defs)?),
                *sensitivity,
            ),
            ConstraintExpr::NotEquals { left, right, sensitivity } => BoundConstraint::NotEquals(
                Box::new(left.bind(defs)?),
                Box::new(right.bind(defs)?),
                *sensitivity,
            ),
            ConstraintExpr::Matches { value, pattern } => {
                let regex = Regex::new(&format!("^(?:{pattern})$"))
                    .map_err(|e| SpanlabError::query(format!("invalid constraint pattern '{pattern}': {e}")))?;
                BoundConstraint::Matches(Box::new(value.bind(defs)?), regex)
            }
            ConstraintExpr::Compare { op, left, right } => BoundConstraint::Compare {
                op: *op,
                left: (slot(&left.capture)?, left.edge),
                right: (slot(&right.capture)?, right.edge),
            },
            ConstraintExpr::And { clauses } => {
                BoundConstraint::And(clauses.iter().map(|c| c.bind(defs)).collect::<Result<_>>()?)
            }
            ConstraintExpr::Or { clauses } => {
                BoundConstraint::Or(clauses.iter().map(|c| c.bind(defs)).collect::<Result<_>>()?)
            }
            ConstraintExpr::Not { clause } => BoundConstraint::Not(Box::new(clause.bind(defs)?)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::match_info::{MatchInfoKind, MatchInfoRegistry};

    fn defs() -> std::sync::Arc<MatchInfoDefs> {
        let mut registry = MatchInfoRegistry::new();
        registry.register("A", MatchInfoKind::Span, "contents").unwrap();
        registry.register("B", MatchInfoKind::Span, "contents").unwrap();
        registry.freeze()
    }

    #[test]
    fn test_bind_resolves_slots() {
        let expr = ConstraintExpr::Compare {
            op: CompareOp::Lt,
            left: CapturePosition {
                capture: "B".to_string(),
                edge: CaptureEdge::End,
            },
            right: CapturePosition {
                capture: "A".to_string(),
                edge: CaptureEdge::Start,
            },
        };
        match expr.bind(&defs()).unwrap() {
            BoundConstraint::Compare { left, right, .. } => {
                assert_eq!(left, (1, CaptureEdge::End));
                assert_eq!(right, (0, CaptureEdge::Start));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_capture() {
        let expr = ConstraintExpr::Not {
            clause: Box::new(ConstraintExpr::TokenValue {
                capture: "C".to_string(),
                annotation: "word".to_string(),
            }),
        };
        assert!(matches!(expr.bind(&defs()), Err(SpanlabError::Query(_))));
    }

    #[test]
    fn test_invalid_pattern() {
        let expr = ConstraintExpr::Matches {
            value: Box::new(ConstraintExpr::Literal { value: "x".to_string() }),
            pattern: "(".to_string(),
        };
        assert!(expr.bind(&defs()).is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let expr: ConstraintExpr =
            serde_json::from_str(r#"{"type": "token_value", "capture": "A"}"#).unwrap();
        assert_eq!(
            expr,
            ConstraintExpr::TokenValue {
                capture: "A".to_string(),
                annotation: "word".to_string(),
            }
        );
    }
}
