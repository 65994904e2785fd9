//! Span query trees: rewriting, binding and iterator construction.
//!
//! A query goes through three steps before it produces hits:
//!
//! 1. [`SpanQuery::rewrite`] normalizes the tree (see [`rewrite`]).
//! 2. [`SpanQuery::bind`] registers every capture and relation name once and
//!    freezes the slot definitions into an immutable
//!    [`MatchInfoDefs`](crate::spans::MatchInfoDefs).
//! 3. [`BoundQuery::create_iterator`] builds the iterator tree for one
//!    segment, choosing the conjunction and sequence engines from the clause
//!    guarantees.
//!
//! # Examples
//!
//! ```
//! use spanlab::config::EngineConfig;
//! use spanlab::index::MemoryIndex;
//! use spanlab::query::{IndexContext, SpanQuery};
//! use spanlab::collect::collect_hits;
//!
//! let index = MemoryIndex::from_json_str(r#"{"documents": [
//!     {"fields": {"contents": {"annotations": {"word": ["the", "cat", "sat"]}}}}
//! ]}"#).unwrap();
//!
//! let query = SpanQuery::sequence(vec![SpanQuery::term("the"), SpanQuery::term("cat").capture("animal")]);
//! let bound = query.bind(&IndexContext::new(EngineConfig::default())).unwrap();
//! let mut spans = bound.create_iterator(&index.segments()[0]).unwrap();
//! let hits = collect_hits(spans.as_mut(), bound.defs()).unwrap();
//!
//! assert_eq!(hits.len(), 1);
//! assert_eq!((hits[0].start, hits[0].end), (0, 2));
//! ```

pub mod build;
pub mod constraint;
pub mod node;
pub mod rewrite;

use crate::config::EngineConfig;

pub use build::BoundQuery;
pub use constraint::ConstraintExpr;
pub use node::SpanQuery;

/// What rewriting and iterator construction need to know about the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexContext {
    /// Field used by leaves that don't name one.
    pub default_field: String,
    pub config: EngineConfig,
}

impl IndexContext {
    /// Create a context from an engine configuration.
    pub fn new(config: EngineConfig) -> Self {
        IndexContext {
            default_field: config.default_field.clone(),
            config,
        }
    }

    /// Override the default field.
    pub fn with_default_field<S: Into<String>>(mut self, field: S) -> Self {
        self.default_field = field.into();
        self
    }
}

impl Default for IndexContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
