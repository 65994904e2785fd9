//! # Spanlab
//!
//! A positional-match execution engine for span queries over an inverted
//! index: every hit is a `[start, end)` token interval inside a document,
//! optionally carrying named captures and relations.
//!
//! ## Features
//!
//! - Lazy, forward-only position iterators with two-phase matching
//! - Conjunction, sequence, repetition and positional filter operators
//! - Per-document bucketing for operators needing look-back
//! - Relations and inline tags decoded from posting payloads
//! - Named captures and token-value constraints over them
//! - Query rewriting driven by ordering/uniqueness guarantees
//!
//! ## Example
//!
//! ```
//! use spanlab::prelude::*;
//!
//! let index = MemoryIndex::from_json_str(r#"{"documents": [
//!     {"fields": {"contents": {"annotations": {"word": ["a", "b", "a", "b"]}}}}
//! ]}"#).unwrap();
//!
//! let query = SpanQuery::sequence(vec![SpanQuery::term("a"), SpanQuery::term("b")]);
//! let bound = query.bind(&IndexContext::default()).unwrap();
//! let results = collect_hits_per_segment(&bound, &index).unwrap();
//!
//! let spans: Vec<_> = results[0].hits.iter().map(|h| (h.start, h.end)).collect();
//! assert_eq!(spans, vec![(0, 2), (2, 4)]);
//! ```

pub mod cli;
pub mod collect;
pub mod config;
pub mod error;
pub mod index;
pub mod query;
pub mod spans;
pub mod util;

pub mod prelude {
    pub use crate::collect::{Hit, SegmentHits, collect_hits, collect_hits_per_segment};
    pub use crate::config::EngineConfig;
    pub use crate::error::{Result, SpanlabError};
    pub use crate::index::{MemoryIndex, Segment};
    pub use crate::query::{BoundQuery, ConstraintExpr, IndexContext, SpanQuery};
    pub use crate::spans::{
        Direction, Guarantees, MatchInfo, MatchInfoDefs, PositionIterator, RelationInfo, SpanMode,
    };
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
