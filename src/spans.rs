//! Position iterators ("spans") and the operators combining them.
//!
//! Every operator is a [`PositionIterator`] owning its children. Leaves read
//! postings ([`term`], [`tags`], [`relations`]); composites synchronise their
//! children ([`and`], [`sequence`], [`or`]), regroup them ([`buckets`],
//! [`repetition`], [`sorted`]) or filter them ([`filter`],
//! [`position_filter`], [`constrained`]).
//!
//! # Architecture
//!
//! - **Protocol**: [`position`] defines the iterator contract and the
//!   two-phase helpers shared by all composites.
//! - **Guarantees**: [`guarantees`] describes ordering and uniqueness of an
//!   iterator's output, used to pick fast paths and skip normalisation.
//! - **Match info**: [`match_info`] assigns slots to named captures and
//!   relations; [`relation_info`] decodes relation payloads.

// Protocol and static properties
pub mod guarantees;
pub mod match_info;
pub mod position;
pub mod relation_info;

// Leaves
pub mod list;
pub mod relations;
pub mod tags;
pub mod term;

// Shared machinery
pub mod buckets;
pub mod filter;

// Operators
pub mod and;
pub mod capture;
pub mod constrained;
pub mod edge;
pub mod or;
pub mod override_field;
pub mod position_filter;
pub mod relations_within;
pub mod repetition;
pub mod sequence;
pub mod sorted;

pub use guarantees::Guarantees;
pub use match_info::{MatchInfo, MatchInfoDefs, MatchInfoKind, MatchInfoRegistry};
pub use position::{
    DocId, EmptySpans, Position, PositionIterator, NOT_STARTED, NO_MORE_DOCS, NO_MORE_POSITIONS,
};
pub use relation_info::{Direction, RelationInfo, SpanMode};
