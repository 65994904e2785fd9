//! In-memory positional index consumed by the span engine.
//!
//! The engine reads postings through [`posting::PostingSource`] and token
//! values through [`forward::ForwardIndexAccessor`]; the in-memory types in
//! this module implement both for tests, benches and the CLI.

// Core data structures
pub mod forward;
pub mod posting;
pub mod segment;

// Building
pub mod corpus;
pub mod memory;

pub use memory::MemoryIndex;
pub use segment::Segment;
