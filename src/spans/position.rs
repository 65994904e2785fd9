//! The position iterator protocol.
//!
//! A [`PositionIterator`] enumerates documents in increasing id order and,
//! within the current document, hits as `(start, end)` token intervals. The
//! order of hits within a document is whatever the concrete iterator
//! documents through its [`Guarantees`].
//!
//! The protocol follows the usual inverted-index conventions:
//!
//! - before the first call to `next_doc`/`advance`, `doc_id()` is
//!   [`NOT_STARTED`]; after exhaustion it is [`NO_MORE_DOCS`];
//! - after landing on a document, `start_position()` and `end_position()`
//!   are [`NOT_STARTED`] until the first `next_start_position()`; after the
//!   last hit of the document they are [`NO_MORE_POSITIONS`];
//! - iterators only ever move forward.
//!
//! Two-phase matching is expressed with three optional methods. An iterator
//! whose [`PositionIterator::match_cost`] is `Some` can be moved with the
//! cheap `approximation_*` methods, which land on *candidate* documents, and
//! [`PositionIterator::confirm`] then performs the real matching for the
//! candidate. `confirm` must be called at most once per candidate and before
//! any position is read. Iterators without a two-phase split inherit
//! defaults that make the approximation the iterator itself.

use std::fmt::Debug;

use crate::error::Result;
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::relation_info::RelationInfo;

/// Document id within one segment.
pub type DocId = i32;

/// Token position within one document.
pub type Position = i32;

/// Value of `doc_id()`/`start_position()` before the iterator was positioned.
pub const NOT_STARTED: i32 = -1;

/// Value of `doc_id()` once all documents have been visited.
pub const NO_MORE_DOCS: DocId = i32::MAX;

/// Value of `start_position()`/`end_position()` once the document has no
/// more hits.
pub const NO_MORE_POSITIONS: Position = i32::MAX;

/// Trait for per-segment hit iterators.
pub trait PositionIterator: Send + Debug {
    /// Get the current document id.
    fn doc_id(&self) -> DocId;

    /// Move to the next document that has at least one hit.
    fn next_doc(&mut self) -> Result<DocId>;

    /// Move to the first document `>= target` that has at least one hit.
    /// `target` must be greater than the current document.
    fn advance(&mut self, target: DocId) -> Result<DocId>;

    /// Move to the next hit in the current document.
    fn next_start_position(&mut self) -> Result<Position>;

    /// Move to the first hit whose start is `>= target`. Always moves at
    /// least one hit forward, even if the current hit already qualifies.
    ///
    /// The default implementation steps through hits one by one, which is
    /// the only correct option for iterators whose output is not
    /// start-sorted.
    fn advance_start_position(&mut self, target: Position) -> Result<Position> {
        naive_advance_start_position(self, target)
    }

    /// Start of the current hit.
    fn start_position(&self) -> Position;

    /// End (exclusive) of the current hit.
    fn end_position(&self) -> Position;

    /// Upper bound of the number of documents this iterator can visit.
    fn cost(&self) -> u64;

    /// Estimated cost of iterating all positions of one document.
    fn positions_cost(&self) -> f32;

    /// Static ordering, uniqueness and length properties of the output.
    fn guarantees(&self) -> &Guarantees;

    /// Fill this hit's contribution into the per-hit match info array.
    fn get_match_info(&self, _match_info: &mut [Option<MatchInfo>]) {}

    /// Whether this iterator (or one of its children) fills any match info.
    fn has_match_info(&self) -> bool {
        false
    }

    /// The relation matched by the current hit, if it was produced by a
    /// relation leaf.
    fn active_relation(&self) -> Option<RelationInfo> {
        None
    }

    /// Payload attached to the current position, for leaf iterators.
    fn payload(&self) -> Option<&[u8]> {
        None
    }

    /// Cost of [`PositionIterator::confirm`] per candidate document, or
    /// `None` if this iterator has no two-phase split.
    fn match_cost(&self) -> Option<f32> {
        None
    }

    /// Move to the next candidate document without confirming it.
    fn approximation_next_doc(&mut self) -> Result<DocId> {
        self.next_doc()
    }

    /// Move to the first candidate document `>= target` without confirming it.
    fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        self.advance(target)
    }

    /// Confirm that the current candidate document really has a hit.
    fn confirm(&mut self) -> Result<bool> {
        Ok(true)
    }
}

impl PositionIterator for Box<dyn PositionIterator> {
    fn doc_id(&self) -> DocId {
        (**self).doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        (**self).next_doc()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        (**self).advance(target)
    }

    fn next_start_position(&mut self) -> Result<Position> {
        (**self).next_start_position()
    }

    fn advance_start_position(&mut self, target: Position) -> Result<Position> {
        (**self).advance_start_position(target)
    }

    fn start_position(&self) -> Position {
        (**self).start_position()
    }

    fn end_position(&self) -> Position {
        (**self).end_position()
    }

    fn cost(&self) -> u64 {
        (**self).cost()
    }

    fn positions_cost(&self) -> f32 {
        (**self).positions_cost()
    }

    fn guarantees(&self) -> &Guarantees {
        (**self).guarantees()
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        (**self).get_match_info(match_info)
    }

    fn has_match_info(&self) -> bool {
        (**self).has_match_info()
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        (**self).active_relation()
    }

    fn payload(&self) -> Option<&[u8]> {
        (**self).payload()
    }

    fn match_cost(&self) -> Option<f32> {
        (**self).match_cost()
    }

    fn approximation_next_doc(&mut self) -> Result<DocId> {
        (**self).approximation_next_doc()
    }

    fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        (**self).approximation_advance(target)
    }

    fn confirm(&mut self) -> Result<bool> {
        (**self).confirm()
    }
}

/// Step through hits until one starts at or after `target`.
pub fn naive_advance_start_position<I: PositionIterator + ?Sized>(
    iter: &mut I,
    target: Position,
) -> Result<Position> {
    debug_assert!(
        is_in_document(iter.doc_id()),
        "advance_start_position called outside a document (doc {})",
        iter.doc_id()
    );
    loop {
        let start = iter.next_start_position()?;
        if start >= target {
            return Ok(start);
        }
    }
}

/// Whether `doc` is a real document rather than a sentinel.
pub fn is_in_document(doc: DocId) -> bool {
    doc != NOT_STARTED && doc != NO_MORE_DOCS
}

/// Whether `start` is a hit rather than a sentinel.
pub fn is_on_hit(start: Position) -> bool {
    start != NOT_STARTED && start != NO_MORE_POSITIONS
}

/// Slot `index` of a match info array. Arrays are sized by the bound
/// query's definitions, so an index past the end is a protocol error.
pub fn match_info_slot(match_info: &mut [Option<MatchInfo>], index: usize) -> Option<&mut Option<MatchInfo>> {
    debug_assert!(
        index < match_info.len(),
        "match info slot {index} outside an array of {} slots",
        match_info.len()
    );
    match_info.get_mut(index)
}

/// Starting from candidate `doc`, keep confirming and moving on until a
/// confirmed document is found. Used by two-phase iterators to implement
/// `next_doc`/`advance` on top of their approximation.
pub fn confirmed_doc<I: PositionIterator + ?Sized>(iter: &mut I, mut doc: DocId) -> Result<DocId> {
    while doc != NO_MORE_DOCS {
        if iter.confirm()? {
            return Ok(doc);
        }
        doc = iter.approximation_next_doc()?;
    }
    Ok(NO_MORE_DOCS)
}

/// Cost of confirming a candidate of `iter`: its own confirm cost if it has
/// a two-phase split, otherwise the cost of walking its positions.
pub fn confirm_cost(iter: &dyn PositionIterator) -> f32 {
    iter.match_cost().unwrap_or_else(|| iter.positions_cost())
}

/// Put all clauses on the same candidate document `>= target` using their
/// approximations (leapfrog). Returns the common document or
/// [`NO_MORE_DOCS`].
pub fn align_approximations(
    clauses: &mut [Box<dyn PositionIterator>],
    target: DocId,
) -> Result<DocId> {
    let mut doc = target;
    'outer: loop {
        for clause in clauses.iter_mut() {
            let mut clause_doc = clause.doc_id();
            if clause_doc < doc {
                clause_doc = clause.approximation_advance(doc)?;
            }
            if clause_doc == NO_MORE_DOCS {
                return Ok(NO_MORE_DOCS);
            }
            if clause_doc > doc {
                doc = clause_doc;
                continue 'outer;
            }
        }
        return Ok(doc);
    }
}

/// An iterator that never matches.
#[derive(Debug)]
pub struct EmptySpans {
    doc: DocId,
    guarantees: Guarantees,
}

impl EmptySpans {
    /// Create a new empty iterator.
    pub fn new() -> Self {
        EmptySpans {
            doc: NOT_STARTED,
            guarantees: Guarantees::TERM,
        }
    }
}

impl Default for EmptySpans {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionIterator for EmptySpans {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.doc = NO_MORE_DOCS;
        Ok(NO_MORE_DOCS)
    }

    fn advance(&mut self, _target: DocId) -> Result<DocId> {
        self.doc = NO_MORE_DOCS;
        Ok(NO_MORE_DOCS)
    }

    fn next_start_position(&mut self) -> Result<Position> {
        Ok(NO_MORE_POSITIONS)
    }

    fn start_position(&self) -> Position {
        NO_MORE_POSITIONS
    }

    fn end_position(&self) -> Position {
        NO_MORE_POSITIONS
    }

    fn cost(&self) -> u64 {
        0
    }

    fn positions_cost(&self) -> f32 {
        0.0
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }
}
