//! Reusable filtering shapes.
//!
//! - [`FilteredSpans`] walks the hits of an inner iterator and asks a
//!   [`HitFilter`] to classify each one as [`AcceptStatus::Yes`],
//!   [`AcceptStatus::No`] or [`AcceptStatus::NoMoreInDocument`]. The first
//!   accepted hit of a document is found while confirming the document and
//!   staged, so the first `next_start_position` call returns it.
//! - [`DocFilterSpans`] skips whole documents rejected by a [`DocFilter`]
//!   and forwards positions unchanged.
//!
//! Both shapes are always two-phase: the approximation is the inner
//! iterator's approximation (or the inner iterator itself) and confirming
//! runs the inner confirm followed by the local predicate.

use std::fmt::Debug;

use crate::error::Result;
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{
    confirm_cost, confirmed_doc, naive_advance_start_position, DocId, Position, PositionIterator,
    NOT_STARTED, NO_MORE_DOCS, NO_MORE_POSITIONS,
};
use crate::spans::relation_info::RelationInfo;

/// Result of classifying one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptStatus {
    /// Return this hit.
    Yes,
    /// Skip this hit.
    No,
    /// Skip this hit and all remaining hits in the document.
    NoMoreInDocument,
}

/// A per-hit predicate plugged into [`FilteredSpans`].
///
/// The filter may also reshape hits (report a different start/end, add
/// match info); it sees the inner iterator positioned on the hit in
/// question.
pub trait HitFilter: Send + Debug {
    /// Classify the hit the inner iterator is currently positioned on.
    fn accept(&mut self, inner: &mut dyn PositionIterator) -> Result<AcceptStatus>;

    /// Start of the accepted hit.
    fn start(&self, inner: &dyn PositionIterator) -> Position {
        inner.start_position()
    }

    /// End of the accepted hit.
    fn end(&self, inner: &dyn PositionIterator) -> Position {
        inner.end_position()
    }

    /// Fill match info for the accepted hit.
    fn get_match_info(&self, inner: &dyn PositionIterator, match_info: &mut [Option<MatchInfo>]) {
        inner.get_match_info(match_info);
    }

    /// Whether any match info is produced.
    fn has_match_info(&self, inner: &dyn PositionIterator) -> bool {
        inner.has_match_info()
    }

    /// Relation matched by the accepted hit.
    fn active_relation(&self, inner: &dyn PositionIterator) -> Option<RelationInfo> {
        inner.active_relation()
    }

    /// Whether [`HitFilter::start`] always equals the inner start, so
    /// skipping by start can be delegated to the inner iterator.
    fn preserves_start(&self) -> bool {
        true
    }

    /// Estimated cost of one [`HitFilter::accept`] call.
    fn cost(&self) -> f32 {
        1.0
    }
}

/// Hits of an inner iterator that pass a [`HitFilter`].
#[derive(Debug)]
pub struct FilteredSpans<F: HitFilter> {
    inner: Box<dyn PositionIterator>,
    filter: F,
    guarantees: Guarantees,
    /// The first accepted hit was found by `confirm` and not returned yet.
    at_first_in_doc: bool,
    doc_exhausted: bool,
}

impl<F: HitFilter> FilteredSpans<F> {
    /// Wrap `inner` with `filter`. `guarantees` describe the filtered output.
    pub fn new(inner: Box<dyn PositionIterator>, filter: F, guarantees: Guarantees) -> Self {
        FilteredSpans {
            inner,
            filter,
            guarantees,
            at_first_in_doc: false,
            doc_exhausted: false,
        }
    }

    /// The filter.
    pub fn filter(&self) -> &F {
        &self.filter
    }

    /// The inner iterator.
    pub fn inner(&self) -> &dyn PositionIterator {
        self.inner.as_ref()
    }

    /// Starting with the hit at `start`, find the first accepted hit.
    fn find_accepted(&mut self, mut start: Position) -> Result<Position> {
        loop {
            if start == NO_MORE_POSITIONS {
                self.doc_exhausted = true;
                return Ok(NO_MORE_POSITIONS);
            }
            match self.filter.accept(self.inner.as_mut())? {
                AcceptStatus::Yes => return Ok(self.filter.start(self.inner.as_ref())),
                AcceptStatus::No => start = self.inner.next_start_position()?,
                AcceptStatus::NoMoreInDocument => {
                    self.doc_exhausted = true;
                    return Ok(NO_MORE_POSITIONS);
                }
            }
        }
    }
}

impl<F: HitFilter> PositionIterator for FilteredSpans<F> {
    fn doc_id(&self) -> DocId {
        self.inner.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let doc = self.approximation_next_doc()?;
        confirmed_doc(self, doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let doc = self.approximation_advance(target)?;
        confirmed_doc(self, doc)
    }

    fn next_start_position(&mut self) -> Result<Position> {
        if self.at_first_in_doc {
            self.at_first_in_doc = false;
            return Ok(self.start_position());
        }
        if self.doc_exhausted {
            return Ok(NO_MORE_POSITIONS);
        }
        let start = self.inner.next_start_position()?;
        self.find_accepted(start)
    }

    fn advance_start_position(&mut self, target: Position) -> Result<Position> {
        if self.at_first_in_doc {
            self.at_first_in_doc = false;
            let start = self.start_position();
            if start >= target {
                return Ok(start);
            }
        }
        if self.doc_exhausted {
            return Ok(NO_MORE_POSITIONS);
        }
        if !self.filter.preserves_start() {
            return naive_advance_start_position(self, target);
        }
        let start = self.inner.advance_start_position(target)?;
        self.find_accepted(start)
    }

    fn start_position(&self) -> Position {
        if self.at_first_in_doc {
            NOT_STARTED
        } else if self.doc_exhausted {
            NO_MORE_POSITIONS
        } else {
            self.filter.start(self.inner.as_ref())
        }
    }

    fn end_position(&self) -> Position {
        if self.at_first_in_doc {
            NOT_STARTED
        } else if self.doc_exhausted {
            NO_MORE_POSITIONS
        } else {
            self.filter.end(self.inner.as_ref())
        }
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }

    fn positions_cost(&self) -> f32 {
        self.inner.positions_cost() * (1.0 + self.filter.cost())
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        self.filter.get_match_info(self.inner.as_ref(), match_info);
    }

    fn has_match_info(&self) -> bool {
        self.filter.has_match_info(self.inner.as_ref())
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        self.filter.active_relation(self.inner.as_ref())
    }

    fn match_cost(&self) -> Option<f32> {
        // Without an inner split this overestimates: the positions walked
        // here would have been walked by the inner iterator anyway.
        Some(confirm_cost(self.inner.as_ref()) + self.inner.positions_cost() * self.filter.cost())
    }

    fn approximation_next_doc(&mut self) -> Result<DocId> {
        self.at_first_in_doc = false;
        self.doc_exhausted = false;
        self.inner.approximation_next_doc()
    }

    fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        self.at_first_in_doc = false;
        self.doc_exhausted = false;
        self.inner.approximation_advance(target)
    }

    fn confirm(&mut self) -> Result<bool> {
        self.at_first_in_doc = false;
        self.doc_exhausted = false;
        if !self.inner.confirm()? {
            return Ok(false);
        }
        let start = self.inner.next_start_position()?;
        if self.find_accepted(start)? == NO_MORE_POSITIONS {
            return Ok(false);
        }
        self.at_first_in_doc = true;
        Ok(true)
    }
}

/// A document-level predicate plugged into [`DocFilterSpans`].
pub trait DocFilter: Send + Debug {
    /// Whether `doc` may produce hits.
    fn accepts(&self, doc: DocId) -> bool;

    /// The first document `>= target` that [`DocFilter::accepts`], or
    /// [`NO_MORE_DOCS`].
    fn next_candidate(&self, target: DocId) -> DocId;

    /// Number of accepted documents, if known.
    fn cost(&self) -> Option<u64> {
        None
    }
}

/// A sorted set of document ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedDocSet {
    docs: Vec<DocId>,
}

impl SortedDocSet {
    /// Create a set from arbitrary ids.
    pub fn new(mut docs: Vec<DocId>) -> Self {
        docs.sort_unstable();
        docs.dedup();
        SortedDocSet { docs }
    }

    /// The ids in ascending order.
    pub fn docs(&self) -> &[DocId] {
        &self.docs
    }
}

impl DocFilter for SortedDocSet {
    fn accepts(&self, doc: DocId) -> bool {
        self.docs.binary_search(&doc).is_ok()
    }

    fn next_candidate(&self, target: DocId) -> DocId {
        let index = self.docs.partition_point(|&doc| doc < target);
        self.docs.get(index).copied().unwrap_or(NO_MORE_DOCS)
    }

    fn cost(&self) -> Option<u64> {
        Some(self.docs.len() as u64)
    }
}

/// Hits of an inner iterator restricted to documents passing a [`DocFilter`].
#[derive(Debug)]
pub struct DocFilterSpans<D: DocFilter> {
    inner: Box<dyn PositionIterator>,
    filter: D,
}

impl<D: DocFilter> DocFilterSpans<D> {
    /// Wrap `inner` with `filter`.
    pub fn new(inner: Box<dyn PositionIterator>, filter: D) -> Self {
        DocFilterSpans { inner, filter }
    }

    fn skip_rejected(&mut self, mut doc: DocId) -> Result<DocId> {
        while doc != NO_MORE_DOCS && !self.filter.accepts(doc) {
            let candidate = self.filter.next_candidate(doc + 1);
            if candidate == NO_MORE_DOCS {
                return self.inner.approximation_advance(NO_MORE_DOCS);
            }
            doc = self.inner.approximation_advance(candidate)?;
        }
        Ok(doc)
    }
}

impl<D: DocFilter> PositionIterator for DocFilterSpans<D> {
    fn doc_id(&self) -> DocId {
        self.inner.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let doc = self.approximation_next_doc()?;
        confirmed_doc(self, doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let doc = self.approximation_advance(target)?;
        confirmed_doc(self, doc)
    }

    fn next_start_position(&mut self) -> Result<Position> {
        self.inner.next_start_position()
    }

    fn advance_start_position(&mut self, target: Position) -> Result<Position> {
        self.inner.advance_start_position(target)
    }

    fn start_position(&self) -> Position {
        self.inner.start_position()
    }

    fn end_position(&self) -> Position {
        self.inner.end_position()
    }

    fn cost(&self) -> u64 {
        match self.filter.cost() {
            Some(cost) => cost.min(self.inner.cost()),
            None => self.inner.cost(),
        }
    }

    fn positions_cost(&self) -> f32 {
        self.inner.positions_cost()
    }

    fn guarantees(&self) -> &Guarantees {
        self.inner.guarantees()
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        self.inner.get_match_info(match_info);
    }

    fn has_match_info(&self) -> bool {
        self.inner.has_match_info()
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        self.inner.active_relation()
    }

    fn payload(&self) -> Option<&[u8]> {
        self.inner.payload()
    }

    fn match_cost(&self) -> Option<f32> {
        Some(confirm_cost(self.inner.as_ref()))
    }

    fn approximation_next_doc(&mut self) -> Result<DocId> {
        let doc = self.inner.approximation_next_doc()?;
        self.skip_rejected(doc)
    }

    fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        let candidate = self.filter.next_candidate(target);
        let doc = self.inner.approximation_advance(candidate)?;
        self.skip_rejected(doc)
    }

    fn confirm(&mut self) -> Result<bool> {
        self.inner.confirm()
    }
}
