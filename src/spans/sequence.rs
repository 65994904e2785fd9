//! Sequence (concatenation) of two clauses: a left hit `(s, m)` followed by
//! a right hit `(m, e)` gives a hit `(s, e)`.
//!
//! [`SequenceSimpleSpans`] is a two-pointer merge for a left clause with
//! unique, sorted ends and a right clause with unique, sorted starts.
//! [`SequenceRawSpans`] accepts any clauses: it sorts them when needed and
//! gathers all right hits per start point, so every left hit is combined
//! with every right hit starting at its end.

use log::debug;

use crate::config::EngineConfig;
use crate::error::{Result, SpanlabError};
use crate::spans::buckets::{BucketGrouping, SpansInBuckets};
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{
    align_approximations, confirm_cost, confirmed_doc, DocId, Position, PositionIterator,
    NOT_STARTED, NO_MORE_DOCS, NO_MORE_POSITIONS,
};
use crate::spans::relation_info::RelationInfo;
use crate::spans::sorted::PerDocumentSortedSpans;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HitState {
    Unconfirmed,
    Staged,
    OnHit,
    Exhausted,
}

/// Sequence of a left clause that is end-sorted with unique ends and a
/// right clause that is start-sorted with unique starts.
#[derive(Debug)]
pub struct SequenceSimpleSpans {
    /// Left and right clause.
    clauses: [Box<dyn PositionIterator>; 2],
    left_start: Position,
    guarantees: Guarantees,
    doc: DocId,
    state: HitState,
}

impl SequenceSimpleSpans {
    /// Concatenate `left` and `right`.
    pub fn new(left: Box<dyn PositionIterator>, right: Box<dyn PositionIterator>) -> Result<Self> {
        let (l, r) = (left.guarantees(), right.guarantees());
        if !(l.end_sorted && l.unique_end) {
            return Err(SpanlabError::invalid_argument(
                "simple sequence requires an end-sorted left clause with unique ends",
            ));
        }
        if !(r.start_sorted && r.unique_start) {
            return Err(SpanlabError::invalid_argument(
                "simple sequence requires a start-sorted right clause with unique starts",
            ));
        }
        let guarantees = Guarantees::sequence(&[*l, *r]);
        Ok(SequenceSimpleSpans {
            clauses: [left, right],
            left_start: NOT_STARTED,
            guarantees,
            doc: NOT_STARTED,
            state: HitState::Unconfirmed,
        })
    }

    /// Advance whichever side lags until the left end meets a right start.
    fn realign(&mut self) -> Result<Position> {
        let [left, right] = &mut self.clauses;
        let mut left_end = left.end_position();
        let mut right_start = right.start_position();
        while left_end != right_start {
            if right_start < left_end {
                right_start = right.advance_start_position(left_end)?;
                if right_start == NO_MORE_POSITIONS {
                    self.left_start = NO_MORE_POSITIONS;
                    break;
                }
            } else {
                self.left_start = left.next_start_position()?;
                if self.left_start == NO_MORE_POSITIONS {
                    break;
                }
                left_end = left.end_position();
            }
        }
        Ok(self.left_start)
    }

    fn align(&mut self, target: DocId) -> Result<DocId> {
        self.state = HitState::Unconfirmed;
        self.left_start = NOT_STARTED;
        self.doc = align_approximations(&mut self.clauses, target)?;
        Ok(self.doc)
    }
}

impl PositionIterator for SequenceSimpleSpans {
    fn doc_id(&self) -> DocId {
        self.doc
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
        match self.state {
            HitState::Staged => {
                self.state = HitState::OnHit;
                return Ok(self.left_start);
            }
            HitState::Unconfirmed | HitState::Exhausted => return Ok(NO_MORE_POSITIONS),
            HitState::OnHit => {}
        }
        self.left_start = self.clauses[0].next_start_position()?;
        if self.left_start != NO_MORE_POSITIONS {
            self.realign()?;
        }
        if self.left_start == NO_MORE_POSITIONS {
            self.state = HitState::Exhausted;
        }
        Ok(self.left_start)
    }

    fn start_position(&self) -> Position {
        match self.state {
            HitState::Unconfirmed | HitState::Staged => NOT_STARTED,
            HitState::OnHit => self.left_start,
            HitState::Exhausted => NO_MORE_POSITIONS,
        }
    }

    fn end_position(&self) -> Position {
        match self.state {
            HitState::Unconfirmed | HitState::Staged => NOT_STARTED,
            HitState::OnHit => self.clauses[1].end_position(),
            HitState::Exhausted => NO_MORE_POSITIONS,
        }
    }

    fn cost(&self) -> u64 {
        self.clauses[0].cost().min(self.clauses[1].cost())
    }

    fn positions_cost(&self) -> f32 {
        self.clauses[0].positions_cost() + self.clauses[1].positions_cost()
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        for clause in &self.clauses {
            clause.get_match_info(match_info);
        }
    }

    fn has_match_info(&self) -> bool {
        self.clauses.iter().any(|clause| clause.has_match_info())
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        self.clauses.iter().find_map(|clause| clause.active_relation())
    }

    fn match_cost(&self) -> Option<f32> {
        Some(self.clauses.iter().map(|clause| confirm_cost(clause.as_ref())).sum())
    }

    fn approximation_next_doc(&mut self) -> Result<DocId> {
        match self.doc {
            NO_MORE_DOCS => Ok(NO_MORE_DOCS),
            NOT_STARTED => self.align(0),
            doc => self.align(doc + 1),
        }
    }

    fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        self.align(target)
    }

    fn confirm(&mut self) -> Result<bool> {
        for clause in self.clauses.iter_mut() {
            if !clause.confirm()? {
                return Ok(false);
            }
        }
        self.left_start = self.clauses[0].next_start_position()?;
        if self.left_start != NO_MORE_POSITIONS {
            self.realign()?;
        }
        if self.left_start == NO_MORE_POSITIONS {
            self.state = HitState::Exhausted;
            return Ok(false);
        }
        self.state = HitState::Staged;
        Ok(true)
    }
}

/// Sequence of any two clauses, returning a hit for every midpoint.
#[derive(Debug)]
pub struct SequenceRawSpans {
    /// End-sorted left clause.
    left: Box<dyn PositionIterator>,
    /// Right clause hits grouped per start point.
    right: SpansInBuckets,
    /// Whether `right` holds a bucket for the current document.
    has_bucket: bool,
    index_in_bucket: usize,
    left_start: Position,
    guarantees: Guarantees,
    doc: DocId,
    state: HitState,
}

impl SequenceRawSpans {
    /// Concatenate `left` and `right`, sorting the left clause by end and
    /// the right clause by start if they aren't already.
    pub fn new(
        left: Box<dyn PositionIterator>,
        right: Box<dyn PositionIterator>,
        num_infos: usize,
        config: &EngineConfig,
    ) -> Self {
        let left: Box<dyn PositionIterator> = if left.guarantees().end_sorted {
            left
        } else {
            debug!("sequence: sorting left clause by end point");
            Box::new(PerDocumentSortedSpans::new(left, true, false, num_infos, config))
        };
        let right: Box<dyn PositionIterator> = if right.guarantees().start_sorted {
            right
        } else {
            debug!("sequence: sorting right clause by start point");
            Box::new(PerDocumentSortedSpans::new(right, false, false, num_infos, config))
        };

        let mut guarantees = Guarantees::sequence(&[*left.guarantees(), *right.guarantees()]);
        if !left.guarantees().hits_are_unique() {
            // Duplicate left hits repeat the whole run of right ends.
            guarantees.start_sorted = false;
            guarantees.end_sorted = false;
        }
        SequenceRawSpans {
            left,
            right: SpansInBuckets::new(right, BucketGrouping::PerStartPoint, None, num_infos, config),
            has_bucket: false,
            index_in_bucket: 0,
            left_start: NOT_STARTED,
            guarantees,
            doc: NOT_STARTED,
            state: HitState::Unconfirmed,
        }
    }

    /// With the left clause on a hit, find the first left hit whose end has
    /// a bucket of right hits starting there. Returns `false` if the
    /// document has no more hits.
    fn realign(&mut self) -> Result<bool> {
        loop {
            let left_end = self.left.end_position();
            if !self.has_bucket || self.right.start(0) < left_end {
                if !self.right.advance_bucket(left_end)? {
                    self.has_bucket = false;
                    return Ok(false);
                }
                self.has_bucket = true;
            }
            let right_start = self.right.start(0);
            if right_start == left_end {
                self.index_in_bucket = 0;
                return Ok(true);
            }
            while self.left.end_position() < right_start {
                self.left_start = self.left.next_start_position()?;
                if self.left_start == NO_MORE_POSITIONS {
                    return Ok(false);
                }
            }
        }
    }

    /// Move to the next left hit and realign.
    fn next_left(&mut self) -> Result<bool> {
        self.left_start = self.left.next_start_position()?;
        if self.left_start == NO_MORE_POSITIONS {
            return Ok(false);
        }
        self.realign()
    }

    fn align(&mut self, target: DocId) -> Result<DocId> {
        self.state = HitState::Unconfirmed;
        self.has_bucket = false;
        self.left_start = NOT_STARTED;
        let mut doc = target;
        loop {
            doc = match self.left.doc_id() {
                left_doc if left_doc < doc => self.left.approximation_advance(doc)?,
                left_doc => left_doc,
            };
            if doc == NO_MORE_DOCS {
                break;
            }
            let mut right_doc = self.right.doc_id();
            if right_doc < doc {
                right_doc = self.right.approximation_advance(doc)?;
            }
            if right_doc == doc || right_doc == NO_MORE_DOCS {
                doc = right_doc;
                break;
            }
            doc = right_doc;
        }
        self.doc = doc;
        Ok(doc)
    }
}

impl PositionIterator for SequenceRawSpans {
    fn doc_id(&self) -> DocId {
        self.doc
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
        match self.state {
            HitState::Staged => self.state = HitState::OnHit,
            HitState::Unconfirmed | HitState::Exhausted => return Ok(NO_MORE_POSITIONS),
            HitState::OnHit => {
                if self.index_in_bucket + 1 < self.right.bucket_size() {
                    self.index_in_bucket += 1;
                } else if !self.next_left()? {
                    self.state = HitState::Exhausted;
                }
            }
        }
        Ok(self.start_position())
    }

    fn start_position(&self) -> Position {
        match self.state {
            HitState::Unconfirmed | HitState::Staged => NOT_STARTED,
            HitState::OnHit => self.left_start,
            HitState::Exhausted => NO_MORE_POSITIONS,
        }
    }

    fn end_position(&self) -> Position {
        match self.state {
            HitState::Unconfirmed | HitState::Staged => NOT_STARTED,
            HitState::OnHit => self.right.end(self.index_in_bucket),
            HitState::Exhausted => NO_MORE_POSITIONS,
        }
    }

    fn cost(&self) -> u64 {
        self.left.cost().min(self.right.cost())
    }

    fn positions_cost(&self) -> f32 {
        self.left.positions_cost() + self.right.positions_cost()
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        if self.state == HitState::OnHit {
            self.left.get_match_info(match_info);
            self.right.bucket().fill_match_info(self.index_in_bucket, match_info);
        }
    }

    fn has_match_info(&self) -> bool {
        self.left.has_match_info() || self.right.has_match_info()
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        if self.state != HitState::OnHit {
            return None;
        }
        self.left
            .active_relation()
            .or_else(|| self.right.bucket().relation(self.index_in_bucket))
    }

    fn match_cost(&self) -> Option<f32> {
        let right = self.right.match_cost().unwrap_or_else(|| self.right.positions_cost());
        Some(confirm_cost(self.left.as_ref()) + right)
    }

    fn approximation_next_doc(&mut self) -> Result<DocId> {
        match self.doc {
            NO_MORE_DOCS => Ok(NO_MORE_DOCS),
            NOT_STARTED => self.align(0),
            doc => self.align(doc + 1),
        }
    }

    fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        self.align(target)
    }

    fn confirm(&mut self) -> Result<bool> {
        if !self.left.confirm()? || !self.right.confirm()? {
            return Ok(false);
        }
        let found = self.next_left()?;
        self.state = if found { HitState::Staged } else { HitState::Exhausted };
        Ok(found)
    }
}
