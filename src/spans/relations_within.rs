//! Capture all relations inside each hit as a relation list.
//!
//! For every clause hit, the relations whose full span (from the first to
//! the last position of source and target) lies inside the hit are stored as
//! a [`MatchInfo::RelationList`]. Instead of the hit itself, the bounds can
//! come from a captured span.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::spans::buckets::{BucketGrouping, BucketOrder, SpansInBuckets};
use crate::spans::filter::{AcceptStatus, FilteredSpans, HitFilter};
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{
    match_info_slot, DocId, Position, PositionIterator, NOT_STARTED, NO_MORE_DOCS,
};
use crate::spans::relation_info::RelationInfo;

/// Clause hits with the relations inside them captured.
pub type RelationsWithinSpans = FilteredSpans<RelationsWithin>;

/// Collects the relations inside the current hit; accepts every hit.
#[derive(Debug)]
pub struct RelationsWithin {
    relations: SpansInBuckets,
    capture: usize,
    /// Match info slot whose span bounds the relations instead of the hit.
    within: Option<usize>,
    scratch: Vec<Option<MatchInfo>>,
    loaded_doc: DocId,
    current: Vec<RelationInfo>,
}

impl RelationsWithin {
    /// Load the relations of `doc`. Returns `false` if it has none.
    fn sync(&mut self, doc: DocId) -> Result<bool> {
        if self.loaded_doc == doc {
            return Ok(self.relations.bucket_size() > 0);
        }
        let mut relations_doc = self.relations.doc_id();
        if relations_doc != NO_MORE_DOCS && relations_doc < doc {
            relations_doc = self.relations.advance(doc)?;
        }
        self.loaded_doc = doc;
        if relations_doc == doc {
            self.relations.next_bucket()
        } else {
            Ok(false)
        }
    }

    fn bounds(&mut self, inner: &dyn PositionIterator) -> Option<(Position, Position)> {
        match self.within {
            None => Some((inner.start_position(), inner.end_position())),
            Some(index) => {
                self.scratch.iter_mut().for_each(|slot| *slot = None);
                inner.get_match_info(&mut self.scratch);
                self.scratch
                    .get(index)
                    .and_then(|info| info.as_ref())
                    .map(|info| (info.span_start(), info.span_end()))
            }
        }
    }
}

impl HitFilter for RelationsWithin {
    fn accept(&mut self, inner: &mut dyn PositionIterator) -> Result<AcceptStatus> {
        self.current.clear();
        let Some((start, end)) = self.bounds(inner) else {
            return Ok(AcceptStatus::Yes);
        };
        if !self.sync(inner.doc_id())? {
            return Ok(AcceptStatus::Yes);
        }
        let bucket = self.relations.bucket();
        // The bucket is sorted by full span start.
        for i in 0..bucket.len() {
            let relation_start = bucket.start(i);
            if relation_start > end {
                break;
            }
            if relation_start >= start && bucket.end(i) <= end {
                if let Some(relation) = bucket.relation(i) {
                    self.current.push(relation);
                }
            }
        }
        Ok(AcceptStatus::Yes)
    }

    fn get_match_info(&self, inner: &dyn PositionIterator, match_info: &mut [Option<MatchInfo>]) {
        inner.get_match_info(match_info);
        if let Some(slot) = match_info_slot(match_info, self.capture) {
            *slot = Some(MatchInfo::RelationList(self.current.clone()));
        }
    }

    fn has_match_info(&self, _inner: &dyn PositionIterator) -> bool {
        true
    }
}

impl RelationsWithinSpans {
    /// Capture the `relations` (full-span relation hits) inside each hit of
    /// `clause` into slot `capture`. With `within`, the span captured in that
    /// slot bounds the relations instead of the hit.
    pub fn relations_within(
        clause: Box<dyn PositionIterator>,
        relations: Box<dyn PositionIterator>,
        capture: usize,
        within: Option<usize>,
        num_infos: usize,
        config: &EngineConfig,
    ) -> Self {
        let guarantees = *clause.guarantees();
        let filter = RelationsWithin {
            relations: SpansInBuckets::new(
                relations,
                BucketGrouping::PerDocument,
                Some(BucketOrder::Start),
                0,
                config,
            ),
            capture,
            within,
            scratch: vec![None; num_infos],
            loaded_doc: NOT_STARTED,
            current: Vec::new(),
        };
        FilteredSpans::new(clause, filter, guarantees)
    }
}
