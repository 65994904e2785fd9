//! Sorting and deduplicating wrappers.
//!
//! These are the normalising wrappers inserted at rewrite time when an
//! operator needs sorted or unique input that its clause doesn't guarantee.
//! [`PerDocumentSortedSpans`] gathers each document into a bucket;
//! [`UniqueSpans`] streams over start-sorted input.

use crate::config::EngineConfig;
use crate::error::{Result, SpanlabError};
use crate::spans::buckets::{BucketGrouping, BucketOrder, SpansInBuckets};
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{
    DocId, Position, PositionIterator, NOT_STARTED, NO_MORE_DOCS, NO_MORE_POSITIONS,
};
use crate::spans::relation_info::RelationInfo;

/// Match info values already returned for the current `(start, end)`.
#[derive(Debug, Default)]
struct SeenAtPosition {
    start: Position,
    end: Position,
    infos: Vec<Vec<Option<MatchInfo>>>,
}

impl SeenAtPosition {
    fn reset(&mut self) {
        self.start = NOT_STARTED;
        self.end = NOT_STARTED;
        self.infos.clear();
    }

    /// Record a hit; returns `false` if an identical hit was seen already.
    fn insert(&mut self, start: Position, end: Position, infos: &[Option<MatchInfo>]) -> bool {
        if (start, end) != (self.start, self.end) {
            self.start = start;
            self.end = end;
            self.infos.clear();
        } else if self.infos.iter().any(|seen| seen.as_slice() == infos) {
            return false;
        }
        self.infos.push(infos.to_vec());
        true
    }
}

/// Hits of a source sorted per document, optionally without duplicates.
#[derive(Debug)]
pub struct PerDocumentSortedSpans {
    bucket: SpansInBuckets,
    guarantees: Guarantees,
    dedup: bool,
    /// Index in the bucket; `None` before the first hit.
    index: Option<usize>,
    seen: SeenAtPosition,
}

impl PerDocumentSortedSpans {
    /// Sort `source` by start (or by end when `by_end`), removing hits
    /// identical in start, end and match info when `dedup` is set.
    pub fn new(
        source: Box<dyn PositionIterator>,
        by_end: bool,
        dedup: bool,
        num_infos: usize,
        config: &EngineConfig,
    ) -> Self {
        let guarantees = Guarantees::sorted(source.guarantees(), by_end, dedup);
        let order = if by_end { BucketOrder::End } else { BucketOrder::Start };
        PerDocumentSortedSpans {
            bucket: SpansInBuckets::new(source, BucketGrouping::PerDocument, Some(order), num_infos, config),
            guarantees,
            dedup,
            index: None,
            seen: SeenAtPosition::default(),
        }
    }

    fn reset_doc(&mut self) {
        self.index = None;
        self.seen.reset();
    }

    fn is_at_hit(&self) -> Option<usize> {
        self.index.filter(|&i| i < self.bucket.bucket_size())
    }
}

impl PositionIterator for PerDocumentSortedSpans {
    fn doc_id(&self) -> DocId {
        self.bucket.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.reset_doc();
        let doc = self.bucket.next_doc()?;
        if doc != NO_MORE_DOCS {
            self.bucket.next_bucket()?;
        }
        Ok(doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.reset_doc();
        let doc = self.bucket.advance(target)?;
        if doc != NO_MORE_DOCS {
            self.bucket.next_bucket()?;
        }
        Ok(doc)
    }

    fn next_start_position(&mut self) -> Result<Position> {
        let size = self.bucket.bucket_size();
        let mut next = self.index.map(|i| i + 1).unwrap_or(0);
        if self.dedup {
            let bucket = self.bucket.bucket();
            while next < size && !self.seen.insert(bucket.start(next), bucket.end(next), bucket.match_info(next)) {
                next += 1;
            }
        }
        self.index = Some(next.min(size));
        Ok(self.start_position())
    }

    fn start_position(&self) -> Position {
        match (self.index, self.is_at_hit()) {
            (None, _) => NOT_STARTED,
            (Some(_), Some(i)) => self.bucket.start(i),
            (Some(_), None) => NO_MORE_POSITIONS,
        }
    }

    fn end_position(&self) -> Position {
        match (self.index, self.is_at_hit()) {
            (None, _) => NOT_STARTED,
            (Some(_), Some(i)) => self.bucket.end(i),
            (Some(_), None) => NO_MORE_POSITIONS,
        }
    }

    fn cost(&self) -> u64 {
        self.bucket.cost()
    }

    fn positions_cost(&self) -> f32 {
        self.bucket.positions_cost()
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        if let Some(i) = self.is_at_hit() {
            self.bucket.bucket().fill_match_info(i, match_info);
        }
    }

    fn has_match_info(&self) -> bool {
        self.bucket.has_match_info()
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        self.is_at_hit().and_then(|i| self.bucket.bucket().relation(i))
    }

    fn match_cost(&self) -> Option<f32> {
        self.bucket.match_cost()
    }

    fn approximation_next_doc(&mut self) -> Result<DocId> {
        self.reset_doc();
        self.bucket.approximation_next_doc()
    }

    fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        self.reset_doc();
        self.bucket.approximation_advance(target)
    }

    fn confirm(&mut self) -> Result<bool> {
        Ok(self.bucket.confirm()? && self.bucket.next_bucket()?)
    }
}

/// Start-sorted hits without duplicates.
///
/// Removes hits identical in start, end and match info to a hit already
/// returned. Since the input is start-sorted, identical hits are always
/// within the same run of equal `(start, end)`.
#[derive(Debug)]
pub struct UniqueSpans {
    source: Box<dyn PositionIterator>,
    guarantees: Guarantees,
    seen: SeenAtPosition,
    scratch: Vec<Option<MatchInfo>>,
}

impl UniqueSpans {
    /// Deduplicate `source`, which must be start-sorted.
    pub fn new(source: Box<dyn PositionIterator>, num_infos: usize) -> Result<Self> {
        if !source.guarantees().start_sorted {
            return Err(SpanlabError::invalid_argument(
                "unique spans require start-sorted input",
            ));
        }
        let guarantees = Guarantees::unique(source.guarantees());
        let num_infos = if source.has_match_info() { num_infos } else { 0 };
        Ok(UniqueSpans {
            source,
            guarantees,
            seen: SeenAtPosition::default(),
            scratch: vec![None; num_infos],
        })
    }

    fn is_new(&mut self) -> bool {
        self.scratch.iter_mut().for_each(|slot| *slot = None);
        self.source.get_match_info(&mut self.scratch);
        self.seen.insert(
            self.source.start_position(),
            self.source.end_position(),
            &self.scratch,
        )
    }
}

impl PositionIterator for UniqueSpans {
    fn doc_id(&self) -> DocId {
        self.source.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.seen.reset();
        self.source.next_doc()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.seen.reset();
        self.source.advance(target)
    }

    fn next_start_position(&mut self) -> Result<Position> {
        loop {
            let start = self.source.next_start_position()?;
            if start == NO_MORE_POSITIONS || self.is_new() {
                return Ok(start);
            }
        }
    }

    fn advance_start_position(&mut self, target: Position) -> Result<Position> {
        let start = self.source.advance_start_position(target)?;
        if start == NO_MORE_POSITIONS || self.is_new() {
            return Ok(start);
        }
        self.next_start_position()
    }

    fn start_position(&self) -> Position {
        self.source.start_position()
    }

    fn end_position(&self) -> Position {
        self.source.end_position()
    }

    fn cost(&self) -> u64 {
        self.source.cost()
    }

    fn positions_cost(&self) -> f32 {
        self.source.positions_cost()
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        self.source.get_match_info(match_info);
    }

    fn has_match_info(&self) -> bool {
        self.source.has_match_info()
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        self.source.active_relation()
    }

    fn match_cost(&self) -> Option<f32> {
        self.source.match_cost()
    }

    fn approximation_next_doc(&mut self) -> Result<DocId> {
        self.seen.reset();
        self.source.approximation_next_doc()
    }

    fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        self.seen.reset();
        self.source.approximation_advance(target)
    }

    fn confirm(&mut self) -> Result<bool> {
        self.source.confirm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::list::{drain_hits, ListSpans};

    #[test]
    fn test_sort_per_document() {
        let source = ListSpans::from_triples(&[(0, 5, 6), (0, 1, 4), (0, 1, 2), (2, 3, 4), (2, 0, 9)]);
        let mut spans = PerDocumentSortedSpans::new(Box::new(source), false, false, 0, &EngineConfig::default());
        assert!(spans.guarantees().start_sorted);
        assert_eq!(
            drain_hits(&mut spans).unwrap(),
            vec![(0, 1, 2), (0, 1, 4), (0, 5, 6), (2, 0, 9), (2, 3, 4)]
        );
    }

    #[test]
    fn test_sort_by_end_with_dedup() {
        let source = ListSpans::from_triples(&[(0, 3, 5), (0, 1, 5), (0, 3, 5), (0, 2, 4)]);
        let mut spans = PerDocumentSortedSpans::new(Box::new(source), true, true, 0, &EngineConfig::default());
        assert!(spans.guarantees().end_sorted);
        assert!(spans.guarantees().unique_with_match_info);
        assert!(!spans.guarantees().unique);
        assert_eq!(
            drain_hits(&mut spans).unwrap(),
            vec![(0, 2, 4), (0, 1, 5), (0, 3, 5)]
        );
    }

    #[test]
    fn test_dedup_keeps_distinct_match_info() {
        let source = ListSpans::from_triples(&[(0, 1, 3), (0, 1, 3), (0, 1, 3)]).with_match_info(
            0,
            vec![
                Some(MatchInfo::span(1, 2)),
                Some(MatchInfo::span(2, 3)),
                Some(MatchInfo::span(1, 2)),
            ],
        );
        let mut spans = PerDocumentSortedSpans::new(Box::new(source), false, true, 1, &EngineConfig::default());
        spans.next_doc().unwrap();

        let mut captured = Vec::new();
        while spans.next_start_position().unwrap() != NO_MORE_POSITIONS {
            let mut match_info = vec![None];
            spans.get_match_info(&mut match_info);
            captured.push(match_info[0].clone());
        }
        assert_eq!(
            captured,
            vec![Some(MatchInfo::span(1, 2)), Some(MatchInfo::span(2, 3))]
        );
    }

    #[test]
    fn test_unique_removes_adjacent_duplicates() {
        let source = ListSpans::from_triples(&[(0, 1, 2), (0, 1, 2), (0, 1, 3), (1, 0, 1), (1, 0, 1)]);
        let mut spans = UniqueSpans::new(Box::new(source), 0).unwrap();
        assert_eq!(
            drain_hits(&mut spans).unwrap(),
            vec![(0, 1, 2), (0, 1, 3), (1, 0, 1)]
        );
    }

    #[test]
    fn test_unique_compares_match_info() {
        let source = ListSpans::from_triples(&[(0, 1, 2), (0, 1, 2), (0, 1, 2)]).with_match_info(
            0,
            vec![
                Some(MatchInfo::span(1, 2)),
                Some(MatchInfo::span(1, 2)),
                Some(MatchInfo::span(1, 1)),
            ],
        );
        let mut spans = UniqueSpans::new(Box::new(source), 1).unwrap();
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![(0, 1, 2), (0, 1, 2)]);
    }

    #[test]
    fn test_unique_requires_sorted_input() {
        let source = ListSpans::from_triples(&[(0, 4, 5), (0, 1, 2)]);
        assert!(matches!(
            UniqueSpans::new(Box::new(source), 0),
            Err(SpanlabError::InvalidArgument(_))
        ));
    }
}
