//! Grouping hits into random-access buckets.
//!
//! [`SpansInBuckets`] gathers the hits of a source iterator into a
//! [`HitBucket`]: all hits of a document, all hits sharing a start point,
//! runs of consecutive hits, or hits with identical start and end. Buckets
//! never span a document boundary and are rebuilt whenever the consumer
//! moves past them.
//!
//! A bucket may be ordered by start or by end (ties broken by start); the
//! order is kept as a permutation so the gathered arrays are never moved.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{DocId, Position, PositionIterator, NO_MORE_DOCS, NO_MORE_POSITIONS};
use crate::spans::relation_info::RelationInfo;

/// Which hits end up in the same bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketGrouping {
    /// All hits of the document.
    PerDocument,
    /// All hits sharing a start position.
    PerStartPoint,
    /// Runs of hits where each hit starts where the previous one ended.
    Consecutive,
    /// All hits with the same start and end.
    SameStartEnd,
}

/// Order of hits within a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOrder {
    /// By start, then end.
    Start,
    /// By end, then start.
    End,
}

/// The hits of one bucket as parallel arrays.
#[derive(Debug, Default)]
pub struct HitBucket {
    starts: Vec<Position>,
    ends: Vec<Position>,
    /// `len() * num_infos` match info values, row per hit.
    infos: Vec<Option<MatchInfo>>,
    relations: Vec<Option<RelationInfo>>,
    /// Sorted permutation of hit indexes; empty when unordered.
    order: Vec<usize>,
    num_infos: usize,
}

impl HitBucket {
    fn with_capacity(capacity: usize, num_infos: usize) -> Self {
        HitBucket {
            starts: Vec::with_capacity(capacity),
            ends: Vec::with_capacity(capacity),
            infos: Vec::with_capacity(capacity * num_infos),
            relations: Vec::with_capacity(capacity),
            order: Vec::new(),
            num_infos,
        }
    }

    /// Number of hits.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Whether the bucket holds no hits.
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    fn raw(&self, index: usize) -> usize {
        if self.order.is_empty() {
            index
        } else {
            self.order[index]
        }
    }

    /// Start of hit `index`.
    pub fn start(&self, index: usize) -> Position {
        self.starts[self.raw(index)]
    }

    /// End of hit `index`.
    pub fn end(&self, index: usize) -> Position {
        self.ends[self.raw(index)]
    }

    /// Match info captured for hit `index`, one value per slot.
    pub fn match_info(&self, index: usize) -> &[Option<MatchInfo>] {
        let row = self.raw(index) * self.num_infos;
        &self.infos[row..row + self.num_infos]
    }

    /// Copy the captured values of hit `index` into `match_info`, leaving
    /// slots the hit didn't capture untouched.
    pub fn fill_match_info(&self, index: usize, match_info: &mut [Option<MatchInfo>]) {
        for (slot, value) in match_info.iter_mut().zip(self.match_info(index)) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
    }

    /// Relation that produced hit `index`, if any.
    pub fn relation(&self, index: usize) -> Option<RelationInfo> {
        self.relations[self.raw(index)]
    }

    fn push(&mut self, source: &dyn PositionIterator, scratch: &mut [Option<MatchInfo>]) {
        self.starts.push(source.start_position());
        self.ends.push(source.end_position());
        self.relations.push(source.active_relation());
        if self.num_infos > 0 {
            scratch.iter_mut().for_each(|slot| *slot = None);
            source.get_match_info(scratch);
            self.infos.extend(scratch.iter().cloned());
        }
    }

    fn sort(&mut self, order: BucketOrder) {
        self.order.clear();
        self.order.extend(0..self.starts.len());
        let (starts, ends) = (&self.starts, &self.ends);
        match order {
            BucketOrder::Start => self.order.sort_by_key(|&i| (starts[i], ends[i])),
            BucketOrder::End => self.order.sort_by_key(|&i| (ends[i], starts[i])),
        }
    }

    fn reset(&mut self, initial_capacity: usize, realloc_threshold: usize) {
        if self.starts.capacity() > realloc_threshold {
            // Don't keep the memory of one huge bucket around.
            *self = HitBucket::with_capacity(initial_capacity, self.num_infos);
        } else {
            self.starts.clear();
            self.ends.clear();
            self.infos.clear();
            self.relations.clear();
            self.order.clear();
        }
    }
}

/// Hits of a source iterator, grouped into buckets.
#[derive(Debug)]
pub struct SpansInBuckets {
    source: Box<dyn PositionIterator>,
    grouping: BucketGrouping,
    order: Option<BucketOrder>,
    bucket: HitBucket,
    scratch: Vec<Option<MatchInfo>>,
    initial_capacity: usize,
    realloc_threshold: usize,
}

impl SpansInBuckets {
    /// Group `source` by `grouping`, optionally ordering each bucket.
    /// `num_infos` is the number of match info slots to capture per hit
    /// (0 if the source fills none).
    pub fn new(
        source: Box<dyn PositionIterator>,
        grouping: BucketGrouping,
        order: Option<BucketOrder>,
        num_infos: usize,
        config: &EngineConfig,
    ) -> Self {
        let num_infos = if source.has_match_info() { num_infos } else { 0 };
        SpansInBuckets {
            source,
            grouping,
            order,
            bucket: HitBucket::with_capacity(config.bucket_initial_capacity, num_infos),
            scratch: vec![None; num_infos],
            initial_capacity: config.bucket_initial_capacity,
            realloc_threshold: config.bucket_realloc_threshold,
        }
    }

    /// The current bucket.
    pub fn bucket(&self) -> &HitBucket {
        &self.bucket
    }

    /// Number of hits in the current bucket.
    pub fn bucket_size(&self) -> usize {
        self.bucket.len()
    }

    /// Start of hit `index` of the current bucket.
    pub fn start(&self, index: usize) -> Position {
        self.bucket.start(index)
    }

    /// End of hit `index` of the current bucket.
    pub fn end(&self, index: usize) -> Position {
        self.bucket.end(index)
    }

    /// Guarantees of the source hits.
    pub fn source_guarantees(&self) -> &Guarantees {
        self.source.guarantees()
    }

    /// Whether the source fills any match info.
    pub fn has_match_info(&self) -> bool {
        self.source.has_match_info()
    }

    /// Current document.
    pub fn doc_id(&self) -> DocId {
        self.source.doc_id()
    }

    /// Move to the next document and position the source on its first hit.
    pub fn next_doc(&mut self) -> Result<DocId> {
        let doc = self.approximation_next_doc()?;
        self.confirmed_doc(doc)
    }

    /// Move to the first document `>= target`.
    pub fn advance(&mut self, target: DocId) -> Result<DocId> {
        let doc = self.approximation_advance(target)?;
        self.confirmed_doc(doc)
    }

    fn confirmed_doc(&mut self, mut doc: DocId) -> Result<DocId> {
        while doc != NO_MORE_DOCS {
            if self.confirm()? {
                return Ok(doc);
            }
            doc = self.approximation_next_doc()?;
        }
        Ok(NO_MORE_DOCS)
    }

    /// Gather the next bucket of the current document. Returns `false`
    /// when the document has no more hits.
    pub fn next_bucket(&mut self) -> Result<bool> {
        self.bucket.reset(self.initial_capacity, self.realloc_threshold);
        let first_start = self.source.start_position();
        if first_start == NO_MORE_POSITIONS || self.source.doc_id() == NO_MORE_DOCS {
            return Ok(false);
        }
        let first_end = self.source.end_position();
        loop {
            let last_end = self.source.end_position();
            self.bucket.push(self.source.as_ref(), &mut self.scratch);
            let start = self.source.next_start_position()?;
            if start == NO_MORE_POSITIONS {
                break;
            }
            let same_bucket = match self.grouping {
                BucketGrouping::PerDocument => true,
                BucketGrouping::PerStartPoint => start == first_start,
                BucketGrouping::Consecutive => start == last_end,
                BucketGrouping::SameStartEnd => {
                    start == first_start && self.source.end_position() == first_end
                }
            };
            if !same_bucket {
                break;
            }
        }
        if let Some(order) = self.order {
            self.bucket.sort(order);
        }
        Ok(true)
    }

    /// Gather the first bucket starting at or after `target`. Returns
    /// `false` when there is none in the current document.
    pub fn advance_bucket(&mut self, target: Position) -> Result<bool> {
        let start = self.source.start_position();
        if start != NO_MORE_POSITIONS && start < target {
            self.source.advance_start_position(target)?;
        }
        self.next_bucket()
    }

    /// Upper bound of the number of documents.
    pub fn cost(&self) -> u64 {
        self.source.cost()
    }

    /// Cost of gathering all buckets of one document.
    pub fn positions_cost(&self) -> f32 {
        self.source.positions_cost()
    }

    /// Confirm cost of the source, if it is two-phase.
    pub fn match_cost(&self) -> Option<f32> {
        self.source.match_cost()
    }

    /// Move the source approximation to its next candidate.
    pub fn approximation_next_doc(&mut self) -> Result<DocId> {
        self.bucket.reset(self.initial_capacity, self.realloc_threshold);
        self.source.approximation_next_doc()
    }

    /// Move the source approximation to the first candidate `>= target`.
    pub fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        self.bucket.reset(self.initial_capacity, self.realloc_threshold);
        self.source.approximation_advance(target)
    }

    /// Confirm the candidate and position the source on its first hit.
    pub fn confirm(&mut self) -> Result<bool> {
        if !self.source.confirm()? {
            return Ok(false);
        }
        Ok(self.source.next_start_position()? != NO_MORE_POSITIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::list::ListSpans;

    fn buckets(hits: &[(DocId, Position, Position)], grouping: BucketGrouping, order: Option<BucketOrder>) -> SpansInBuckets {
        SpansInBuckets::new(
            Box::new(ListSpans::from_triples(hits)),
            grouping,
            order,
            0,
            &EngineConfig::default(),
        )
    }

    fn bucket_hits(spans: &SpansInBuckets) -> Vec<(Position, Position)> {
        (0..spans.bucket_size())
            .map(|i| (spans.start(i), spans.end(i)))
            .collect()
    }

    #[test]
    fn test_per_start_point() {
        let mut spans = buckets(
            &[(0, 1, 2), (0, 1, 4), (0, 3, 4), (1, 0, 1)],
            BucketGrouping::PerStartPoint,
            None,
        );
        assert_eq!(spans.next_doc().unwrap(), 0);
        assert!(spans.next_bucket().unwrap());
        assert_eq!(bucket_hits(&spans), vec![(1, 2), (1, 4)]);
        assert!(spans.next_bucket().unwrap());
        assert_eq!(bucket_hits(&spans), vec![(3, 4)]);
        assert!(!spans.next_bucket().unwrap());

        assert_eq!(spans.next_doc().unwrap(), 1);
        assert!(spans.next_bucket().unwrap());
        assert_eq!(bucket_hits(&spans), vec![(0, 1)]);
        assert_eq!(spans.next_doc().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_consecutive() {
        let mut spans = buckets(
            &[(0, 0, 1), (0, 1, 2), (0, 2, 3), (0, 5, 6), (0, 6, 7)],
            BucketGrouping::Consecutive,
            None,
        );
        spans.next_doc().unwrap();
        assert!(spans.next_bucket().unwrap());
        assert_eq!(bucket_hits(&spans), vec![(0, 1), (1, 2), (2, 3)]);
        assert!(spans.next_bucket().unwrap());
        assert_eq!(bucket_hits(&spans), vec![(5, 6), (6, 7)]);
        assert!(!spans.next_bucket().unwrap());
    }

    #[test]
    fn test_same_start_end() {
        let mut spans = buckets(
            &[(0, 0, 2), (0, 0, 2), (0, 0, 3), (0, 1, 3)],
            BucketGrouping::SameStartEnd,
            None,
        );
        spans.next_doc().unwrap();
        assert!(spans.next_bucket().unwrap());
        assert_eq!(spans.bucket_size(), 2);
        assert!(spans.next_bucket().unwrap());
        assert_eq!(bucket_hits(&spans), vec![(0, 3)]);
        assert!(spans.next_bucket().unwrap());
        assert_eq!(bucket_hits(&spans), vec![(1, 3)]);
    }

    #[test]
    fn test_sort_by_end_breaks_ties_by_start() {
        let mut spans = buckets(
            &[(0, 3, 5), (0, 1, 5), (0, 2, 4)],
            BucketGrouping::PerDocument,
            Some(BucketOrder::End),
        );
        spans.next_doc().unwrap();
        assert!(spans.next_bucket().unwrap());
        assert_eq!(bucket_hits(&spans), vec![(2, 4), (1, 5), (3, 5)]);
    }

    #[test]
    fn test_sort_by_start() {
        let mut spans = buckets(
            &[(0, 4, 5), (0, 1, 5), (0, 1, 2)],
            BucketGrouping::PerDocument,
            Some(BucketOrder::Start),
        );
        spans.next_doc().unwrap();
        assert!(spans.next_bucket().unwrap());
        assert_eq!(bucket_hits(&spans), vec![(1, 2), (1, 5), (4, 5)]);
    }

    #[test]
    fn test_advance_bucket() {
        let mut spans = buckets(
            &[(0, 1, 2), (0, 3, 4), (0, 5, 6), (0, 5, 7)],
            BucketGrouping::PerStartPoint,
            None,
        );
        spans.next_doc().unwrap();
        assert!(spans.advance_bucket(4).unwrap());
        assert_eq!(bucket_hits(&spans), vec![(5, 6), (5, 7)]);
        assert!(!spans.advance_bucket(9).unwrap());
    }

    #[test]
    fn test_match_info_captured_per_hit() {
        let source = ListSpans::from_triples(&[(0, 0, 1), (0, 1, 2)])
            .with_match_info(0, vec![Some(MatchInfo::span(0, 1)), None])
            .with_match_info(1, vec![None, Some(MatchInfo::span(1, 2))]);
        let mut spans = SpansInBuckets::new(
            Box::new(source),
            BucketGrouping::PerDocument,
            None,
            2,
            &EngineConfig::default(),
        );
        spans.next_doc().unwrap();
        spans.next_bucket().unwrap();

        assert_eq!(spans.bucket().match_info(0), &[Some(MatchInfo::span(0, 1)), None]);

        let mut match_info = vec![Some(MatchInfo::span(9, 9)), Some(MatchInfo::span(9, 9))];
        spans.bucket().fill_match_info(1, &mut match_info);
        assert_eq!(match_info, vec![Some(MatchInfo::span(9, 9)), Some(MatchInfo::span(1, 2))]);
    }

    #[test]
    fn test_large_bucket_is_reallocated() {
        let hits: Vec<_> = (0..50).map(|i| (0, i, i + 1)).chain([(1, 0, 1)]).collect();
        let config = EngineConfig::default()
            .with_bucket_initial_capacity(4)
            .with_bucket_realloc_threshold(16);
        let mut spans = SpansInBuckets::new(
            Box::new(ListSpans::new(hits)),
            BucketGrouping::PerDocument,
            None,
            0,
            &config,
        );
        spans.next_doc().unwrap();
        spans.next_bucket().unwrap();
        assert_eq!(spans.bucket_size(), 50);

        spans.next_doc().unwrap();
        spans.next_bucket().unwrap();
        assert_eq!(spans.bucket_size(), 1);
        assert!(spans.bucket().starts.capacity() <= 16);
    }
}
