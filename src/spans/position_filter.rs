//! Keep producer hits based on their position relative to filter hits
//! (`A containing B`, `A within B`, ...).
//!
//! The filter clause is gathered per document into a start-sorted bucket,
//! loaded lazily when the producer reaches a document.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::spans::buckets::{BucketGrouping, BucketOrder, SpansInBuckets};
use crate::spans::filter::{AcceptStatus, FilteredSpans, HitFilter};
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{DocId, Position, PositionIterator, NOT_STARTED, NO_MORE_DOCS};

/// How a producer hit must relate to a filter hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionFilterOp {
    /// Producer hit contains a filter hit.
    Containing,
    /// Producer hit lies within a filter hit.
    Within,
    /// Producer hit starts where a filter hit starts.
    StartsAt,
    /// Producer hit ends where a filter hit ends.
    EndsAt,
    /// Producer hit equals a filter hit.
    Matches,
    /// Producer hit contains a filter hit at its start.
    ContainingAtStart,
    /// Producer hit contains a filter hit at its end.
    ContainingAtEnd,
}

impl PositionFilterOp {
    fn matches(self, producer: (Position, Position), filter: (Position, Position)) -> bool {
        let ((ps, pe), (fs, fe)) = (producer, filter);
        match self {
            PositionFilterOp::Containing => fs >= ps && fe <= pe,
            PositionFilterOp::Within => fs <= ps && fe >= pe,
            PositionFilterOp::StartsAt => fs == ps,
            PositionFilterOp::EndsAt => fe == pe,
            PositionFilterOp::Matches => fs == ps && fe == pe,
            PositionFilterOp::ContainingAtStart => fs == ps && fe <= pe,
            PositionFilterOp::ContainingAtEnd => fs >= ps && fe == pe,
        }
    }

    /// Filter hits must start at or after the producer start.
    fn needs_later_filter_start(self) -> bool {
        matches!(
            self,
            PositionFilterOp::Containing
                | PositionFilterOp::ContainingAtStart
                | PositionFilterOp::ContainingAtEnd
                | PositionFilterOp::StartsAt
                | PositionFilterOp::Matches
        )
    }

    /// Filter hits must start at or before the producer start.
    fn needs_earlier_filter_start(self) -> bool {
        matches!(
            self,
            PositionFilterOp::Within
                | PositionFilterOp::StartsAt
                | PositionFilterOp::Matches
                | PositionFilterOp::ContainingAtStart
        )
    }
}

/// Producer hits filtered by their position relative to filter hits.
pub type PositionFilterSpans = FilteredSpans<PositionFilter>;

/// Compares producer hits against the filter hits of the current document.
#[derive(Debug)]
pub struct PositionFilter {
    filter: SpansInBuckets,
    op: PositionFilterOp,
    invert: bool,
    left_adjust: i32,
    right_adjust: i32,
    producer_sorted: bool,
    /// Document whose filter hits are in the bucket.
    loaded_doc: DocId,
    /// Filter hit matched by the current producer hit.
    matched: Option<usize>,
}

impl PositionFilter {
    /// Put the filter on the producer's document. Returns `false` if the
    /// filter has no hits there.
    fn sync(&mut self, doc: DocId) -> Result<bool> {
        if self.loaded_doc == doc {
            return Ok(self.filter.bucket_size() > 0);
        }
        let mut filter_doc = self.filter.doc_id();
        if filter_doc != NO_MORE_DOCS && filter_doc < doc {
            filter_doc = self.filter.advance(doc)?;
        }
        self.loaded_doc = doc;
        if filter_doc == doc {
            self.filter.next_bucket()
        } else {
            Ok(false)
        }
    }

    /// First bucket index whose start is at least `start`.
    fn first_starting_at(&self, start: Position) -> usize {
        let (mut lo, mut hi) = (0, self.filter.bucket_size());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.filter.start(mid) < start {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// First bucket index whose start is after `start`.
    fn first_starting_after(&self, start: Position) -> usize {
        start
            .checked_add(1)
            .map_or(self.filter.bucket_size(), |next| self.first_starting_at(next))
    }
}

impl HitFilter for PositionFilter {
    fn accept(&mut self, inner: &mut dyn PositionIterator) -> Result<AcceptStatus> {
        self.matched = None;
        if !self.sync(inner.doc_id())? {
            return Ok(if self.invert {
                AcceptStatus::Yes
            } else {
                AcceptStatus::NoMoreInDocument
            });
        }

        let producer = (
            inner.start_position() + self.left_adjust,
            inner.end_position() + self.right_adjust,
        );
        let size = self.filter.bucket_size();
        let begin = if self.op.needs_later_filter_start() {
            self.first_starting_at(producer.0)
        } else {
            0
        };
        let end = if self.op.needs_earlier_filter_start() {
            self.first_starting_after(producer.0)
        } else {
            size
        };
        self.matched = (begin..end)
            .find(|&i| self.op.matches(producer, (self.filter.start(i), self.filter.end(i))));

        Ok(match (self.matched.is_some(), self.invert) {
            (true, false) | (false, true) => AcceptStatus::Yes,
            (false, false) if begin == size && self.producer_sorted && self.op.needs_later_filter_start() => {
                // Later producer hits start even later.
                AcceptStatus::NoMoreInDocument
            }
            _ => AcceptStatus::No,
        })
    }

    fn get_match_info(&self, inner: &dyn PositionIterator, match_info: &mut [Option<MatchInfo>]) {
        inner.get_match_info(match_info);
        if let Some(i) = self.matched.filter(|_| !self.invert) {
            self.filter.bucket().fill_match_info(i, match_info);
        }
    }

    fn has_match_info(&self, inner: &dyn PositionIterator) -> bool {
        inner.has_match_info() || (!self.invert && self.filter.has_match_info())
    }

    fn cost(&self) -> f32 {
        2.0
    }
}

impl PositionFilterSpans {
    /// Keep `producer` hits that relate to a `filter` hit by `op` (or,
    /// with `invert`, that relate to none). The producer hit is moved by
    /// `left_adjust`/`right_adjust` before comparing.
    #[allow(clippy::too_many_arguments)]
    pub fn position_filter(
        producer: Box<dyn PositionIterator>,
        filter: Box<dyn PositionIterator>,
        op: PositionFilterOp,
        invert: bool,
        left_adjust: i32,
        right_adjust: i32,
        num_infos: usize,
        config: &EngineConfig,
    ) -> Self {
        let guarantees = *producer.guarantees();
        let filter = PositionFilter {
            filter: SpansInBuckets::new(
                filter,
                BucketGrouping::PerDocument,
                Some(BucketOrder::Start),
                num_infos,
                config,
            ),
            op,
            invert,
            left_adjust,
            right_adjust,
            producer_sorted: guarantees.start_sorted,
            loaded_doc: NOT_STARTED,
            matched: None,
        };
        FilteredSpans::new(producer, filter, guarantees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::list::{drain_hits, ListSpans};

    fn run(
        producer: &[(DocId, Position, Position)],
        filter: &[(DocId, Position, Position)],
        op: PositionFilterOp,
        invert: bool,
    ) -> Vec<(DocId, Position, Position)> {
        let mut spans = PositionFilterSpans::position_filter(
            Box::new(ListSpans::from_triples(producer)),
            Box::new(ListSpans::from_triples(filter)),
            op,
            invert,
            0,
            0,
            0,
            &EngineConfig::default(),
        );
        drain_hits(&mut spans).unwrap()
    }

    const SENTENCES: &[(DocId, Position, Position)] = &[(0, 0, 4), (0, 4, 9), (1, 0, 3), (2, 0, 5)];
    const WORDS: &[(DocId, Position, Position)] = &[(0, 2, 3), (0, 9, 10), (2, 0, 1), (2, 4, 5)];

    #[test]
    fn test_containing() {
        assert_eq!(
            run(SENTENCES, WORDS, PositionFilterOp::Containing, false),
            vec![(0, 0, 4), (2, 0, 5)]
        );
    }

    #[test]
    fn test_not_containing() {
        assert_eq!(
            run(SENTENCES, WORDS, PositionFilterOp::Containing, true),
            vec![(0, 4, 9), (1, 0, 3)]
        );
    }

    #[test]
    fn test_within() {
        assert_eq!(
            run(WORDS, SENTENCES, PositionFilterOp::Within, false),
            vec![(0, 2, 3), (2, 0, 1), (2, 4, 5)]
        );
    }

    #[test]
    fn test_at_start_and_end() {
        assert_eq!(
            run(SENTENCES, WORDS, PositionFilterOp::ContainingAtStart, false),
            vec![(2, 0, 5)]
        );
        assert_eq!(
            run(SENTENCES, WORDS, PositionFilterOp::ContainingAtEnd, false),
            vec![(2, 0, 5)]
        );
        assert_eq!(
            run(WORDS, SENTENCES, PositionFilterOp::StartsAt, false),
            vec![(2, 0, 1)]
        );
        assert_eq!(run(WORDS, SENTENCES, PositionFilterOp::EndsAt, false), vec![(2, 4, 5)]);
        assert_eq!(run(SENTENCES, SENTENCES, PositionFilterOp::Matches, false), SENTENCES.to_vec());
    }

    #[test]
    fn test_adjust_and_filter_match_info() {
        let producer = ListSpans::from_triples(&[(0, 3, 4)]);
        let filter = ListSpans::from_triples(&[(0, 2, 4)]).with_match_info(0, vec![Some(MatchInfo::span(2, 4))]);
        let mut spans = PositionFilterSpans::position_filter(
            Box::new(producer),
            Box::new(filter),
            PositionFilterOp::Matches,
            false,
            -1,
            0,
            1,
            &EngineConfig::default(),
        );
        assert!(spans.has_match_info());
        spans.next_doc().unwrap();
        assert_eq!(spans.next_start_position().unwrap(), 3);
        let mut match_info = vec![None];
        spans.get_match_info(&mut match_info);
        assert_eq!(match_info[0], Some(MatchInfo::span(2, 4)));
    }
}
