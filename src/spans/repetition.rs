//! Repetitions of a clause (`[pos="ADJ"]{2,3}`).
//!
//! Hits of the clause are grouped into runs where each hit starts where the
//! previous one ended. Every run of at least `min` hits yields, for each
//! starting offset in the run, the repetitions of `min..=max` hits that fit.

use crate::config::EngineConfig;
use crate::error::{Result, SpanlabError};
use crate::spans::buckets::{BucketGrouping, SpansInBuckets};
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{
    DocId, Position, PositionIterator, NOT_STARTED, NO_MORE_DOCS, NO_MORE_POSITIONS,
};

/// Repetitions of a start-sorted clause without duplicate hits.
#[derive(Debug)]
pub struct RepetitionSpans {
    source: SpansInBuckets,
    guarantees: Guarantees,
    min: usize,
    max: usize,
    /// Offset of the current hit's first clause hit in the bucket.
    first: usize,
    /// Number of clause hits in the current hit.
    count: usize,
    more_buckets: bool,
    /// The first hit of the document was found while looking for the
    /// document but not returned yet.
    staged: bool,
    doc: DocId,
}

impl RepetitionSpans {
    /// Repeat `clause` between `min` and `max` times. `max` of `None` means
    /// unbounded, which is capped at `config.max_unlimited_repetitions`.
    pub fn new(
        clause: Box<dyn PositionIterator>,
        min: u32,
        max: Option<u32>,
        num_infos: usize,
        config: &EngineConfig,
    ) -> Result<Self> {
        let max_value = max.unwrap_or(config.max_unlimited_repetitions);
        if min < 1 {
            return Err(SpanlabError::invalid_argument(
                "repetition minimum must be at least 1",
            ));
        }
        if min > max_value {
            return Err(SpanlabError::invalid_argument(format!(
                "repetition minimum {min} is larger than maximum {max_value}"
            )));
        }
        if !clause.guarantees().is_sorted_without_duplicates() {
            return Err(SpanlabError::invalid_argument(
                "repetition requires start-sorted input without duplicate hits",
            ));
        }
        let guarantees = Guarantees::repetition(clause.guarantees(), min, max);
        Ok(RepetitionSpans {
            source: SpansInBuckets::new(clause, BucketGrouping::Consecutive, None, num_infos, config),
            guarantees,
            min: min as usize,
            max: max_value as usize,
            first: 0,
            count: 0,
            more_buckets: false,
            staged: false,
            doc: NOT_STARTED,
        })
    }

    /// Move to the next bucket of the current document that is long enough.
    fn next_matching_bucket(&mut self) -> Result<bool> {
        while self.source.next_bucket()? {
            if self.source.bucket_size() >= self.min {
                self.first = 0;
                self.count = self.min;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// From candidate `doc`, find the first document with a matching bucket.
    fn find_doc_with_matching_bucket(&mut self, mut doc: DocId) -> Result<DocId> {
        while doc != NO_MORE_DOCS {
            self.more_buckets = self.next_matching_bucket()?;
            if self.more_buckets {
                break;
            }
            doc = self.source.next_doc()?;
        }
        self.doc = doc;
        self.staged = doc != NO_MORE_DOCS;
        Ok(doc)
    }

    fn on_hit(&self) -> bool {
        !self.staged && self.more_buckets && self.doc != NO_MORE_DOCS
    }
}

impl PositionIterator for RepetitionSpans {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        self.staged = false;
        let doc = self.source.next_doc()?;
        self.find_doc_with_matching_bucket(doc)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        self.staged = false;
        let doc = self.source.advance(target)?;
        self.find_doc_with_matching_bucket(doc)
    }

    fn next_start_position(&mut self) -> Result<Position> {
        if self.doc == NO_MORE_DOCS || !self.more_buckets {
            return Ok(NO_MORE_POSITIONS);
        }
        if self.staged {
            self.staged = false;
            return Ok(self.source.start(self.first));
        }

        self.count += 1;
        if self.count > self.max || self.first + self.count > self.source.bucket_size() {
            self.first += 1;
            self.count = self.min;
        }
        if self.first + self.count <= self.source.bucket_size() {
            return Ok(self.source.start(self.first));
        }

        self.more_buckets = self.next_matching_bucket()?;
        Ok(self.start_position())
    }

    fn start_position(&self) -> Position {
        if self.staged {
            NOT_STARTED
        } else if self.on_hit() {
            self.source.start(self.first)
        } else {
            NO_MORE_POSITIONS
        }
    }

    fn end_position(&self) -> Position {
        if self.staged {
            NOT_STARTED
        } else if self.on_hit() {
            self.source.end(self.first + self.count - 1)
        } else {
            NO_MORE_POSITIONS
        }
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

    /// Match info of the last repeated clause hit.
    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        if self.on_hit() {
            self.source
                .bucket()
                .fill_match_info(self.first + self.count - 1, match_info);
        }
    }

    fn has_match_info(&self) -> bool {
        self.source.has_match_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::list::{drain_hits, ListSpans};

    fn repetition(hits: &[(DocId, Position, Position)], min: u32, max: Option<u32>) -> RepetitionSpans {
        RepetitionSpans::new(
            Box::new(ListSpans::from_triples(hits)),
            min,
            max,
            0,
            &EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_run_of_three() {
        let mut spans = repetition(&[(0, 1, 2), (0, 2, 3), (0, 3, 4)], 2, Some(3));
        assert_eq!(
            drain_hits(&mut spans).unwrap(),
            vec![(0, 1, 3), (0, 1, 4), (0, 2, 4)]
        );
    }

    #[test]
    fn test_run_lengths_per_offset() {
        // A run of k = 5 chained hits with bounds [2, 3].
        let hits: Vec<_> = (0..5).map(|i| (0, i, i + 1)).collect();
        let mut spans = repetition(&hits, 2, Some(3));
        let found = drain_hits(&mut spans).unwrap();
        let count_at = |start| found.iter().filter(|h| h.1 == start).count();
        assert_eq!(count_at(0), 2);
        assert_eq!(count_at(2), 2);
        assert_eq!(count_at(3), 1);
        assert_eq!(count_at(4), 0);
        assert!(found.iter().all(|h| h.2 - h.1 >= 2 && h.2 - h.1 <= 3));
    }

    #[test]
    fn test_short_runs_skipped() {
        let mut spans = repetition(
            &[(0, 1, 2), (0, 5, 6), (0, 6, 7), (1, 0, 1), (2, 3, 4), (2, 4, 5)],
            2,
            None,
        );
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![(0, 5, 7), (2, 3, 5)]);
    }

    #[test]
    fn test_first_hit_is_staged() {
        let mut spans = repetition(&[(3, 1, 2), (3, 2, 3)], 1, Some(2));
        assert_eq!(spans.next_doc().unwrap(), 3);
        assert_eq!(spans.start_position(), NOT_STARTED);
        assert_eq!(spans.next_start_position().unwrap(), 1);
        assert_eq!(spans.end_position(), 2);
        assert_eq!(spans.next_start_position().unwrap(), 1);
        assert_eq!(spans.end_position(), 3);
        assert_eq!(spans.next_start_position().unwrap(), 2);
        assert_eq!(spans.next_start_position().unwrap(), NO_MORE_POSITIONS);
        assert_eq!(spans.next_doc().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_match_info_of_last_hit() {
        let source = ListSpans::from_triples(&[(0, 1, 2), (0, 2, 3)]).with_match_info(
            0,
            vec![Some(MatchInfo::span(1, 2)), Some(MatchInfo::span(2, 3))],
        );
        let mut spans =
            RepetitionSpans::new(Box::new(source), 2, Some(2), 1, &EngineConfig::default()).unwrap();
        spans.next_doc().unwrap();
        spans.next_start_position().unwrap();
        let mut match_info = vec![None];
        spans.get_match_info(&mut match_info);
        assert_eq!(match_info[0], Some(MatchInfo::span(2, 3)));
    }

    #[test]
    fn test_invalid_bounds() {
        let hits = [(0, 1, 2)];
        let config = EngineConfig::default();
        let make = |min, max| {
            RepetitionSpans::new(Box::new(ListSpans::from_triples(&hits)), min, max, 0, &config)
        };
        assert!(matches!(make(0, Some(2)), Err(SpanlabError::InvalidArgument(_))));
        assert!(matches!(make(3, Some(2)), Err(SpanlabError::InvalidArgument(_))));
        assert!(make(2, None).is_ok());
    }

    #[test]
    fn test_unsorted_input_rejected() {
        let source = ListSpans::from_triples(&[(0, 4, 5), (0, 1, 2)]);
        let result = RepetitionSpans::new(Box::new(source), 1, Some(2), 0, &EngineConfig::default());
        assert!(matches!(result, Err(SpanlabError::InvalidArgument(_))));
    }
}
