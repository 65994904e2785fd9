//! Conjunction (AND) of clauses: hits with the same start and end in all
//! clauses.
//!
//! [`AndSpans`] is the two-pointer engine for two start-sorted, unique
//! clauses. [`AndMultiSpans`] handles any number of start-sorted clauses
//! that may contain several hits with the same `(start, end)` (differing
//! in match info), and returns every combination of those once.

use ahash::AHashSet;

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

/// Where a conjunction is within the current document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HitState {
    /// On a candidate document that hasn't been confirmed.
    Unconfirmed,
    /// The first hit was found by `confirm` but not returned yet.
    Staged,
    OnHit,
    Exhausted,
}

/// Conjunction of two start-sorted, unique clauses.
#[derive(Debug)]
pub struct AndSpans {
    clauses: [Box<dyn PositionIterator>; 2],
    starts: [Position; 2],
    guarantees: Guarantees,
    doc: DocId,
    state: HitState,
}

impl AndSpans {
    /// Combine two clauses. Both must be start-sorted and unique.
    pub fn new(left: Box<dyn PositionIterator>, right: Box<dyn PositionIterator>) -> Result<Self> {
        for clause in [&left, &right] {
            if !clause.guarantees().is_sorted_unique() {
                return Err(SpanlabError::invalid_argument(
                    "simple conjunction requires start-sorted, unique clauses",
                ));
            }
        }
        let guarantees = Guarantees::and(&[*left.guarantees(), *right.guarantees()]);
        Ok(AndSpans {
            clauses: [left, right],
            starts: [NOT_STARTED; 2],
            guarantees,
            doc: NOT_STARTED,
            state: HitState::Unconfirmed,
        })
    }

    fn align(&mut self, target: DocId) -> Result<DocId> {
        self.starts = [NOT_STARTED; 2];
        self.state = HitState::Unconfirmed;
        self.doc = align_approximations(&mut self.clauses, target)?;
        Ok(self.doc)
    }

    /// Advance the clauses until they agree on start and end.
    fn synchronize(&mut self) -> Result<Position> {
        loop {
            if self.starts.contains(&NO_MORE_POSITIONS) {
                return Ok(NO_MORE_POSITIONS);
            }
            if self.starts[0] != self.starts[1] || self.starts[0] == NOT_STARTED {
                let lagging = if self.starts[0] < self.starts[1] { 0 } else { 1 };
                self.catch_up_start(lagging)?;
                continue;
            }
            let (end0, end1) = (self.clauses[0].end_position(), self.clauses[1].end_position());
            if end0 != end1 {
                self.catch_up_end(if end0 < end1 { 0 } else { 1 })?;
                continue;
            }
            return Ok(self.starts[0]);
        }
    }

    fn catch_up_start(&mut self, lagging: usize) -> Result<()> {
        let target = self.starts[1 - lagging];
        let start = self.starts[lagging];
        if start == NOT_STARTED || start < target {
            self.starts[lagging] = self.clauses[lagging].advance_start_position(target)?;
        }
        Ok(())
    }

    /// Ends can't be skipped to; step through hits with the same start.
    fn catch_up_end(&mut self, lagging: usize) -> Result<()> {
        let start = self.starts[lagging];
        let target = self.clauses[1 - lagging].end_position();
        while self.starts[lagging] == start && self.clauses[lagging].end_position() < target {
            self.starts[lagging] = self.clauses[lagging].next_start_position()?;
        }
        Ok(())
    }
}

impl PositionIterator for AndSpans {
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
                return Ok(self.starts[0]);
            }
            HitState::Exhausted | HitState::Unconfirmed => return Ok(NO_MORE_POSITIONS),
            HitState::OnHit => {}
        }
        for i in 0..2 {
            self.starts[i] = self.clauses[i].next_start_position()?;
        }
        let start = self.synchronize()?;
        if start == NO_MORE_POSITIONS {
            self.state = HitState::Exhausted;
        }
        Ok(start)
    }

    fn advance_start_position(&mut self, target: Position) -> Result<Position> {
        match self.state {
            HitState::Staged => {
                self.state = HitState::OnHit;
                if self.starts[0] >= target {
                    return Ok(self.starts[0]);
                }
            }
            HitState::Exhausted | HitState::Unconfirmed => return Ok(NO_MORE_POSITIONS),
            HitState::OnHit => {}
        }
        for i in 0..2 {
            self.starts[i] = self.clauses[i].advance_start_position(target)?;
        }
        let start = self.synchronize()?;
        if start == NO_MORE_POSITIONS {
            self.state = HitState::Exhausted;
        }
        Ok(start)
    }

    fn start_position(&self) -> Position {
        match self.state {
            HitState::Unconfirmed | HitState::Staged => NOT_STARTED,
            HitState::OnHit => self.starts[0],
            HitState::Exhausted => NO_MORE_POSITIONS,
        }
    }

    fn end_position(&self) -> Position {
        match self.state {
            HitState::Unconfirmed | HitState::Staged => NOT_STARTED,
            HitState::OnHit => self.clauses[0].end_position(),
            HitState::Exhausted => NO_MORE_POSITIONS,
        }
    }

    fn cost(&self) -> u64 {
        self.clauses[0].cost().min(self.clauses[1].cost())
    }

    fn positions_cost(&self) -> f32 {
        self.clauses[0].positions_cost().max(self.clauses[1].positions_cost())
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
        self.starts = [NOT_STARTED; 2];
        if self.synchronize()? == NO_MORE_POSITIONS {
            self.state = HitState::Exhausted;
            return Ok(false);
        }
        self.state = HitState::Staged;
        Ok(true)
    }
}

/// Conjunction of any number of start-sorted clauses, each of which may
/// produce several hits with the same `(start, end)`.
///
/// Each clause is gathered into buckets of identical `(start, end)`. When
/// all buckets line up, every combination of one hit per bucket is a hit,
/// enumerated like a counter whose first digit is the first clause.
#[derive(Debug)]
pub struct AndMultiSpans {
    clauses: Vec<SpansInBuckets>,
    guarantees: Guarantees,
    unique_relations: bool,
    index_in_bucket: Vec<usize>,
    /// Relation sets already returned at the current `(start, end)`.
    returned: AHashSet<Vec<RelationInfo>>,
    doc: DocId,
    state: HitState,
}

impl AndMultiSpans {
    /// Combine `clauses`, all start-sorted.
    ///
    /// With `unique_relations`, a combination in which two clauses matched
    /// the same relation is skipped, as is any combination matching a set
    /// of relations already returned at this position.
    pub fn new(
        clauses: Vec<Box<dyn PositionIterator>>,
        unique_relations: bool,
        num_infos: usize,
        config: &EngineConfig,
    ) -> Result<Self> {
        if clauses.len() < 2 {
            return Err(SpanlabError::invalid_argument(format!(
                "conjunction needs at least two clauses, got {}",
                clauses.len()
            )));
        }
        if let Some(i) = clauses.iter().position(|c| !c.guarantees().start_sorted) {
            return Err(SpanlabError::invalid_argument(format!(
                "conjunction clause {i} is not start-sorted"
            )));
        }
        let guarantees = Guarantees::and(&clauses.iter().map(|c| *c.guarantees()).collect::<Vec<_>>());
        let n = clauses.len();
        let clauses = clauses
            .into_iter()
            .map(|clause| SpansInBuckets::new(clause, BucketGrouping::SameStartEnd, None, num_infos, config))
            .collect();
        Ok(AndMultiSpans {
            clauses,
            guarantees,
            unique_relations,
            index_in_bucket: vec![0; n],
            returned: AHashSet::new(),
            doc: NOT_STARTED,
            state: HitState::Unconfirmed,
        })
    }

    fn key(&self, clause: usize) -> (Position, Position) {
        (self.clauses[clause].start(0), self.clauses[clause].end(0))
    }

    fn at_match(&self) -> bool {
        let first = self.key(0);
        (1..self.clauses.len()).all(|i| self.key(i) == first)
    }

    /// Move the most lagging clause to its next bucket, skipping by start
    /// if it lags behind the furthest clause.
    fn advance_window(&mut self) -> Result<bool> {
        let mut lagging = 0;
        let mut max_start = self.key(0).0;
        for i in 1..self.clauses.len() {
            if self.key(i) < self.key(lagging) {
                lagging = i;
            }
            max_start = max_start.max(self.key(i).0);
        }
        let clause = &mut self.clauses[lagging];
        if clause.start(0) < max_start {
            clause.advance_bucket(max_start)
        } else {
            clause.next_bucket()
        }
    }

    /// Whether the current combination may be returned.
    fn combination_is_new(&mut self) -> bool {
        if !self.unique_relations {
            return true;
        }
        let mut relations: Vec<RelationInfo> = self
            .clauses
            .iter()
            .zip(&self.index_in_bucket)
            .filter_map(|(clause, &i)| clause.bucket().relation(i))
            .collect();
        relations.sort();
        if relations.windows(2).any(|w| w[0] == w[1]) {
            return false;
        }
        self.returned.insert(relations)
    }

    /// Move to the next combination at the current position that may be
    /// returned. If `skip_current` is false the current combination is
    /// considered first.
    fn next_combination(&mut self, skip_current: bool) -> bool {
        if !skip_current && self.combination_is_new() {
            return true;
        }
        loop {
            let mut carried_out = true;
            for i in 0..self.clauses.len() {
                if self.index_in_bucket[i] + 1 >= self.clauses[i].bucket_size() {
                    self.index_in_bucket[i] = 0;
                } else {
                    self.index_in_bucket[i] += 1;
                    carried_out = false;
                    break;
                }
            }
            if carried_out {
                self.returned.clear();
                return false;
            }
            if self.combination_is_new() {
                return true;
            }
        }
    }

    /// Find the next position where all clauses agree and a combination
    /// can be returned.
    fn next_match(&mut self) -> Result<bool> {
        loop {
            if !self.advance_window()? {
                return Ok(false);
            }
            if self.at_match() {
                self.index_in_bucket.iter_mut().for_each(|i| *i = 0);
                if self.next_combination(false) {
                    return Ok(true);
                }
            }
        }
    }

    fn align(&mut self, target: DocId) -> Result<DocId> {
        self.state = HitState::Unconfirmed;
        let mut doc = target;
        'outer: loop {
            for clause in self.clauses.iter_mut() {
                let mut clause_doc = clause.doc_id();
                if clause_doc < doc {
                    clause_doc = clause.approximation_advance(doc)?;
                }
                if clause_doc == NO_MORE_DOCS {
                    doc = NO_MORE_DOCS;
                    break 'outer;
                }
                if clause_doc > doc {
                    doc = clause_doc;
                    continue 'outer;
                }
            }
            break;
        }
        self.doc = doc;
        Ok(doc)
    }
}

impl PositionIterator for AndMultiSpans {
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
            HitState::Exhausted | HitState::Unconfirmed => return Ok(NO_MORE_POSITIONS),
            HitState::OnHit => {
                if !self.next_combination(true) && !self.next_match()? {
                    self.state = HitState::Exhausted;
                }
            }
        }
        Ok(self.start_position())
    }

    fn start_position(&self) -> Position {
        match self.state {
            HitState::Unconfirmed | HitState::Staged => NOT_STARTED,
            HitState::OnHit => self.clauses[0].start(0),
            HitState::Exhausted => NO_MORE_POSITIONS,
        }
    }

    fn end_position(&self) -> Position {
        match self.state {
            HitState::Unconfirmed | HitState::Staged => NOT_STARTED,
            HitState::OnHit => self.clauses[0].end(0),
            HitState::Exhausted => NO_MORE_POSITIONS,
        }
    }

    fn cost(&self) -> u64 {
        self.clauses.iter().map(|c| c.cost()).min().unwrap_or(0)
    }

    fn positions_cost(&self) -> f32 {
        self.clauses.iter().map(|c| c.positions_cost()).fold(0.0, f32::max)
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        if self.state != HitState::OnHit {
            return;
        }
        for (clause, &i) in self.clauses.iter().zip(&self.index_in_bucket) {
            clause.bucket().fill_match_info(i, match_info);
        }
    }

    fn has_match_info(&self) -> bool {
        self.clauses.iter().any(|c| c.has_match_info())
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        if self.state != HitState::OnHit {
            return None;
        }
        self.clauses
            .iter()
            .zip(&self.index_in_bucket)
            .find_map(|(clause, &i)| clause.bucket().relation(i))
    }

    fn match_cost(&self) -> Option<f32> {
        Some(
            self.clauses
                .iter()
                .map(|c| c.match_cost().unwrap_or_else(|| c.positions_cost()))
                .sum(),
        )
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
        self.returned.clear();
        for clause in self.clauses.iter_mut() {
            if !clause.confirm()? || !clause.next_bucket()? {
                self.state = HitState::Exhausted;
                return Ok(false);
            }
        }
        let found = if self.at_match() {
            self.index_in_bucket.iter_mut().for_each(|i| *i = 0);
            self.next_combination(false) || self.next_match()?
        } else {
            self.next_match()?
        };
        self.state = if found { HitState::Staged } else { HitState::Exhausted };
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::list::{drain_hits, ListSpans};

    fn list(hits: &[(DocId, Position, Position)]) -> Box<dyn PositionIterator> {
        Box::new(ListSpans::from_triples(hits))
    }

    #[test]
    fn test_and_simple() {
        let left = list(&[(0, 1, 2), (0, 1, 3), (0, 4, 6), (1, 0, 1), (3, 2, 4)]);
        let right = list(&[(0, 1, 3), (0, 4, 5), (0, 4, 6), (2, 0, 1), (3, 2, 4)]);
        let mut spans = AndSpans::new(left, right).unwrap();
        assert_eq!(
            drain_hits(&mut spans).unwrap(),
            vec![(0, 1, 3), (0, 4, 6), (3, 2, 4)]
        );
    }

    #[test]
    fn test_and_simple_staged_first_hit() {
        let mut spans = AndSpans::new(list(&[(5, 2, 3)]), list(&[(5, 2, 3)])).unwrap();
        assert_eq!(spans.next_doc().unwrap(), 5);
        assert_eq!(spans.start_position(), NOT_STARTED);
        assert_eq!(spans.end_position(), NOT_STARTED);
        assert_eq!(spans.next_start_position().unwrap(), 2);
        assert_eq!(spans.end_position(), 3);
        assert_eq!(spans.next_start_position().unwrap(), NO_MORE_POSITIONS);
        assert_eq!(spans.next_doc().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_and_simple_advance_start_position() {
        let hits = [(0, 1, 2), (0, 3, 4), (0, 6, 7)];
        let mut spans = AndSpans::new(list(&hits), list(&hits)).unwrap();
        spans.next_doc().unwrap();
        assert_eq!(spans.advance_start_position(2).unwrap(), 3);
        assert_eq!(spans.advance_start_position(5).unwrap(), 6);
        assert_eq!(spans.advance_start_position(7).unwrap(), NO_MORE_POSITIONS);
    }

    #[test]
    fn test_and_simple_skips_unconfirmed_candidates() {
        let left = ListSpans::from_triples(&[(2, 0, 1), (4, 0, 1)]).with_candidates(&[1, 3]);
        let right = ListSpans::from_triples(&[(1, 0, 1), (3, 0, 1), (4, 0, 1)]);
        let mut spans = AndSpans::new(Box::new(left), Box::new(right)).unwrap();
        assert!(spans.match_cost().is_some());
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![(4, 0, 1)]);
    }

    #[test]
    fn test_and_simple_rejects_unsorted() {
        let result = AndSpans::new(list(&[(0, 4, 5), (0, 1, 2)]), list(&[(0, 1, 2)]));
        assert!(matches!(result, Err(SpanlabError::InvalidArgument(_))));
    }

    #[test]
    fn test_and_keeps_sorted_unique_guarantees() {
        let spans = AndSpans::new(list(&[(0, 1, 2)]), list(&[(0, 1, 2)])).unwrap();
        assert!(spans.guarantees().start_sorted);
        assert!(spans.guarantees().unique_start);
    }

    fn multi(clauses: Vec<Box<dyn PositionIterator>>, unique_relations: bool, num_infos: usize) -> AndMultiSpans {
        AndMultiSpans::new(clauses, unique_relations, num_infos, &EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_and_multi_three_clauses() {
        let mut spans = multi(
            vec![
                list(&[(0, 1, 2), (0, 3, 5), (1, 0, 2)]),
                list(&[(0, 0, 1), (0, 3, 5), (1, 0, 2)]),
                list(&[(0, 3, 4), (0, 3, 5), (1, 0, 1)]),
            ],
            false,
            0,
        );
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![(0, 3, 5)]);
    }

    #[test]
    fn test_and_multi_enumerates_combinations() {
        let left = ListSpans::from_triples(&[(0, 1, 3), (0, 1, 3)])
            .with_match_info(0, vec![Some(MatchInfo::span(1, 2)), Some(MatchInfo::span(2, 3))]);
        let right = ListSpans::from_triples(&[(0, 1, 3), (0, 1, 3)])
            .with_match_info(1, vec![Some(MatchInfo::span(1, 1)), Some(MatchInfo::span(3, 3))]);
        let mut spans = multi(vec![Box::new(left), Box::new(right)], false, 2);
        spans.next_doc().unwrap();

        let mut combinations = Vec::new();
        while spans.next_start_position().unwrap() != NO_MORE_POSITIONS {
            assert_eq!((spans.start_position(), spans.end_position()), (1, 3));
            let mut match_info = vec![None, None];
            spans.get_match_info(&mut match_info);
            combinations.push(match_info);
        }
        assert_eq!(combinations.len(), 4);
        assert_eq!(
            combinations[1],
            vec![Some(MatchInfo::span(2, 3)), Some(MatchInfo::span(1, 1))]
        );
    }

    #[test]
    fn test_and_multi_unique_relations() {
        let a = RelationInfo::new(1, 2, 3, 4);
        let b = RelationInfo::new(1, 2, 5, 6);
        let clause = || {
            Box::new(
                ListSpans::from_triples(&[(0, 1, 2), (0, 1, 2)]).with_relations(vec![Some(a), Some(b)]),
            ) as Box<dyn PositionIterator>
        };
        let mut spans = multi(vec![clause(), clause()], true, 0);
        // (a, a) and (b, b) reuse a relation; (a, b) is a permutation of (b, a).
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![(0, 1, 2)]);
    }

    #[test]
    fn test_and_multi_needs_two_clauses() {
        let result = AndMultiSpans::new(vec![list(&[(0, 1, 2)])], false, 0, &EngineConfig::default());
        assert!(matches!(result, Err(SpanlabError::InvalidArgument(_))));
    }
}
