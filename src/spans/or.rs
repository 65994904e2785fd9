//! Disjunction (OR) of clauses, merged by start and end.

use crate::error::Result;
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{
    naive_advance_start_position, DocId, Position, PositionIterator, NOT_STARTED, NO_MORE_DOCS,
    NO_MORE_POSITIONS,
};
use crate::spans::relation_info::RelationInfo;

/// Hits of any clause. If all clauses are start-sorted the output is too.
#[derive(Debug)]
pub struct OrSpans {
    clauses: Vec<Box<dyn PositionIterator>>,
    guarantees: Guarantees,
    doc: DocId,
    /// Whether the clauses in the current document were moved to their
    /// first hit.
    primed: bool,
    /// Clause holding the current hit.
    current: Option<usize>,
}

impl OrSpans {
    /// Merge the hits of `clauses`.
    pub fn new(clauses: Vec<Box<dyn PositionIterator>>) -> Self {
        let guarantees = Guarantees::or(&clauses.iter().map(|c| *c.guarantees()).collect::<Vec<_>>());
        OrSpans {
            clauses,
            guarantees,
            doc: NOT_STARTED,
            primed: false,
            current: None,
        }
    }

    fn in_doc(&self, clause: usize) -> bool {
        self.clauses[clause].doc_id() == self.doc
    }

    fn land(&mut self) -> DocId {
        self.doc = self
            .clauses
            .iter()
            .map(|c| c.doc_id())
            .min()
            .unwrap_or(NO_MORE_DOCS);
        self.primed = false;
        self.current = None;
        self.doc
    }

    fn prime(&mut self) -> Result<()> {
        if !self.primed {
            for i in 0..self.clauses.len() {
                if self.in_doc(i) {
                    self.clauses[i].next_start_position()?;
                }
            }
            self.primed = true;
        }
        Ok(())
    }

    /// Make the clause with the smallest `(start, end)` current.
    fn pick(&mut self) -> Position {
        self.current = (0..self.clauses.len())
            .filter(|&i| self.in_doc(i) && self.clauses[i].start_position() != NO_MORE_POSITIONS)
            .min_by_key(|&i| (self.clauses[i].start_position(), self.clauses[i].end_position()));
        self.start_position()
    }
}

impl PositionIterator for OrSpans {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        for clause in self.clauses.iter_mut() {
            if clause.doc_id() <= self.doc {
                clause.next_doc()?;
            }
        }
        Ok(self.land())
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        for clause in self.clauses.iter_mut() {
            if clause.doc_id() < target {
                clause.advance(target)?;
            }
        }
        Ok(self.land())
    }

    fn next_start_position(&mut self) -> Result<Position> {
        if self.primed {
            match self.current {
                Some(i) => {
                    self.clauses[i].next_start_position()?;
                }
                None => return Ok(NO_MORE_POSITIONS),
            }
        } else {
            self.prime()?;
        }
        Ok(self.pick())
    }

    fn advance_start_position(&mut self, target: Position) -> Result<Position> {
        if !self.guarantees.start_sorted {
            return naive_advance_start_position(self, target);
        }
        if self.primed && self.current.is_none() {
            return Ok(NO_MORE_POSITIONS);
        }
        let primed = self.primed;
        for i in 0..self.clauses.len() {
            if !self.in_doc(i) {
                continue;
            }
            let start = self.clauses[i].start_position();
            let must_move = !primed || self.current == Some(i) || start < target;
            if must_move && start != NO_MORE_POSITIONS {
                self.clauses[i].advance_start_position(target)?;
            }
        }
        self.primed = true;
        Ok(self.pick())
    }

    fn start_position(&self) -> Position {
        match self.current {
            Some(i) => self.clauses[i].start_position(),
            None if self.primed => NO_MORE_POSITIONS,
            None => NOT_STARTED,
        }
    }

    fn end_position(&self) -> Position {
        match self.current {
            Some(i) => self.clauses[i].end_position(),
            None if self.primed => NO_MORE_POSITIONS,
            None => NOT_STARTED,
        }
    }

    fn cost(&self) -> u64 {
        self.clauses.iter().map(|c| c.cost()).sum()
    }

    fn positions_cost(&self) -> f32 {
        self.clauses.iter().map(|c| c.positions_cost()).sum()
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        if let Some(i) = self.current {
            self.clauses[i].get_match_info(match_info);
        }
    }

    fn has_match_info(&self) -> bool {
        self.clauses.iter().any(|c| c.has_match_info())
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        self.current.and_then(|i| self.clauses[i].active_relation())
    }

    fn payload(&self) -> Option<&[u8]> {
        self.current.and_then(|i| self.clauses[i].payload())
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
    fn test_merge() {
        let mut spans = OrSpans::new(vec![
            list(&[(0, 1, 2), (0, 4, 5), (3, 0, 1)]),
            list(&[(0, 1, 3), (1, 2, 3), (3, 0, 1)]),
        ]);
        assert!(spans.guarantees().start_sorted);
        assert!(!spans.guarantees().unique);
        assert_eq!(
            drain_hits(&mut spans).unwrap(),
            vec![(0, 1, 2), (0, 1, 3), (0, 4, 5), (1, 2, 3), (3, 0, 1), (3, 0, 1)]
        );
    }

    #[test]
    fn test_advance() {
        let mut spans = OrSpans::new(vec![
            list(&[(1, 0, 1), (5, 3, 4)]),
            list(&[(2, 0, 1), (5, 1, 2), (5, 6, 7)]),
        ]);
        assert_eq!(spans.advance(3).unwrap(), 5);
        assert_eq!(spans.advance_start_position(2).unwrap(), 3);
        assert_eq!(spans.next_start_position().unwrap(), 6);
        assert_eq!(spans.next_start_position().unwrap(), NO_MORE_POSITIONS);
        assert_eq!(spans.next_doc().unwrap(), NO_MORE_DOCS);
    }
}
