//! Leading or trailing edge of each clause hit, as a zero-length hit.

use crate::error::Result;
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{DocId, Position, PositionIterator, NOT_STARTED, NO_MORE_POSITIONS};
use crate::spans::relation_info::RelationInfo;

/// Zero-length hits at the start or end of each clause hit.
#[derive(Debug)]
pub struct EdgeSpans {
    clause: Box<dyn PositionIterator>,
    trailing: bool,
    guarantees: Guarantees,
}

impl EdgeSpans {
    /// Take the leading edge of `clause` hits, or the trailing edge if
    /// `trailing` is set.
    pub fn new(clause: Box<dyn PositionIterator>, trailing: bool) -> Self {
        let guarantees = Guarantees::edge(clause.guarantees(), trailing);
        EdgeSpans {
            clause,
            trailing,
            guarantees,
        }
    }

    fn edge(&self) -> Position {
        let start = self.clause.start_position();
        if !self.trailing || start == NOT_STARTED || start == NO_MORE_POSITIONS {
            start
        } else {
            self.clause.end_position()
        }
    }
}

impl PositionIterator for EdgeSpans {
    fn doc_id(&self) -> DocId {
        self.clause.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.clause.next_doc()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.clause.advance(target)
    }

    fn next_start_position(&mut self) -> Result<Position> {
        self.clause.next_start_position()?;
        Ok(self.edge())
    }

    fn advance_start_position(&mut self, target: Position) -> Result<Position> {
        if self.trailing {
            // An end at or after target may belong to an earlier start.
            loop {
                let start = self.clause.next_start_position()?;
                if start == NO_MORE_POSITIONS || self.clause.end_position() >= target {
                    return Ok(self.edge());
                }
            }
        }
        self.clause.advance_start_position(target)
    }

    fn start_position(&self) -> Position {
        self.edge()
    }

    fn end_position(&self) -> Position {
        self.edge()
    }

    fn cost(&self) -> u64 {
        self.clause.cost()
    }

    fn positions_cost(&self) -> f32 {
        self.clause.positions_cost()
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        self.clause.get_match_info(match_info);
    }

    fn has_match_info(&self) -> bool {
        self.clause.has_match_info()
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        self.clause.active_relation()
    }

    fn match_cost(&self) -> Option<f32> {
        self.clause.match_cost()
    }

    fn approximation_next_doc(&mut self) -> Result<DocId> {
        self.clause.approximation_next_doc()
    }

    fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        self.clause.approximation_advance(target)
    }

    fn confirm(&mut self) -> Result<bool> {
        self.clause.confirm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::list::{drain_hits, ListSpans};

    #[test]
    fn test_leading_edge() {
        let clause = ListSpans::from_triples(&[(0, 1, 4), (0, 2, 3), (2, 5, 9)]);
        let mut spans = EdgeSpans::new(Box::new(clause), false);
        assert_eq!(
            drain_hits(&mut spans).unwrap(),
            vec![(0, 1, 1), (0, 2, 2), (2, 5, 5)]
        );
        assert_eq!(spans.guarantees().max_length, Some(0));
    }

    #[test]
    fn test_trailing_edge() {
        let clause = ListSpans::from_triples(&[(0, 1, 4), (0, 2, 3)]);
        let mut spans = EdgeSpans::new(Box::new(clause), true);
        assert_eq!(drain_hits(&mut spans).unwrap(), vec![(0, 4, 4), (0, 3, 3)]);
        assert!(!spans.guarantees().start_sorted);
    }

    #[test]
    fn test_trailing_edge_advance() {
        let clause = ListSpans::from_triples(&[(0, 0, 2), (0, 1, 6), (0, 3, 4)]);
        let mut spans = EdgeSpans::new(Box::new(clause), true);
        spans.next_doc().unwrap();
        assert_eq!(spans.advance_start_position(5).unwrap(), 6);
        assert_eq!(spans.advance_start_position(5).unwrap(), NO_MORE_POSITIONS);
    }
}
