//! Named span captures (`A:[]`).

use crate::error::Result;
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{is_on_hit, match_info_slot, DocId, Position, PositionIterator};
use crate::spans::relation_info::RelationInfo;

/// Stores each clause hit, optionally adjusted, as a span match info.
#[derive(Debug)]
pub struct CaptureSpans {
    clause: Box<dyn PositionIterator>,
    index: usize,
    left_adjust: i32,
    right_adjust: i32,
}

impl CaptureSpans {
    /// Capture `clause` hits in match info slot `index`.
    pub fn new(clause: Box<dyn PositionIterator>, index: usize) -> Self {
        Self::with_adjust(clause, index, 0, 0)
    }

    /// Capture `clause` hits, moving the captured start by `left_adjust`
    /// and the captured end by `right_adjust` tokens.
    pub fn with_adjust(
        clause: Box<dyn PositionIterator>,
        index: usize,
        left_adjust: i32,
        right_adjust: i32,
    ) -> Self {
        CaptureSpans {
            clause,
            index,
            left_adjust,
            right_adjust,
        }
    }
}

impl PositionIterator for CaptureSpans {
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
        self.clause.next_start_position()
    }

    fn advance_start_position(&mut self, target: Position) -> Result<Position> {
        self.clause.advance_start_position(target)
    }

    fn start_position(&self) -> Position {
        self.clause.start_position()
    }

    fn end_position(&self) -> Position {
        self.clause.end_position()
    }

    fn cost(&self) -> u64 {
        self.clause.cost()
    }

    fn positions_cost(&self) -> f32 {
        self.clause.positions_cost()
    }

    fn guarantees(&self) -> &Guarantees {
        self.clause.guarantees()
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        debug_assert!(is_on_hit(self.clause.start_position()), "capture read before a hit");
        self.clause.get_match_info(match_info);
        if let Some(slot) = match_info_slot(match_info, self.index) {
            *slot = Some(MatchInfo::span(
                self.clause.start_position() + self.left_adjust,
                self.clause.end_position() + self.right_adjust,
            ));
        }
    }

    fn has_match_info(&self) -> bool {
        true
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        self.clause.active_relation()
    }

    fn payload(&self) -> Option<&[u8]> {
        self.clause.payload()
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
    use crate::spans::list::ListSpans;

    #[test]
    fn test_capture_with_adjust() {
        let clause = ListSpans::from_triples(&[(0, 2, 5)]);
        let mut spans = CaptureSpans::with_adjust(Box::new(clause), 1, 1, -1);
        assert!(spans.has_match_info());
        spans.next_doc().unwrap();
        spans.next_start_position().unwrap();

        let mut match_info = vec![None, None];
        spans.get_match_info(&mut match_info);
        assert_eq!(match_info, vec![None, Some(MatchInfo::span(3, 4))]);
        assert_eq!((spans.start_position(), spans.end_position()), (2, 5));
    }

    #[test]
    fn test_nested_captures() {
        let inner = CaptureSpans::new(Box::new(ListSpans::from_triples(&[(0, 1, 3)])), 0);
        let mut outer = CaptureSpans::new(Box::new(inner), 1);
        outer.next_doc().unwrap();
        outer.next_start_position().unwrap();

        let mut match_info = vec![None, None];
        outer.get_match_info(&mut match_info);
        assert_eq!(match_info[0], Some(MatchInfo::span(1, 3)));
        assert_eq!(match_info[1], Some(MatchInfo::span(1, 3)));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside an array of 1 slots")]
    fn test_undersized_match_info_array() {
        let mut spans = CaptureSpans::new(Box::new(ListSpans::from_triples(&[(0, 1, 3)])), 1);
        spans.next_doc().unwrap();
        spans.next_start_position().unwrap();
        spans.get_match_info(&mut [None]);
    }
}
