//! Hits that belong to another field than the one they were found in.
//!
//! Used below a cross-field relation: the clause matches in the target
//! field, so only match info registered for that field is filled in.

use std::cell::RefCell;

use crate::error::Result;
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::{MatchInfo, MatchInfoDefs};
use crate::spans::position::{DocId, Position, PositionIterator};
use crate::spans::relation_info::RelationInfo;

/// A clause whose hits are reported as belonging to `field`.
#[derive(Debug)]
pub struct OverrideFieldSpans {
    clause: Box<dyn PositionIterator>,
    field: String,
    /// Per match info slot, whether it is registered for `field`.
    slots: Vec<bool>,
    /// Match info of the clause before filtering by field.
    scratch: RefCell<Vec<Option<MatchInfo>>>,
}

impl OverrideFieldSpans {
    /// Report `clause` hits as belonging to `field`.
    pub fn new(clause: Box<dyn PositionIterator>, field: &str, defs: &MatchInfoDefs) -> Self {
        OverrideFieldSpans {
            clause,
            field: field.to_string(),
            slots: defs.slots_for_field(field),
            scratch: RefCell::new(defs.new_array()),
        }
    }

    /// The field hits belong to.
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl PositionIterator for OverrideFieldSpans {
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
        let mut own = self.scratch.borrow_mut();
        own.clear();
        own.resize(match_info.len(), None);
        self.clause.get_match_info(&mut own);
        for ((slot, value), &ours) in match_info.iter_mut().zip(own.iter_mut()).zip(&self.slots) {
            if ours && value.is_some() {
                *slot = value.take();
            }
        }
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
    use crate::spans::list::ListSpans;
    use crate::spans::match_info::{MatchInfoKind, MatchInfoRegistry};

    #[test]
    fn test_fills_only_own_field() {
        let mut registry = MatchInfoRegistry::new();
        registry.register("src", MatchInfoKind::Span, "contents").unwrap();
        registry.register("tgt", MatchInfoKind::Span, "translation").unwrap();
        let defs = registry.freeze();

        let clause = ListSpans::from_triples(&[(0, 1, 2)])
            .with_match_info(0, vec![Some(MatchInfo::span(1, 2))])
            .with_match_info(1, vec![Some(MatchInfo::span(7, 8))]);
        let mut spans = OverrideFieldSpans::new(Box::new(clause), "translation", &defs);
        assert_eq!(spans.field(), "translation");
        spans.next_doc().unwrap();
        spans.next_start_position().unwrap();

        let mut match_info = defs.new_array();
        spans.get_match_info(&mut match_info);
        assert_eq!(match_info, vec![None, Some(MatchInfo::span(7, 8))]);
    }

    #[test]
    fn test_previous_hit_does_not_leak() {
        let mut registry = MatchInfoRegistry::new();
        registry.register("a", MatchInfoKind::Span, "translation").unwrap();
        registry.register("b", MatchInfoKind::Span, "translation").unwrap();
        let defs = registry.freeze();

        let clause = ListSpans::from_triples(&[(0, 1, 2), (0, 3, 4)])
            .with_match_info(0, vec![Some(MatchInfo::span(1, 2)), Some(MatchInfo::span(3, 4))])
            .with_match_info(1, vec![Some(MatchInfo::span(1, 2)), None]);
        let mut spans = OverrideFieldSpans::new(Box::new(clause), "translation", &defs);
        spans.next_doc().unwrap();

        spans.next_start_position().unwrap();
        let mut match_info = defs.new_array();
        spans.get_match_info(&mut match_info);
        assert_eq!(match_info, vec![Some(MatchInfo::span(1, 2)), Some(MatchInfo::span(1, 2))]);

        spans.next_start_position().unwrap();
        let mut match_info = defs.new_array();
        spans.get_match_info(&mut match_info);
        assert_eq!(match_info, vec![Some(MatchInfo::span(3, 4)), None]);
    }
}
