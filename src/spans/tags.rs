//! Inline tag hits (`<s/>`, `<named-entity/>`, ...).
//!
//! A tag is indexed as a posting at its start position whose payload holds
//! the tag length. The end is only decoded when somebody asks for it.

use std::cell::Cell;

use crate::error::{Result, SpanlabError};
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{
    is_on_hit, match_info_slot, DocId, Position, PositionIterator, NO_MORE_POSITIONS,
};
use crate::spans::relation_info::RelationInfo;

/// Lazy decode state of the current hit's end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Not on a hit (before the first one or past the last one).
    NotStarted,
    /// On a hit whose payload hasn't been read yet.
    PendingDecode,
    Decoded(Position),
    /// The payload couldn't be decoded; reported by the next advancing call.
    Malformed,
}

/// Hits spanning each occurrence of an inline tag.
#[derive(Debug)]
pub struct TagSpans {
    inner: Box<dyn PositionIterator>,
    guarantees: Guarantees,
    capture: Option<usize>,
    end: Cell<DecodeState>,
}

impl TagSpans {
    /// Decode tags from `inner`, the postings of the tag term. If `capture`
    /// is set, the tag is stored as an inline tag match info in that slot.
    pub fn new(inner: Box<dyn PositionIterator>, capture: Option<usize>) -> Self {
        TagSpans {
            inner,
            guarantees: Guarantees::tags(),
            capture,
            end: Cell::new(DecodeState::NotStarted),
        }
    }

    fn decode_end(&self) -> Option<Position> {
        let payload = self.inner.payload()?;
        let length = RelationInfo::decode_tag_length(payload).ok()?;
        (length >= 0).then(|| self.inner.start_position() + length)
    }

    fn check_malformed(&self) -> Result<()> {
        if self.end.get() == DecodeState::Malformed {
            return Err(SpanlabError::payload(format!(
                "malformed tag payload in document {} at position {}",
                self.inner.doc_id(),
                self.inner.start_position()
            )));
        }
        Ok(())
    }

    fn on_position(&mut self, start: Position) -> Position {
        self.end.set(if start == NO_MORE_POSITIONS {
            DecodeState::NotStarted
        } else {
            DecodeState::PendingDecode
        });
        start
    }
}

impl PositionIterator for TagSpans {
    fn doc_id(&self) -> DocId {
        self.inner.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.check_malformed()?;
        self.end.set(DecodeState::NotStarted);
        self.inner.next_doc()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.check_malformed()?;
        self.end.set(DecodeState::NotStarted);
        self.inner.advance(target)
    }

    fn next_start_position(&mut self) -> Result<Position> {
        self.check_malformed()?;
        let start = self.inner.next_start_position()?;
        Ok(self.on_position(start))
    }

    fn advance_start_position(&mut self, target: Position) -> Result<Position> {
        self.check_malformed()?;
        let start = self.inner.advance_start_position(target)?;
        Ok(self.on_position(start))
    }

    fn start_position(&self) -> Position {
        self.inner.start_position()
    }

    fn end_position(&self) -> Position {
        match self.end.get() {
            DecodeState::NotStarted => self.inner.end_position(),
            DecodeState::Decoded(end) => end,
            DecodeState::Malformed => self.inner.start_position(),
            DecodeState::PendingDecode => match self.decode_end() {
                Some(end) => {
                    self.end.set(DecodeState::Decoded(end));
                    end
                }
                None => {
                    self.end.set(DecodeState::Malformed);
                    self.inner.start_position()
                }
            },
        }
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }

    fn positions_cost(&self) -> f32 {
        self.inner.positions_cost()
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        debug_assert!(is_on_hit(self.start_position()), "tag match info read before a hit");
        if let Some(slot) = self.capture.and_then(|index| match_info_slot(match_info, index)) {
            let tag = RelationInfo::inline_tag(self.start_position(), self.end_position());
            *slot = Some(MatchInfo::Relation(tag));
        }
    }

    fn has_match_info(&self) -> bool {
        self.capture.is_some()
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        Some(RelationInfo::inline_tag(self.start_position(), self.end_position()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::list::{drain_hits, ListSpans};
    use crate::spans::position::NOT_STARTED;

    fn tag_postings(tags: &[(DocId, Position, Position)]) -> ListSpans {
        let triples: Vec<_> = tags.iter().map(|&(doc, start, _)| (doc, start, start + 1)).collect();
        let payloads = tags
            .iter()
            .map(|&(_, start, end)| RelationInfo::encode_inline_tag(start, end))
            .collect();
        ListSpans::new(triples).with_payloads(payloads)
    }

    #[test]
    fn test_tag_spans() {
        let mut spans = TagSpans::new(Box::new(tag_postings(&[(0, 0, 4), (0, 5, 9), (3, 2, 2)])), None);
        assert_eq!(
            drain_hits(&mut spans).unwrap(),
            vec![(0, 0, 4), (0, 5, 9), (3, 2, 2)]
        );
    }

    #[test]
    fn test_end_before_first_position() {
        let mut spans = TagSpans::new(Box::new(tag_postings(&[(0, 1, 3)])), Some(0));
        spans.next_doc().unwrap();
        assert_eq!(spans.end_position(), NOT_STARTED);
        spans.next_start_position().unwrap();

        let mut match_info = vec![None];
        spans.get_match_info(&mut match_info);
        assert_eq!(
            match_info[0],
            Some(MatchInfo::Relation(RelationInfo::inline_tag(1, 3)))
        );
    }

    #[test]
    fn test_malformed_payload() {
        // A continuation bit with nothing after it.
        let postings = ListSpans::from_triples(&[(0, 1, 2), (0, 4, 5)]).with_payloads(vec![vec![0x80], vec![2]]);
        let mut spans = TagSpans::new(Box::new(postings), None);
        spans.next_doc().unwrap();
        assert_eq!(spans.next_start_position().unwrap(), 1);
        assert_eq!(spans.end_position(), 1);

        match spans.next_start_position() {
            Err(SpanlabError::Payload(_)) => {}
            other => panic!("Expected payload error, got {other:?}"),
        }
    }
}
