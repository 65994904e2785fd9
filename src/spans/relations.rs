//! Relation hits decoded from relation postings.
//!
//! Each posting of a relation type carries a payload describing one
//! relation. The payload is decoded while deciding whether the hit passes
//! the direction filter; the resulting span depends on the [`SpanMode`].

use crate::error::{Result, SpanlabError};
use crate::spans::filter::{AcceptStatus, FilteredSpans, HitFilter};
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{match_info_slot, Position, PositionIterator};
use crate::spans::relation_info::{Direction, RelationInfo, SpanMode};

/// Relation hits: a [`FilteredSpans`] over the relation postings.
pub type RelationsSpans = FilteredSpans<RelationFilter>;

/// Decodes relation payloads and applies the direction filter.
#[derive(Debug)]
pub struct RelationFilter {
    direction: Direction,
    mode: SpanMode,
    capture: Option<usize>,
    current: Option<RelationInfo>,
}

impl RelationFilter {
    /// The relation of the current hit.
    pub fn current(&self) -> Option<RelationInfo> {
        self.current
    }

    /// Which span of the relation hits cover.
    pub fn mode(&self) -> SpanMode {
        self.mode
    }
}

impl HitFilter for RelationFilter {
    fn accept(&mut self, inner: &mut dyn PositionIterator) -> Result<AcceptStatus> {
        let payload = inner.payload().ok_or_else(|| {
            SpanlabError::payload(format!(
                "relation posting without payload in document {} at position {}",
                inner.doc_id(),
                inner.start_position()
            ))
        })?;
        let info = RelationInfo::decode(inner.start_position(), payload)?;
        if (self.mode == SpanMode::Source && info.root) || !self.direction.accepts(&info) {
            self.current = None;
            return Ok(AcceptStatus::No);
        }
        self.current = Some(info);
        Ok(AcceptStatus::Yes)
    }

    fn start(&self, inner: &dyn PositionIterator) -> Position {
        match self.current {
            Some(info) => info.span_start(self.mode),
            None => inner.start_position(),
        }
    }

    fn end(&self, inner: &dyn PositionIterator) -> Position {
        match self.current {
            Some(info) => info.span_end(self.mode),
            None => inner.end_position(),
        }
    }

    fn get_match_info(&self, inner: &dyn PositionIterator, match_info: &mut [Option<MatchInfo>]) {
        debug_assert!(self.current.is_some(), "relation match info read before a hit");
        inner.get_match_info(match_info);
        if let (Some(info), Some(slot)) = (self.current, self.capture.and_then(|i| match_info_slot(match_info, i))) {
            *slot = Some(MatchInfo::Relation(info));
        }
    }

    fn has_match_info(&self, inner: &dyn PositionIterator) -> bool {
        self.capture.is_some() || inner.has_match_info()
    }

    fn active_relation(&self, _inner: &dyn PositionIterator) -> Option<RelationInfo> {
        self.current
    }

    fn preserves_start(&self) -> bool {
        match self.mode {
            SpanMode::Source => true,
            SpanMode::FullSpan => matches!(self.direction, Direction::Forward | Direction::Root),
            SpanMode::Target | SpanMode::AllSpans => self.direction == Direction::Root,
        }
    }

    fn cost(&self) -> f32 {
        // One payload decode per posting.
        2.0
    }
}

impl RelationsSpans {
    /// Decode relations from `inner`, the postings of one relation type.
    /// If `capture` is set, the relation is stored as match info in that
    /// slot.
    pub fn relations(
        inner: Box<dyn PositionIterator>,
        direction: Direction,
        mode: SpanMode,
        capture: Option<usize>,
    ) -> Result<Self> {
        if mode == SpanMode::AllSpans {
            return Err(SpanlabError::unsupported(
                "span mode all_spans only applies to relation lists",
            ));
        }
        let guarantees = Guarantees::relations(inner.guarantees(), direction, mode);
        let filter = RelationFilter {
            direction,
            mode,
            capture,
            current: None,
        };
        Ok(FilteredSpans::new(inner, filter, guarantees))
    }
}
