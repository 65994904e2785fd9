//! Single-term hits read from a posting source.

use crate::error::Result;
use crate::index::posting::PostingSource;
use crate::spans::guarantees::Guarantees;
use crate::spans::position::{
    is_in_document, DocId, Position, PositionIterator, NOT_STARTED, NO_MORE_DOCS, NO_MORE_POSITIONS,
};

/// One-token hits at every position of a term.
///
/// The payload of the current position is exposed through
/// [`PositionIterator::payload`] for the tag and relation decoders wrapping
/// this iterator.
#[derive(Debug)]
pub struct TermSpans {
    source: Box<dyn PostingSource>,
    guarantees: Guarantees,
    freq: u32,
    read: u32,
    position: Position,
}

impl TermSpans {
    /// Create term hits over `source`.
    pub fn new(source: Box<dyn PostingSource>) -> Self {
        TermSpans {
            source,
            guarantees: Guarantees::TERM,
            freq: 0,
            read: 0,
            position: NOT_STARTED,
        }
    }

    /// Override the guarantees; relation postings share one position
    /// between several relations, so they are not unique.
    pub fn with_guarantees(mut self, guarantees: Guarantees) -> Self {
        self.guarantees = guarantees;
        self
    }

    fn enter_doc(&mut self, doc: DocId) -> DocId {
        self.freq = if doc == NO_MORE_DOCS { 0 } else { self.source.freq() };
        self.read = 0;
        self.position = NOT_STARTED;
        doc
    }
}

impl PositionIterator for TermSpans {
    fn doc_id(&self) -> DocId {
        self.source.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let doc = self.source.next_doc()?;
        Ok(self.enter_doc(doc))
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let doc = self.source.advance(target)?;
        Ok(self.enter_doc(doc))
    }

    fn next_start_position(&mut self) -> Result<Position> {
        debug_assert!(
            is_in_document(self.doc_id()),
            "next_start_position called outside a document (doc {})",
            self.doc_id()
        );
        if self.read >= self.freq {
            self.position = NO_MORE_POSITIONS;
        } else {
            self.position = self.source.next_position()?;
            self.read += 1;
        }
        Ok(self.position)
    }

    fn start_position(&self) -> Position {
        self.position
    }

    fn end_position(&self) -> Position {
        match self.position {
            NOT_STARTED | NO_MORE_POSITIONS => self.position,
            position => position + 1,
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

    fn payload(&self) -> Option<&[u8]> {
        match self.position {
            NOT_STARTED | NO_MORE_POSITIONS => None,
            _ => self.source.payload(),
        }
    }
}
