//! Positional posting lists and the cursor reading them.
//!
//! A [`PostingList`] stores, for one term of one annotation, the documents
//! containing it and the token positions within each document. Every
//! position may carry a payload; relation and tag terms use it to store the
//! encoded [`RelationInfo`](crate::spans::relation_info::RelationInfo).

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::Result;
use crate::spans::position::{DocId, Position, NOT_STARTED, NO_MORE_DOCS, NO_MORE_POSITIONS};

/// A single posting: one document and the positions of the term in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// Document ID.
    pub doc_id: DocId,
    /// Positions of the term in the document, ascending.
    pub positions: Vec<Position>,
    /// Payload per position; empty when no position carries one.
    pub payloads: Vec<Vec<u8>>,
}

impl Posting {
    /// Create a posting without positions.
    pub fn new(doc_id: DocId) -> Self {
        Posting {
            doc_id,
            positions: Vec::new(),
            payloads: Vec::new(),
        }
    }

    /// Create a posting with positions and no payloads.
    pub fn with_positions(doc_id: DocId, mut positions: Vec<Position>) -> Self {
        positions.sort_unstable();
        Posting {
            doc_id,
            positions,
            payloads: Vec::new(),
        }
    }

    /// Add an occurrence, keeping positions sorted. Occurrences at the same
    /// position keep their insertion order.
    pub fn add_occurrence(&mut self, position: Position, payload: Option<Vec<u8>>) {
        let index = self.positions.partition_point(|&p| p <= position);
        // Payloads are either absent or parallel to the positions.
        if payload.is_some() || !self.payloads.is_empty() {
            self.payloads.resize(self.positions.len(), Vec::new());
            self.payloads.insert(index, payload.unwrap_or_default());
        }
        self.positions.insert(index, position);
    }

    /// Get the term frequency.
    pub fn frequency(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Payload of the occurrence at `index`, if any.
    pub fn payload(&self, index: usize) -> Option<&[u8]> {
        self.payloads.get(index).map(|p| p.as_slice())
    }
}

/// A posting list for a specific term.
#[derive(Debug, Clone)]
pub struct PostingList {
    /// The term this posting list represents.
    pub term: String,
    /// The postings in this list, sorted by document id.
    pub postings: Vec<Posting>,
    /// Total number of occurrences across all documents.
    pub total_frequency: u64,
}

impl PostingList {
    /// Create a new empty posting list.
    pub fn new<S: Into<String>>(term: S) -> Self {
        PostingList {
            term: term.into(),
            postings: Vec::new(),
            total_frequency: 0,
        }
    }

    /// Add one occurrence of the term.
    pub fn add_occurrence(&mut self, doc_id: DocId, position: Position, payload: Option<Vec<u8>>) {
        self.total_frequency += 1;

        // Insert in sorted order by doc_id
        match self.postings.binary_search_by_key(&doc_id, |p| p.doc_id) {
            Ok(pos) => self.postings[pos].add_occurrence(position, payload),
            Err(pos) => {
                let mut posting = Posting::new(doc_id);
                posting.add_occurrence(position, payload);
                self.postings.insert(pos, posting);
            }
        }
    }

    /// Add a whole posting, merging with an existing one for the same
    /// document.
    pub fn add_posting(&mut self, posting: Posting) {
        self.total_frequency += posting.frequency() as u64;
        match self.postings.binary_search_by_key(&posting.doc_id, |p| p.doc_id) {
            Ok(pos) => {
                let existing = &mut self.postings[pos];
                for (i, position) in posting.positions.iter().enumerate() {
                    existing.add_occurrence(*position, posting.payloads.get(i).cloned());
                }
            }
            Err(pos) => self.postings.insert(pos, posting),
        }
    }

    /// Number of documents containing the term.
    pub fn doc_frequency(&self) -> u64 {
        self.postings.len() as u64
    }

    /// Get the posting for a document.
    pub fn get_posting(&self, doc_id: DocId) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|index| &self.postings[index])
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

/// Per-document, per-position access to a posting list.
///
/// The contract mirrors the position iterator protocol: `doc_id()` is
/// [`NOT_STARTED`] before the first call to `next_doc`/`advance`, and
/// `next_position` may be called at most [`PostingSource::freq`] times per
/// document.
pub trait PostingSource: Send + Debug {
    /// Current document.
    fn doc_id(&self) -> DocId;

    /// Move to the next document.
    fn next_doc(&mut self) -> Result<DocId>;

    /// Move to the first document `>= target`.
    fn advance(&mut self, target: DocId) -> Result<DocId>;

    /// Number of positions in the current document.
    fn freq(&self) -> u32;

    /// Read the next position of the current document.
    fn next_position(&mut self) -> Result<Position>;

    /// Payload of the position last read, if any.
    fn payload(&self) -> Option<&[u8]>;

    /// Number of documents this source can visit.
    fn cost(&self) -> u64;

    /// Average number of positions per document.
    fn positions_cost(&self) -> f32;
}

/// A [`PostingSource`] over a shared in-memory [`PostingList`].
#[derive(Debug, Clone)]
pub struct PostingListSource {
    list: Arc<PostingList>,
    /// Index of the current posting; `None` before the first document.
    index: Option<usize>,
    /// Number of positions read in the current document.
    read: usize,
}

impl PostingListSource {
    /// Create a cursor at the start of `list`.
    pub fn new(list: Arc<PostingList>) -> Self {
        PostingListSource {
            list,
            index: None,
            read: 0,
        }
    }

    fn current(&self) -> Option<&Posting> {
        self.index.and_then(|index| self.list.postings.get(index))
    }

    fn seek(&mut self, index: usize) -> DocId {
        self.index = Some(index);
        self.read = 0;
        self.doc_id()
    }
}

impl PostingSource for PostingListSource {
    fn doc_id(&self) -> DocId {
        match self.index {
            None => NOT_STARTED,
            Some(_) => self.current().map(|p| p.doc_id).unwrap_or(NO_MORE_DOCS),
        }
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let next = self.index.map(|index| index + 1).unwrap_or(0);
        Ok(self.seek(next.min(self.list.postings.len())))
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let from = self.index.map(|index| index + 1).unwrap_or(0).min(self.list.postings.len());
        let offset = self.list.postings[from..].partition_point(|p| p.doc_id < target);
        Ok(self.seek(from + offset))
    }

    fn freq(&self) -> u32 {
        self.current().map(|p| p.frequency()).unwrap_or(0)
    }

    fn next_position(&mut self) -> Result<Position> {
        let position = self
            .current()
            .and_then(|p| p.positions.get(self.read).copied())
            .unwrap_or(NO_MORE_POSITIONS);
        self.read += 1;
        Ok(position)
    }

    fn payload(&self) -> Option<&[u8]> {
        if self.read == 0 {
            return None;
        }
        self.current().and_then(|p| p.payload(self.read - 1))
    }

    fn cost(&self) -> u64 {
        self.list.doc_frequency()
    }

    fn positions_cost(&self) -> f32 {
        self.list.total_frequency as f32 / self.list.doc_frequency().max(1) as f32
    }
}
