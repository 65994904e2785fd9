//! In-memory position iterator over a fixed list of hits.
//!
//! [`ListSpans`] is the workhorse of the test suites and benches: it replays
//! `(doc, start, end)` triples exactly in the order given, optionally with
//! per-hit payloads, match info and active relations. Its guarantees are
//! computed from the data unless overridden, so it can stand in for any
//! leaf or subtree.

use std::ops::Range;

use crate::error::Result;
use crate::spans::guarantees::Guarantees;
use crate::spans::match_info::MatchInfo;
use crate::spans::position::{
    confirmed_doc, match_info_slot, DocId, Position, PositionIterator, NOT_STARTED,
    NO_MORE_DOCS, NO_MORE_POSITIONS,
};
use crate::spans::relation_info::RelationInfo;

/// A position iterator replaying a list of hits.
#[derive(Debug, Clone)]
pub struct ListSpans {
    hits: Vec<(DocId, Position, Position)>,
    payloads: Vec<Option<Vec<u8>>>,
    infos: Vec<Vec<(usize, MatchInfo)>>,
    relations: Vec<Option<RelationInfo>>,
    /// Candidate documents; a superset of the documents with hits when
    /// two-phase matching is enabled.
    docs: Vec<DocId>,
    two_phase: bool,
    guarantees: Guarantees,

    doc: DocId,
    doc_slot: usize,
    range: Range<usize>,
    current: Option<usize>,
}

impl ListSpans {
    /// Create an iterator over `hits`, which must be grouped by ascending
    /// document id. Hits within a document are replayed in the given order.
    pub fn new(hits: Vec<(DocId, Position, Position)>) -> Self {
        debug_assert!(
            hits.windows(2).all(|w| w[0].0 <= w[1].0),
            "hits must be grouped by ascending document"
        );
        let mut docs: Vec<DocId> = hits.iter().map(|h| h.0).collect();
        docs.dedup();
        let guarantees = Self::derive_guarantees(&hits);
        let n = hits.len();
        ListSpans {
            hits,
            payloads: vec![None; n],
            infos: vec![Vec::new(); n],
            relations: vec![None; n],
            docs,
            two_phase: false,
            guarantees,
            doc: NOT_STARTED,
            doc_slot: 0,
            range: 0..0,
            current: None,
        }
    }

    /// Create an iterator from a slice of `(doc, start, end)` triples.
    pub fn from_triples(hits: &[(DocId, Position, Position)]) -> Self {
        Self::new(hits.to_vec())
    }

    /// Attach one payload per hit.
    pub fn with_payloads(mut self, payloads: Vec<Vec<u8>>) -> Self {
        debug_assert_eq!(payloads.len(), self.hits.len());
        self.payloads = payloads.into_iter().map(Some).collect();
        self
    }

    /// Attach a match info value per hit in slot `index`; `None` leaves the
    /// slot untouched for that hit.
    pub fn with_match_info(mut self, index: usize, infos: Vec<Option<MatchInfo>>) -> Self {
        debug_assert_eq!(infos.len(), self.hits.len());
        for (hit_infos, info) in self.infos.iter_mut().zip(infos) {
            if let Some(info) = info {
                hit_infos.push((index, info));
            }
        }
        self
    }

    /// Attach the active relation of each hit.
    pub fn with_relations(mut self, relations: Vec<Option<RelationInfo>>) -> Self {
        debug_assert_eq!(relations.len(), self.hits.len());
        self.relations = relations;
        self
    }

    /// Enable two-phase matching. `extra_candidates` are documents the
    /// approximation visits but `confirm` rejects.
    pub fn with_candidates(mut self, extra_candidates: &[DocId]) -> Self {
        self.docs.extend_from_slice(extra_candidates);
        self.docs.sort_unstable();
        self.docs.dedup();
        self.two_phase = true;
        self
    }

    /// Override the computed guarantees.
    pub fn with_guarantees(mut self, guarantees: Guarantees) -> Self {
        self.guarantees = guarantees;
        self
    }

    fn derive_guarantees(hits: &[(DocId, Position, Position)]) -> Guarantees {
        let same_doc = |a: &(DocId, Position, Position), b: &(DocId, Position, Position)| a.0 == b.0;
        let pairs = || hits.windows(2).filter(|w| same_doc(&w[0], &w[1]));

        let start_sorted = pairs().all(|w| (w[0].1, w[0].2) <= (w[1].1, w[1].2));
        let end_sorted = pairs().all(|w| (w[0].2, w[0].1) <= (w[1].2, w[1].1));

        let mut per_doc: Vec<(DocId, Position, Position)> = hits.to_vec();
        per_doc.sort_unstable();
        let adjacent = || per_doc.windows(2).filter(|w| w[0].0 == w[1].0);
        let unique = adjacent().all(|w| (w[0].1, w[0].2) != (w[1].1, w[1].2));
        let unique_start = {
            let mut starts: Vec<_> = hits.iter().map(|h| (h.0, h.1)).collect();
            starts.sort_unstable();
            starts.windows(2).all(|w| w[0] != w[1])
        };
        let unique_end = {
            let mut ends: Vec<_> = hits.iter().map(|h| (h.0, h.2)).collect();
            ends.sort_unstable();
            ends.windows(2).all(|w| w[0] != w[1])
        };

        let lengths = hits.iter().map(|h| (h.2 - h.1).max(0) as u32);
        let min_length = lengths.clone().min().unwrap_or(0);
        let max_length = lengths.max().unwrap_or(0);

        Guarantees {
            start_sorted,
            end_sorted,
            unique_start,
            unique_end,
            unique,
            unique_with_match_info: unique,
            all_same_length: min_length == max_length,
            min_length,
            max_length: Some(max_length),
            non_overlapping: false,
            okay_to_invert: false,
        }
    }

    fn enter_doc(&mut self, slot: usize) -> DocId {
        self.doc_slot = slot;
        self.current = None;
        if slot >= self.docs.len() {
            self.doc = NO_MORE_DOCS;
            self.range = self.hits.len()..self.hits.len();
            return NO_MORE_DOCS;
        }
        let doc = self.docs[slot];
        let begin = self.hits.partition_point(|h| h.0 < doc);
        let end = self.hits.partition_point(|h| h.0 <= doc);
        self.doc = doc;
        self.range = begin..end;
        doc
    }

    fn current_hit(&self) -> Option<&(DocId, Position, Position)> {
        self.current
            .filter(|&i| i < self.range.end)
            .map(|i| &self.hits[i])
    }
}

impl PositionIterator for ListSpans {
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
        let next = match self.current {
            None => self.range.start,
            Some(i) if i < self.range.end => i + 1,
            Some(i) => i,
        };
        self.current = Some(next.min(self.range.end));
        Ok(self.start_position())
    }

    fn start_position(&self) -> Position {
        match (self.current, self.current_hit()) {
            (None, _) => NOT_STARTED,
            (Some(_), Some(hit)) => hit.1,
            (Some(_), None) => NO_MORE_POSITIONS,
        }
    }

    fn end_position(&self) -> Position {
        match (self.current, self.current_hit()) {
            (None, _) => NOT_STARTED,
            (Some(_), Some(hit)) => hit.2,
            (Some(_), None) => NO_MORE_POSITIONS,
        }
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }

    fn positions_cost(&self) -> f32 {
        self.hits.len() as f32 / self.docs.len().max(1) as f32
    }

    fn guarantees(&self) -> &Guarantees {
        &self.guarantees
    }

    fn get_match_info(&self, match_info: &mut [Option<MatchInfo>]) {
        if let Some(i) = self.current.filter(|&i| i < self.range.end) {
            for (index, info) in &self.infos[i] {
                if let Some(slot) = match_info_slot(match_info, *index) {
                    *slot = Some(info.clone());
                }
            }
        }
    }

    fn has_match_info(&self) -> bool {
        self.infos.iter().any(|infos| !infos.is_empty())
    }

    fn active_relation(&self) -> Option<RelationInfo> {
        self.current
            .filter(|&i| i < self.range.end)
            .and_then(|i| self.relations[i])
    }

    fn payload(&self) -> Option<&[u8]> {
        self.current
            .filter(|&i| i < self.range.end)
            .and_then(|i| self.payloads[i].as_deref())
    }

    fn match_cost(&self) -> Option<f32> {
        self.two_phase.then_some(1.0)
    }

    fn approximation_next_doc(&mut self) -> Result<DocId> {
        let slot = if self.doc == NOT_STARTED {
            0
        } else {
            self.doc_slot + 1
        };
        Ok(self.enter_doc(slot))
    }

    fn approximation_advance(&mut self, target: DocId) -> Result<DocId> {
        let from = if self.doc == NOT_STARTED { 0 } else { self.doc_slot };
        let slot = from + self.docs[from.min(self.docs.len())..].partition_point(|&d| d < target);
        Ok(self.enter_doc(slot))
    }

    fn confirm(&mut self) -> Result<bool> {
        Ok(!self.range.is_empty())
    }
}

/// Drain all hits of `iter` as `(doc, start, end)` triples.
pub fn drain_hits(iter: &mut dyn PositionIterator) -> Result<Vec<(DocId, Position, Position)>> {
    let mut hits = Vec::new();
    while iter.next_doc()? != NO_MORE_DOCS {
        let doc = iter.doc_id();
        while iter.next_start_position()? != NO_MORE_POSITIONS {
            hits.push((doc, iter.start_position(), iter.end_position()));
        }
    }
    Ok(hits)
}
