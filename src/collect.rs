//! Pulling hits out of an iterator tree.
//!
//! The engine itself only moves iterators forward; these helpers drain a
//! root iterator into [`Hit`]s with their named captures, one segment at a
//! time or across all segments of a [`MemoryIndex`] in parallel.

use std::collections::BTreeMap;

use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::index::MemoryIndex;
use crate::query::BoundQuery;
use crate::spans::match_info::{MatchInfo, MatchInfoDefs};
use crate::spans::position::{DocId, NO_MORE_DOCS, NO_MORE_POSITIONS, Position, PositionIterator};

/// One hit with the match info set at that hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    /// Document id, relative to the segment.
    pub doc: DocId,
    pub start: Position,
    pub end: Position,
    /// Captures and relations by name; unset slots are left out.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub captures: BTreeMap<String, MatchInfo>,
}

/// Hits found in one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentHits {
    pub segment: usize,
    /// Global id of the segment's first document.
    pub doc_base: DocId,
    pub hits: Vec<Hit>,
}

impl SegmentHits {
    /// Iterate over hits with index-wide document ids.
    pub fn global_hits(&self) -> impl Iterator<Item = (DocId, &Hit)> {
        self.hits.iter().map(move |hit| (self.doc_base + hit.doc, hit))
    }
}

/// Drain every hit of `spans`, reading match info after each one.
pub fn collect_hits(spans: &mut dyn PositionIterator, defs: &MatchInfoDefs) -> Result<Vec<Hit>> {
    let with_info = !defs.is_empty() && spans.has_match_info();
    let mut match_info = defs.new_array();
    let mut hits = Vec::new();

    while spans.next_doc()? != NO_MORE_DOCS {
        let doc = spans.doc_id();
        while spans.next_start_position()? != NO_MORE_POSITIONS {
            let mut captures = BTreeMap::new();
            if with_info {
                match_info.iter_mut().for_each(|slot| *slot = None);
                spans.get_match_info(&mut match_info);
                for (def, info) in defs.iter().zip(&match_info) {
                    if let Some(info) = info {
                        captures.insert(def.name.clone(), info.clone());
                    }
                }
            }
            hits.push(Hit {
                doc,
                start: spans.start_position(),
                end: spans.end_position(),
                captures,
            });
        }
    }
    Ok(hits)
}

/// Run `query` on every segment of `index`, one independent iterator tree
/// per segment, in parallel. Results are in segment order.
pub fn collect_hits_per_segment(query: &BoundQuery, index: &MemoryIndex) -> Result<Vec<SegmentHits>> {
    let mut doc_base = 0;
    let bases: Vec<DocId> = index
        .segments()
        .iter()
        .map(|segment| {
            let base = doc_base;
            doc_base += segment.max_doc();
            base
        })
        .collect();

    index
        .segments()
        .par_iter()
        .zip(bases)
        .map(|(segment, doc_base)| {
            let mut spans = query.create_iterator(segment)?;
            let hits = collect_hits(spans.as_mut(), query.defs())?;
            debug!("segment {}: {} hits", segment.id(), hits.len());
            Ok(SegmentHits {
                segment: segment.id(),
                doc_base,
                hits,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{IndexContext, SpanQuery};
    use crate::spans::list::ListSpans;
    use crate::spans::match_info::{MatchInfoKind, MatchInfoRegistry};

    #[test]
    fn test_collects_captures_by_name() {
        let mut registry = MatchInfoRegistry::new();
        registry.register("x", MatchInfoKind::Span, "contents").unwrap();
        registry.register("y", MatchInfoKind::Span, "contents").unwrap();
        let defs = registry.freeze();

        let mut spans = ListSpans::from_triples(&[(0, 1, 3), (2, 0, 1)])
            .with_match_info(0, vec![Some(MatchInfo::span(1, 2)), None]);
        let hits = collect_hits(&mut spans, &defs).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!((hits[0].doc, hits[0].start, hits[0].end), (0, 1, 3));
        assert_eq!(hits[0].captures.get("x"), Some(&MatchInfo::span(1, 2)));
        assert!(!hits[0].captures.contains_key("y"));
        assert!(hits[1].captures.is_empty());
    }

    #[test]
    fn test_per_segment_doc_base() {
        let index = MemoryIndex::from_json_str(
            r#"{"segment_size": 2, "documents": [
                {"fields": {"contents": {"annotations": {"word": ["a", "b"]}}}},
                {"fields": {"contents": {"annotations": {"word": ["b"]}}}},
                {"fields": {"contents": {"annotations": {"word": ["b", "a"]}}}}
            ]}"#,
        )
        .unwrap();
        let bound = SpanQuery::term("a").bind(&IndexContext::default()).unwrap();
        let results = collect_hits_per_segment(&bound, &index).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[1].doc_base, 2);
        let global: Vec<_> = results
            .iter()
            .flat_map(|segment| segment.global_hits().map(|(doc, hit)| (doc, hit.start)))
            .collect();
        assert_eq!(global, vec![(0, 0), (2, 1)]);
    }
}
