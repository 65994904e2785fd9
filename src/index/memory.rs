//! In-memory index made of segments.

use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::error::Result;
use crate::index::corpus::Corpus;
use crate::index::segment::{Segment, SegmentBuilder};

/// An immutable in-memory index.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    segments: Vec<Arc<Segment>>,
}

impl MemoryIndex {
    /// Create an index from already built segments.
    pub fn new(segments: Vec<Segment>) -> Self {
        MemoryIndex {
            segments: segments.into_iter().map(Arc::new).collect(),
        }
    }

    /// Index `corpus`, splitting it into segments of at most
    /// `corpus.segment_size` documents.
    pub fn from_corpus(corpus: &Corpus) -> Result<Self> {
        let field_names = Arc::new(corpus.field_names());
        let segment_size = corpus
            .segment_size
            .filter(|&size| size > 0)
            .unwrap_or(corpus.documents.len().max(1));

        let mut segments = Vec::new();
        for (id, documents) in corpus.documents.chunks(segment_size).enumerate() {
            let mut builder = SegmentBuilder::new(id, Arc::clone(&field_names));
            for document in documents {
                let doc = builder.start_document();
                for (field, content) in &document.fields {
                    for (annotation, values) in &content.annotations {
                        builder.add_annotation(doc, field, annotation, values);
                    }
                    // Postings sharing a position keep insertion order; add
                    // tags and relations in span order so their hits are
                    // (start, end) sorted.
                    let mut tags: Vec<_> = content.tags.iter().collect();
                    tags.sort_by_key(|tag| (tag.start, tag.end));
                    for tag in tags {
                        builder.add_tag(doc, field, &tag.name, tag.start, tag.end)?;
                    }
                    let mut relations = Vec::with_capacity(content.relations.len());
                    for relation in &content.relations {
                        let info = relation.to_relation_info(|name| {
                            field_names.iter().position(|f| f == name).map(|i| i as u32)
                        })?;
                        relations.push((info, relation.relation_type.as_str()));
                    }
                    relations.sort();
                    for (info, relation_type) in relations {
                        builder.add_relation(doc, field, relation_type, &info)?;
                    }
                }
            }
            segments.push(builder.build());
        }

        info!(
            "indexed {} documents into {} segments",
            corpus.documents.len(),
            segments.len()
        );
        Ok(MemoryIndex::new(segments))
    }

    /// Parse a JSON corpus and index it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_corpus(&Corpus::from_json_str(json)?)
    }

    /// Load a JSON corpus file and index it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_corpus(&Corpus::from_file(path)?)
    }

    /// The segments.
    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    /// Total number of documents.
    pub fn doc_count(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| segment.max_doc().max(0) as usize)
            .sum()
    }
}
