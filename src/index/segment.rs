//! In-memory index segments.
//!
//! A [`Segment`] holds, per field, the positional postings of every
//! annotation and the forward index of the field. Relations and inline tags
//! are indexed in the [`RELATION_ANNOTATION`] annotation: a relation as a
//! posting of its type at its source start, a tag as a posting of
//! `__tag::<name>` at its start, both with an encoded payload.

use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::error::{Result, SpanlabError};
use crate::index::forward::{MemoryForwardDocument, MemoryForwardIndex};
use crate::index::posting::PostingList;
use crate::spans::position::{DocId, Position};
use crate::spans::relation_info::RelationInfo;

/// Annotation holding relation and tag postings.
pub const RELATION_ANNOTATION: &str = "_relation";

/// Annotation used by term queries that don't name one.
pub const DEFAULT_ANNOTATION: &str = "word";

/// Prefix of inline tag terms in the relation annotation.
pub const TAG_PREFIX: &str = "__tag::";

/// Term under which inline tag `name` is indexed.
pub fn tag_term(name: &str) -> String {
    format!("{TAG_PREFIX}{name}")
}

/// Postings and forward index of one field.
#[derive(Debug, Default)]
pub struct FieldIndex {
    annotations: AHashMap<String, AHashMap<String, Arc<PostingList>>>,
    forward: Arc<MemoryForwardIndex>,
}

impl FieldIndex {
    /// Posting list of `term` in `annotation`.
    pub fn postings(&self, annotation: &str, term: &str) -> Option<Arc<PostingList>> {
        self.annotations
            .get(annotation)
            .and_then(|terms| terms.get(term))
            .cloned()
    }

    /// All terms of `annotation`, sorted.
    pub fn terms(&self, annotation: &str) -> Vec<&str> {
        let mut terms: Vec<&str> = self
            .annotations
            .get(annotation)
            .map(|terms| terms.keys().map(|t| t.as_str()).collect())
            .unwrap_or_default();
        terms.sort_unstable();
        terms
    }

    /// Forward index of the field.
    pub fn forward_index(&self) -> Arc<MemoryForwardIndex> {
        Arc::clone(&self.forward)
    }
}

/// One immutable segment of an index.
#[derive(Debug)]
pub struct Segment {
    id: usize,
    max_doc: DocId,
    fields: AHashMap<String, FieldIndex>,
    field_names: Arc<Vec<String>>,
}

impl Segment {
    /// Segment number within its index.
    pub fn id(&self) -> usize {
        self.id
    }

    /// One more than the largest document id.
    pub fn max_doc(&self) -> DocId {
        self.max_doc
    }

    /// The field called `name`.
    pub fn field(&self, name: &str) -> Option<&FieldIndex> {
        self.fields.get(name)
    }

    /// Posting list of `term` in `field`/`annotation`.
    pub fn postings(&self, field: &str, annotation: &str, term: &str) -> Option<Arc<PostingList>> {
        self.field(field)
            .and_then(|index| index.postings(annotation, term))
    }

    /// Forward index of `field`.
    pub fn forward_index(&self, field: &str) -> Result<Arc<MemoryForwardIndex>> {
        self.field(field)
            .map(|index| index.forward_index())
            .ok_or_else(|| SpanlabError::invalid_argument(format!("unknown field '{field}'")))
    }

    /// Numeric id of `field`, as stored in cross-field relation payloads.
    pub fn field_id(&self, field: &str) -> Option<u32> {
        self.field_names
            .iter()
            .position(|name| name == field)
            .map(|index| index as u32)
    }

    /// Name of the field with numeric id `id`.
    pub fn field_name(&self, id: u32) -> Option<&str> {
        self.field_names.get(id as usize).map(|name| name.as_str())
    }
}

/// Builds a [`Segment`] document by document.
#[derive(Debug)]
pub struct SegmentBuilder {
    id: usize,
    next_doc: DocId,
    annotations: AHashMap<String, AHashMap<String, AHashMap<String, PostingList>>>,
    forward: AHashMap<String, MemoryForwardIndex>,
    field_names: Arc<Vec<String>>,
}

impl SegmentBuilder {
    /// Create a builder for segment `id`. `field_names` fixes the numeric
    /// field ids shared by all segments of an index.
    pub fn new(id: usize, field_names: Arc<Vec<String>>) -> Self {
        SegmentBuilder {
            id,
            next_doc: 0,
            annotations: AHashMap::new(),
            forward: AHashMap::new(),
            field_names,
        }
    }

    /// Start a new document and return its id.
    pub fn start_document(&mut self) -> DocId {
        let doc = self.next_doc;
        self.next_doc += 1;
        doc
    }

    fn add_posting(
        &mut self,
        field: &str,
        annotation: &str,
        term: &str,
        doc: DocId,
        position: Position,
        payload: Option<Vec<u8>>,
    ) {
        self.annotations
            .entry(field.to_string())
            .or_default()
            .entry(annotation.to_string())
            .or_default()
            .entry(term.to_string())
            .or_insert_with(|| PostingList::new(term))
            .add_occurrence(doc, position, payload);
    }

    /// Index the tokens of one annotation and store them in the forward
    /// index.
    pub fn add_annotation(&mut self, doc: DocId, field: &str, annotation: &str, values: &[String]) {
        for (position, value) in values.iter().enumerate() {
            self.add_posting(field, annotation, value, doc, position as Position, None);
        }
        let forward = self.forward.entry(field.to_string()).or_default();
        let mut document = forward.get(doc).cloned().unwrap_or_default();
        document.set_annotation(annotation, values.to_vec());
        forward.insert(doc, document);
    }

    /// Index an inline tag spanning `[start, end)`.
    pub fn add_tag(&mut self, doc: DocId, field: &str, name: &str, start: Position, end: Position) -> Result<()> {
        if start < 0 || end < start {
            return Err(SpanlabError::invalid_argument(format!(
                "invalid tag '{name}' span [{start}, {end})"
            )));
        }
        let payload = RelationInfo::encode_inline_tag(start, end);
        self.add_posting(field, RELATION_ANNOTATION, &tag_term(name), doc, start, Some(payload));
        Ok(())
    }

    /// Index a relation of type `relation_type`.
    pub fn add_relation(&mut self, doc: DocId, field: &str, relation_type: &str, info: &RelationInfo) -> Result<()> {
        if info.source_start < 0 || info.source_end < info.source_start || info.target_end < info.target_start {
            return Err(SpanlabError::invalid_argument(format!(
                "invalid relation '{relation_type}': {info:?}"
            )));
        }
        if relation_type.starts_with(TAG_PREFIX) {
            return Err(SpanlabError::invalid_argument(format!(
                "relation type '{relation_type}' uses the reserved tag prefix"
            )));
        }
        self.add_posting(
            field,
            RELATION_ANNOTATION,
            relation_type,
            doc,
            info.source_start,
            Some(info.encode()),
        );
        Ok(())
    }

    /// Finish the segment.
    pub fn build(self) -> Segment {
        let mut fields: AHashMap<String, FieldIndex> = AHashMap::new();
        for (field, annotations) in self.annotations {
            let entry = fields.entry(field).or_default();
            for (annotation, terms) in annotations {
                let terms = terms
                    .into_iter()
                    .map(|(term, list)| (term, Arc::new(list)))
                    .collect();
                entry.annotations.insert(annotation, terms);
            }
        }
        for (field, forward) in self.forward {
            fields.entry(field).or_default().forward = Arc::new(forward);
        }
        debug!(
            "built segment {} with {} documents and {} fields",
            self.id,
            self.next_doc,
            fields.len()
        );
        Segment {
            id: self.id,
            max_doc: self.next_doc,
            fields,
            field_names: self.field_names,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_build_segment() {
        let fields = Arc::new(vec!["contents".to_string()]);
        let mut builder = SegmentBuilder::new(0, fields);

        let doc = builder.start_document();
        builder.add_annotation(doc, "contents", "word", &words(&["the", "cat", "the"]));
        builder.add_annotation(doc, "contents", "lemma", &words(&["the", "cat", "the"]));
        builder.add_tag(doc, "contents", "s", 0, 3).unwrap();
        builder
            .add_relation(doc, "contents", "dep::det", &RelationInfo::new(1, 2, 0, 1))
            .unwrap();

        let segment = builder.build();
        assert_eq!(segment.max_doc(), 1);
        assert_eq!(
            segment.postings("contents", "word", "the").unwrap().get_posting(0).unwrap().positions,
            vec![0, 2]
        );

        let tag = segment.postings("contents", RELATION_ANNOTATION, "__tag::s").unwrap();
        assert_eq!(tag.postings[0].payload(0), Some(&[6u8][..]));

        let forward = segment.forward_index("contents").unwrap();
        use crate::index::forward::ForwardIndexAccessor;
        let document = forward.document(0).unwrap();
        assert_eq!(document.token("word", 1), Some("cat"));
        assert_eq!(document.token("lemma", 2), Some("the"));

        assert_eq!(segment.field_id("contents"), Some(0));
        assert_eq!(segment.field_name(0), Some("contents"));
    }

    #[test]
    fn test_invalid_tag_rejected() {
        let mut builder = SegmentBuilder::new(0, Arc::new(Vec::new()));
        let doc = builder.start_document();
        assert!(builder.add_tag(doc, "contents", "s", 4, 2).is_err());
        assert!(
            builder
                .add_relation(doc, "contents", "__tag::x", &RelationInfo::new(0, 1, 1, 2))
                .is_err()
        );
    }
}
