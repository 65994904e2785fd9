//! Forward index: token values by document and position.
//!
//! Constraint evaluation needs the value of an annotation at a captured
//! position. The engine only sees the [`ForwardIndexAccessor`] trait;
//! [`MemoryForwardIndex`] is the in-memory implementation.

use std::fmt::Debug;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{Result, SpanlabError};
use crate::spans::position::{DocId, Position};

/// Token values of one document.
pub trait ForwardDocument: Send + Sync + Debug {
    /// Value of `annotation` at `position`, if the position exists.
    fn token(&self, annotation: &str, position: Position) -> Option<&str>;

    /// Number of tokens in the document.
    fn len(&self) -> usize;

    /// Whether the document has no tokens.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Gives access to the forward index of one field in one segment.
pub trait ForwardIndexAccessor: Send + Sync + Debug {
    /// Fetch the token values of `doc`.
    fn document(&self, doc: DocId) -> Result<Arc<dyn ForwardDocument>>;
}

/// Annotation values of one document, stored in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryForwardDocument {
    annotations: AHashMap<String, Vec<String>>,
    length: usize,
}

impl MemoryForwardDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the values of `annotation`.
    pub fn set_annotation<S: Into<String>>(&mut self, annotation: S, values: Vec<String>) {
        self.length = self.length.max(values.len());
        self.annotations.insert(annotation.into(), values);
    }
}

impl ForwardDocument for MemoryForwardDocument {
    fn token(&self, annotation: &str, position: Position) -> Option<&str> {
        let position = usize::try_from(position).ok()?;
        self.annotations
            .get(annotation)
            .and_then(|values| values.get(position))
            .map(|value| value.as_str())
    }

    fn len(&self) -> usize {
        self.length
    }
}

/// In-memory forward index of one field.
#[derive(Debug, Clone, Default)]
pub struct MemoryForwardIndex {
    documents: Vec<Arc<MemoryForwardDocument>>,
}

impl MemoryForwardIndex {
    /// Create an empty forward index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the values of `doc`. Documents in between get empty entries.
    pub fn insert(&mut self, doc: DocId, document: MemoryForwardDocument) {
        let index = doc.max(0) as usize;
        if self.documents.len() <= index {
            self.documents
                .resize_with(index + 1, || Arc::new(MemoryForwardDocument::new()));
        }
        self.documents[index] = Arc::new(document);
    }

    /// The stored document `doc`.
    pub fn get(&self, doc: DocId) -> Option<&MemoryForwardDocument> {
        usize::try_from(doc)
            .ok()
            .and_then(|index| self.documents.get(index))
            .map(|document| document.as_ref())
    }

    /// Number of documents stored.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether no document is stored.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl ForwardIndexAccessor for MemoryForwardIndex {
    fn document(&self, doc: DocId) -> Result<Arc<dyn ForwardDocument>> {
        usize::try_from(doc)
            .ok()
            .and_then(|index| self.documents.get(index))
            .map(|document| Arc::clone(document) as Arc<dyn ForwardDocument>)
            .ok_or_else(|| SpanlabError::invalid_argument(format!("document {doc} not in forward index")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_token_lookup() {
        let mut document = MemoryForwardDocument::new();
        document.set_annotation("word", words(&["The", "cats", "sat"]));
        document.set_annotation("lemma", words(&["the", "cat", "sit"]));

        let mut index = MemoryForwardIndex::new();
        index.insert(1, document);

        let doc = index.document(1).unwrap();
        assert_eq!(doc.token("lemma", 1), Some("cat"));
        assert_eq!(doc.token("word", 3), None);
        assert_eq!(doc.token("pos", 0), None);
        assert_eq!(doc.token("word", -1), None);
        assert_eq!(doc.len(), 3);

        // Gaps are filled with empty documents.
        assert!(index.document(0).unwrap().is_empty());
        assert!(index.document(2).is_err());
    }
}
