//! Match info: named captures and relations attached to hits.
//!
//! Every capture or relation name used anywhere in a query gets a stable
//! slot index from the [`MatchInfoRegistry`] during the bind pass. The
//! registry is then frozen into an immutable [`MatchInfoDefs`] shared by the
//! whole iterator tree; iterators fill `Option<MatchInfo>` arrays indexed by
//! those slots for the current hit.

use std::sync::Arc;

use ahash::AHashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanlabError};
use crate::spans::position::Position;
use crate::spans::relation_info::RelationInfo;

/// What kind of value a match info slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchInfoKind {
    /// A captured span.
    Span,
    /// A relation between a source and a target span.
    Relation,
    /// An inline tag (stored like a relation).
    InlineTag,
    /// A variable-size list of relations.
    RelationList,
    /// Registered by name only; may be upgraded later.
    Unknown,
}

/// The value captured for one slot of one hit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchInfo {
    /// A plain captured span.
    Span { start: Position, end: Position },
    /// A relation (or inline tag).
    Relation(RelationInfo),
    /// A list of relations; its span covers all members.
    RelationList(Vec<RelationInfo>),
}

impl MatchInfo {
    /// Create a span capture.
    pub fn span(start: Position, end: Position) -> Self {
        MatchInfo::Span { start, end }
    }

    /// The kind of this value.
    pub fn kind(&self) -> MatchInfoKind {
        match self {
            MatchInfo::Span { .. } => MatchInfoKind::Span,
            MatchInfo::Relation(info) if info.is_tag() => MatchInfoKind::InlineTag,
            MatchInfo::Relation(_) => MatchInfoKind::Relation,
            MatchInfo::RelationList(_) => MatchInfoKind::RelationList,
        }
    }

    /// Start of the span covered by this value.
    pub fn span_start(&self) -> Position {
        match self {
            MatchInfo::Span { start, .. } => *start,
            MatchInfo::Relation(info) => info.full_span_start(),
            MatchInfo::RelationList(list) => list
                .iter()
                .map(|r| r.full_span_start())
                .min()
                .unwrap_or(0),
        }
    }

    /// End of the span covered by this value.
    pub fn span_end(&self) -> Position {
        match self {
            MatchInfo::Span { end, .. } => *end,
            MatchInfo::Relation(info) => info.full_span_end(),
            MatchInfo::RelationList(list) => list
                .iter()
                .map(|r| r.full_span_end())
                .max()
                .unwrap_or(0),
        }
    }
}

/// Definition of one match info slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchInfoDef {
    pub index: usize,
    pub name: String,
    pub kind: MatchInfoKind,
    pub field: String,
}

/// Mutable registry used during the bind pass.
#[derive(Debug, Default)]
pub struct MatchInfoRegistry {
    defs: Vec<MatchInfoDef>,
    by_name: AHashMap<String, usize>,
}

impl MatchInfoRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` and return its slot index.
    ///
    /// Registering an existing name returns the existing slot. An
    /// [`MatchInfoKind::Unknown`] kind is upgraded to a known one; two
    /// different known kinds for the same name are an error.
    pub fn register(&mut self, name: &str, kind: MatchInfoKind, field: &str) -> Result<usize> {
        if let Some(&index) = self.by_name.get(name) {
            let def = &mut self.defs[index];
            if def.kind == MatchInfoKind::Unknown {
                def.kind = kind;
            } else if kind != MatchInfoKind::Unknown && kind != def.kind {
                return Err(SpanlabError::query(format!(
                    "match info '{name}' registered as both {:?} and {kind:?}",
                    def.kind
                )));
            }
            return Ok(index);
        }

        let index = self.defs.len();
        debug!("registering match info '{name}' ({kind:?}, field '{field}') at index {index}");
        self.defs.push(MatchInfoDef {
            index,
            name: name.to_string(),
            kind,
            field: field.to_string(),
        });
        self.by_name.insert(name.to_string(), index);
        Ok(index)
    }

    /// Index of an already registered name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Freeze the registry. No slots can be added afterwards.
    pub fn freeze(self) -> Arc<MatchInfoDefs> {
        Arc::new(MatchInfoDefs {
            defs: self.defs,
            by_name: self.by_name,
        })
    }
}

/// Immutable match info slot definitions for one query evaluation.
#[derive(Debug, Default)]
pub struct MatchInfoDefs {
    defs: Vec<MatchInfoDef>,
    by_name: AHashMap<String, usize>,
}

impl MatchInfoDefs {
    /// Number of slots.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether there are no slots.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Definition of slot `index`.
    pub fn get(&self, index: usize) -> Option<&MatchInfoDef> {
        self.defs.get(index)
    }

    /// Slot index of `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Iterate over all slot definitions in index order.
    pub fn iter(&self) -> impl Iterator<Item = &MatchInfoDef> {
        self.defs.iter()
    }

    /// A fresh, empty per-hit array.
    pub fn new_array(&self) -> Vec<Option<MatchInfo>> {
        vec![None; self.defs.len()]
    }

    /// Which slots belong to `field`.
    pub fn slots_for_field(&self, field: &str) -> Vec<bool> {
        self.defs.iter().map(|def| def.field == field).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = MatchInfoRegistry::new();
        let a = registry.register("a", MatchInfoKind::Span, "contents").unwrap();
        let b = registry.register("b", MatchInfoKind::Relation, "contents").unwrap();
        let a_again = registry.register("a", MatchInfoKind::Span, "contents").unwrap();

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(a_again, a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_upgrades_unknown() {
        let mut registry = MatchInfoRegistry::new();
        let index = registry.register("x", MatchInfoKind::Unknown, "contents").unwrap();
        let upgraded = registry.register("x", MatchInfoKind::Relation, "contents").unwrap();
        assert_eq!(index, upgraded);

        // Unknown never downgrades a known kind.
        registry.register("x", MatchInfoKind::Unknown, "contents").unwrap();

        let defs = registry.freeze();
        assert_eq!(defs.get(index).unwrap().kind, MatchInfoKind::Relation);
    }

    #[test]
    fn test_register_conflicting_kinds() {
        let mut registry = MatchInfoRegistry::new();
        registry.register("x", MatchInfoKind::Span, "contents").unwrap();
        assert!(registry.register("x", MatchInfoKind::Relation, "contents").is_err());
    }

    #[test]
    fn test_defs_iteration() {
        let mut registry = MatchInfoRegistry::new();
        registry.register("a", MatchInfoKind::Span, "contents").unwrap();
        registry.register("b", MatchInfoKind::Relation, "contents__de").unwrap();
        let defs = registry.freeze();

        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(defs.index_of("b"), Some(1));
        assert_eq!(defs.slots_for_field("contents__de"), vec![false, true]);
        assert_eq!(defs.new_array().len(), 2);
    }

    #[test]
    fn test_relation_list_span() {
        let list = MatchInfo::RelationList(vec![
            RelationInfo::new(3, 4, 6, 7),
            RelationInfo::new(1, 2, 2, 3),
        ]);
        assert_eq!(list.span_start(), 1);
        assert_eq!(list.span_end(), 7);
        assert_eq!(list.kind(), MatchInfoKind::RelationList);
    }
}
