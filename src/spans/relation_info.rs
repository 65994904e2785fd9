//! Relation payloads.
//!
//! A relation is indexed at the first token of its source as a posting of
//! the relation type, with a small payload describing where the target lies
//! relative to the source:
//!
//! ```text
//! [relOtherStart: ZInt][flags: u8][thisLength: VInt][otherLength: VInt][targetField: VInt]
//! ```
//!
//! Trailing values equal to their default are omitted, so the common case of
//! an inline tag is a single `ZInt(end - start)` and a dependency relation
//! between adjacent words has an empty payload. The target field id is only
//! present for cross-field relations (flag `0x08`), in which case both
//! lengths are always written.

use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::spans::position::Position;
use crate::util::varint;

const DEFAULT_REL_OTHER_START: i32 = 1;
const DEFAULT_FLAGS: u8 = 0;
const DEFAULT_LENGTH: i32 = 0;
const DEFAULT_LENGTH_ALT: i32 = 1;

/// Relation was indexed at its target instead of its source (unused).
pub const FLAG_INDEXED_AT_TARGET: u8 = 0x01;

/// Relation has no source, only a target.
pub const FLAG_ONLY_HAS_TARGET: u8 = 0x02;

/// Both default lengths are 1 instead of 0.
pub const FLAG_DEFAULT_LENGTH_ALT: u8 = 0x04;

/// Target lies in another field; a target field id follows the lengths.
pub const FLAG_CROSS_FIELD: u8 = 0x08;

/// Which span of a relation a relation hit covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanMode {
    /// The source span.
    Source,
    /// The target span.
    Target,
    /// From the smallest start to the largest end of source and target.
    FullSpan,
    /// Covering all relations in a list; only meaningful for relation
    /// lists, behaves like [`SpanMode::FullSpan`] for a single relation.
    AllSpans,
}

/// Which relations to accept based on the relative position of source and
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Source starts at or before the target.
    Forward,
    /// Source starts at or after the target.
    Backward,
    /// Only root relations (no source).
    Root,
    /// Any relation.
    Both,
}

impl Direction {
    /// Whether `info` passes this direction filter.
    pub fn accepts(&self, info: &RelationInfo) -> bool {
        match self {
            Direction::Forward => info.source_start <= info.target_start,
            Direction::Backward => info.source_start >= info.target_start,
            Direction::Root => info.root,
            Direction::Both => true,
        }
    }
}

/// Decoded source and target of one relation.
///
/// Root relations have no source; by convention their source coincides with
/// their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationInfo {
    pub source_start: Position,
    pub source_end: Position,
    pub target_start: Position,
    pub target_end: Position,
    pub root: bool,
    pub target_field: Option<u32>,
}

impl RelationInfo {
    /// Create a relation with a source and a target.
    pub fn new(source_start: Position, source_end: Position, target_start: Position, target_end: Position) -> Self {
        RelationInfo {
            source_start,
            source_end,
            target_start,
            target_end,
            root: false,
            target_field: None,
        }
    }

    /// Create a root relation (target only).
    pub fn root(target_start: Position, target_end: Position) -> Self {
        RelationInfo {
            source_start: target_start,
            source_end: target_end,
            target_start,
            target_end,
            root: true,
            target_field: None,
        }
    }

    /// Create the relation an inline tag is stored as: zero-length source at
    /// the tag start, zero-length target at the tag end.
    pub fn inline_tag(start: Position, end: Position) -> Self {
        RelationInfo::new(start, start, end, end)
    }

    /// Mark the target as lying in another field.
    pub fn with_target_field(mut self, field_id: u32) -> Self {
        self.target_field = Some(field_id);
        self
    }

    /// Start of the span covering source and target.
    pub fn full_span_start(&self) -> Position {
        self.source_start.min(self.target_start)
    }

    /// End of the span covering source and target.
    pub fn full_span_end(&self) -> Position {
        self.source_end.max(self.target_end)
    }

    /// Start of the span selected by `mode`.
    pub fn span_start(&self, mode: SpanMode) -> Position {
        match mode {
            SpanMode::Source => self.source_start,
            SpanMode::Target => self.target_start,
            SpanMode::FullSpan | SpanMode::AllSpans => self.full_span_start(),
        }
    }

    /// End of the span selected by `mode`.
    pub fn span_end(&self, mode: SpanMode) -> Position {
        match mode {
            SpanMode::Source => self.source_end,
            SpanMode::Target => self.target_end,
            SpanMode::FullSpan | SpanMode::AllSpans => self.full_span_end(),
        }
    }

    /// Whether this looks like an inline tag: zero-length source and
    /// target, source not after target.
    pub fn is_tag(&self) -> bool {
        !self.root
            && self.source_end == self.source_start
            && self.target_end == self.target_start
            && self.source_start <= self.target_start
    }

    /// Decode a payload for a relation indexed at `position`.
    ///
    /// An empty payload decodes to all defaults: a zero-length source at
    /// `position` and a zero-length target one token later.
    pub fn decode(position: Position, payload: &[u8]) -> Result<RelationInfo> {
        let mut rel_other_start = DEFAULT_REL_OTHER_START;
        let mut flags = DEFAULT_FLAGS;
        let mut this_length = DEFAULT_LENGTH;
        let mut other_length = DEFAULT_LENGTH;
        let mut target_field = None;

        let mut input = Cursor::new(payload);
        if !varint::at_eof(&input) {
            rel_other_start = varint::read_zint(&mut input)?;
            if !varint::at_eof(&input) {
                flags = varint::read_byte(&mut input)?;
                if flags & FLAG_DEFAULT_LENGTH_ALT != 0 {
                    this_length = DEFAULT_LENGTH_ALT;
                    other_length = DEFAULT_LENGTH_ALT;
                }
                if flags & FLAG_CROSS_FIELD != 0 {
                    this_length = varint::read_vint(&mut input)? as i32;
                    other_length = varint::read_vint(&mut input)? as i32;
                    target_field = Some(varint::read_vint(&mut input)?);
                } else if !varint::at_eof(&input) {
                    this_length = varint::read_vint(&mut input)? as i32;
                    if !varint::at_eof(&input) {
                        other_length = varint::read_vint(&mut input)? as i32;
                    }
                }
            }
        }

        let target_start = position + rel_other_start;
        Ok(RelationInfo {
            source_start: position,
            source_end: position + this_length,
            target_start,
            target_end: target_start + other_length,
            root: flags & FLAG_ONLY_HAS_TARGET != 0,
            target_field,
        })
    }

    /// Encode this relation as a payload, omitting trailing defaults.
    pub fn encode(&self) -> Vec<u8> {
        let this_length = self.source_end - self.source_start;
        let rel_other_start = self.target_start - self.source_start;
        let other_length = self.target_end - self.target_start;

        let use_alt_length = this_length == DEFAULT_LENGTH_ALT && other_length == DEFAULT_LENGTH_ALT;
        let default_length = if use_alt_length {
            DEFAULT_LENGTH_ALT
        } else {
            DEFAULT_LENGTH
        };
        let mut flags = 0u8;
        if self.root {
            flags |= FLAG_ONLY_HAS_TARGET;
        }
        if use_alt_length {
            flags |= FLAG_DEFAULT_LENGTH_ALT;
        }
        if self.target_field.is_some() {
            flags |= FLAG_CROSS_FIELD;
        }

        let cross_field = self.target_field.is_some();
        let write_other_length = cross_field || other_length != default_length;
        let write_this_length = write_other_length || this_length != default_length;
        let write_flags = write_this_length || flags != DEFAULT_FLAGS;
        let write_rel_other_start = write_flags || rel_other_start != DEFAULT_REL_OTHER_START;

        let mut bytes = Vec::with_capacity(8);
        if write_rel_other_start {
            bytes.extend(varint::encode_vint(varint::zigzag_encode(rel_other_start)));
        }
        if write_flags {
            bytes.push(flags);
        }
        if write_this_length {
            bytes.extend(varint::encode_vint(this_length as u32));
        }
        if write_other_length {
            bytes.extend(varint::encode_vint(other_length as u32));
        }
        if let Some(field) = self.target_field {
            bytes.extend(varint::encode_vint(field));
        }
        bytes
    }

    /// Encode the payload of an inline tag spanning `[start, end)`.
    pub fn encode_inline_tag(start: Position, end: Position) -> Vec<u8> {
        varint::encode_vint(varint::zigzag_encode(end - start))
    }

    /// Decode only the tag length (`end - start`) from an inline tag or
    /// relation payload.
    pub fn decode_tag_length(payload: &[u8]) -> Result<i32> {
        let mut input = Cursor::new(payload);
        if varint::at_eof(&input) {
            return Ok(DEFAULT_REL_OTHER_START);
        }
        varint::read_zint(&mut input)
    }
}
