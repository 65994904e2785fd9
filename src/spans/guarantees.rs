//! Static guarantees about an iterator's output.
//!
//! Guarantees are derived bottom-up when a query tree is built and are never
//! changed afterwards. They let operators pick faster algorithms (the
//! two-pointer conjunction and sequence engines) and let the rewriter skip
//! sort/dedup wrappers that would be no-ops.
//!
//! "Start sorted" means hits come in `(start, end)` order; "end sorted"
//! means `(end, start)` order. "Unique" means no two hits share the same
//! `(start, end)`; dedup wrappers only remove hits that are identical
//! including their match info, so they promise the weaker
//! `unique_with_match_info`.

use serde::Serialize;

use crate::spans::relation_info::{Direction, SpanMode};

/// Ordering, uniqueness and length properties of a hit stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Guarantees {
    /// Hits are sorted by start point (ties by end point).
    pub start_sorted: bool,

    /// Hits are sorted by end point (ties by start point).
    pub end_sorted: bool,

    /// No two hits share a start point.
    pub unique_start: bool,

    /// No two hits share an end point.
    pub unique_end: bool,

    /// No two hits share both start and end point, even when neither start
    /// nor end is unique on its own.
    pub unique: bool,

    /// No two hits are identical including their match info.
    pub unique_with_match_info: bool,

    /// All hits have the same length.
    pub all_same_length: bool,

    /// Minimum hit length.
    pub min_length: u32,

    /// Maximum hit length, `None` if unbounded.
    pub max_length: Option<u32>,

    /// Hits never overlap each other.
    pub non_overlapping: bool,

    /// Inverting this clause is cheap enough to use as an optimization.
    pub okay_to_invert: bool,
}

impl Guarantees {
    /// Nothing is known about the hits.
    pub const NONE: Guarantees = Guarantees {
        start_sorted: false,
        end_sorted: false,
        unique_start: false,
        unique_end: false,
        unique: false,
        unique_with_match_info: false,
        all_same_length: false,
        min_length: 0,
        max_length: None,
        non_overlapping: false,
        okay_to_invert: false,
    };

    /// Hits are unique, nothing else is known.
    pub const UNIQUE: Guarantees = Guarantees {
        unique: true,
        ..Guarantees::NONE
    };

    /// Hits are start-point sorted.
    pub const SORTED: Guarantees = Guarantees {
        start_sorted: true,
        ..Guarantees::NONE
    };

    /// Hits are start-point sorted and unique.
    pub const SORTED_UNIQUE: Guarantees = Guarantees {
        start_sorted: true,
        unique: true,
        ..Guarantees::NONE
    };

    /// Hits are end-point sorted.
    pub const END_SORTED: Guarantees = Guarantees {
        end_sorted: true,
        ..Guarantees::NONE
    };

    /// Hits are end-point sorted and unique.
    pub const END_SORTED_UNIQUE: Guarantees = Guarantees {
        end_sorted: true,
        unique: true,
        ..Guarantees::NONE
    };

    /// Guarantees of a single-term posting: one-token hits, one per position.
    pub const TERM: Guarantees = Guarantees {
        start_sorted: true,
        end_sorted: true,
        unique_start: true,
        unique_end: true,
        unique: true,
        unique_with_match_info: true,
        all_same_length: true,
        min_length: 1,
        max_length: Some(1),
        non_overlapping: true,
        okay_to_invert: false,
    };

    /// No two hits share `(start, end)`.
    pub fn hits_are_unique(&self) -> bool {
        self.unique || self.unique_start || self.unique_end
    }

    /// No two hits are identical including their match info.
    pub fn hits_are_unique_with_match_info(&self) -> bool {
        self.unique_with_match_info || self.hits_are_unique()
    }

    /// Whether two hits may overlap.
    pub fn can_overlap(&self) -> bool {
        let discrete =
            self.all_same_length && self.max_length.is_some_and(|max| max <= 1) && self.unique_start;
        !(self.non_overlapping || discrete)
    }

    /// All hits are exactly one token long.
    pub fn produces_single_tokens(&self) -> bool {
        self.all_same_length && self.min_length == 1
    }

    /// Start sorted and unique; the form most operators expect.
    pub fn is_sorted_unique(&self) -> bool {
        self.start_sorted && self.hits_are_unique()
    }

    /// Override the length bounds.
    pub fn with_lengths(mut self, min_length: u32, max_length: Option<u32>) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self.all_same_length = max_length == Some(min_length);
        self
    }

    /// Guarantees of a conjunction of `clauses`.
    ///
    /// Output hits are a subset of every clause's hits, so uniqueness and
    /// length restrictions of any clause carry over. The general engine can
    /// emit several match info variants for the same `(start, end)`, so
    /// start/end uniqueness only carries over if every clause is unique.
    pub fn and(clauses: &[Guarantees]) -> Guarantees {
        if clauses.is_empty() {
            return Guarantees::NONE;
        }
        let all_unique = clauses.iter().all(|c| c.hits_are_unique());
        let start_sorted = clauses.iter().all(|c| c.start_sorted);
        let all_same_length = clauses.iter().any(|c| c.all_same_length);
        let min_length = clauses.iter().map(|c| c.min_length).max().unwrap_or(0);
        let max_length = clauses.iter().filter_map(|c| c.max_length).min();
        Guarantees {
            start_sorted,
            end_sorted: clauses.iter().all(|c| c.end_sorted) || (start_sorted && all_same_length),
            unique_start: all_unique && clauses.iter().any(|c| c.unique_start),
            unique_end: all_unique && clauses.iter().any(|c| c.unique_end),
            unique: all_unique,
            unique_with_match_info: clauses.iter().all(|c| c.hits_are_unique_with_match_info()),
            all_same_length,
            min_length,
            max_length,
            non_overlapping: clauses.iter().any(|c| !c.can_overlap()),
            okay_to_invert: false,
        }
    }

    /// Guarantees of a sequence (concatenation) of `clauses`.
    pub fn sequence(clauses: &[Guarantees]) -> Guarantees {
        if clauses.is_empty() {
            return Guarantees::NONE;
        }
        let n = clauses.len();
        let all_but_last_same_length = clauses[..n - 1].iter().all(|c| c.all_same_length);
        let all_but_first_same_length = clauses[1..].iter().all(|c| c.all_same_length);
        let all_but_last_unique_end = clauses[..n - 1].iter().all(|c| c.unique_end);
        let min_length = clauses
            .iter()
            .fold(0u32, |acc, c| acc.saturating_add(c.min_length));
        let max_length = clauses.iter().try_fold(0u32, |acc, c| {
            c.max_length.map(|max| acc.saturating_add(max))
        });
        let unique_start = clauses.iter().all(|c| c.unique_start);
        let unique_end = clauses.iter().all(|c| c.unique_end);
        Guarantees {
            start_sorted: all_but_last_same_length,
            end_sorted: all_but_last_unique_end && all_but_first_same_length,
            unique_start,
            unique_end,
            unique: unique_start || unique_end,
            unique_with_match_info: false,
            all_same_length: clauses.iter().all(|c| c.all_same_length),
            min_length,
            max_length,
            non_overlapping: false,
            okay_to_invert: false,
        }
    }

    /// Guarantees of a disjunction of `clauses`.
    pub fn or(clauses: &[Guarantees]) -> Guarantees {
        if clauses.is_empty() {
            return Guarantees::TERM;
        }
        let min_length = clauses.iter().map(|c| c.min_length).min().unwrap_or(0);
        let max_length = clauses
            .iter()
            .try_fold(0u32, |acc, c| c.max_length.map(|max| acc.max(max)));
        let all_same_length = clauses.iter().all(|c| c.all_same_length) && max_length == Some(min_length);
        Guarantees {
            start_sorted: clauses.iter().all(|c| c.start_sorted),
            end_sorted: false,
            unique_start: false,
            unique_end: false,
            unique: false,
            unique_with_match_info: false,
            all_same_length,
            min_length,
            max_length,
            non_overlapping: false,
            okay_to_invert: false,
        }
    }

    /// Guarantees of repeating `clause` between `min` and `max` times
    /// (`None` for unbounded). The input is normalized to sorted, duplicate
    /// free hits before matching, so the output is always sorted; it is only
    /// unique if the clause was.
    pub fn repetition(clause: &Guarantees, min: u32, max: Option<u32>) -> Guarantees {
        let fixed = max == Some(min);
        let max_length = match (clause.max_length, max) {
            (Some(clause_max), Some(max)) => Some(clause_max.saturating_mul(max)),
            _ => None,
        };
        Guarantees {
            start_sorted: true,
            end_sorted: clause.end_sorted && fixed,
            unique_start: clause.unique_start && fixed,
            unique_end: clause.unique_end && fixed,
            unique: clause.hits_are_unique(),
            unique_with_match_info: false,
            all_same_length: clause.all_same_length && fixed,
            min_length: clause.min_length.saturating_mul(min),
            max_length,
            non_overlapping: false,
            okay_to_invert: false,
        }
    }

    /// Guarantees of decoding relations from a posting with guarantees
    /// `input`.
    ///
    /// Relations sharing a source start are indexed in source end order, so
    /// only spans that start and end with the source are sorted. A forward
    /// full span starts at the source but may end at the target.
    pub fn relations(input: &Guarantees, direction: Direction, mode: SpanMode) -> Guarantees {
        let start_sorted = input.start_sorted
            && (mode == SpanMode::Source || direction == Direction::Root);
        Guarantees {
            start_sorted,
            ..Guarantees::NONE
        }
    }

    /// Guarantees of inline tag spans.
    pub fn tags() -> Guarantees {
        Guarantees::SORTED
    }

    /// Guarantees of taking the leading or trailing edge of `clause` hits.
    pub fn edge(clause: &Guarantees, trailing: bool) -> Guarantees {
        let (sorted, unique) = if trailing {
            (clause.end_sorted, clause.unique_end)
        } else {
            (clause.start_sorted, clause.unique_start)
        };
        Guarantees {
            start_sorted: sorted,
            end_sorted: sorted,
            unique_start: unique,
            unique_end: unique,
            unique,
            unique_with_match_info: false,
            all_same_length: true,
            min_length: 0,
            max_length: Some(0),
            non_overlapping: false,
            okay_to_invert: false,
        }
    }

    /// Guarantees after sorting `clause` per document.
    pub fn sorted(clause: &Guarantees, by_end: bool, dedup: bool) -> Guarantees {
        let mut result = *clause;
        if by_end {
            result.end_sorted = true;
            result.start_sorted = clause.all_same_length;
        } else {
            result.start_sorted = true;
            result.end_sorted = clause.all_same_length;
        }
        if dedup {
            result.unique_with_match_info = true;
        }
        result
    }

    /// Guarantees after removing adjacent duplicates from `clause`. Hits
    /// that share `(start, end)` but differ in match info all survive.
    pub fn unique(clause: &Guarantees) -> Guarantees {
        Guarantees {
            unique_with_match_info: true,
            ..*clause
        }
    }

    /// Start sorted and free of identical hits; what repetition needs.
    pub fn is_sorted_without_duplicates(&self) -> bool {
        self.start_sorted && self.hits_are_unique_with_match_info()
    }
}

impl Default for Guarantees {
    fn default() -> Self {
        Guarantees::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_guarantees() {
        let term = Guarantees::TERM;
        assert!(term.is_sorted_unique());
        assert!(term.produces_single_tokens());
        assert!(!term.can_overlap());
        assert!(Guarantees::NONE.can_overlap());
    }

    #[test]
    fn test_and_of_sorted_unique_start() {
        let clause = Guarantees {
            start_sorted: true,
            unique_start: true,
            ..Guarantees::NONE
        };
        let and = Guarantees::and(&[clause, clause]);
        assert!(and.start_sorted);
        assert!(and.unique_start);
        assert!(and.is_sorted_unique());
    }

    #[test]
    fn test_and_lengths() {
        let a = Guarantees::NONE.with_lengths(1, Some(5));
        let b = Guarantees::NONE.with_lengths(2, None);
        let and = Guarantees::and(&[a, b]);
        assert_eq!(and.min_length, 2);
        assert_eq!(and.max_length, Some(5));
    }

    #[test]
    fn test_sequence_of_terms() {
        let seq = Guarantees::sequence(&[Guarantees::TERM, Guarantees::TERM, Guarantees::TERM]);
        assert!(seq.start_sorted);
        assert!(seq.end_sorted);
        assert!(seq.unique_start);
        assert!(seq.all_same_length);
        assert_eq!(seq.min_length, 3);
        assert_eq!(seq.max_length, Some(3));
    }

    #[test]
    fn test_sequence_unbounded() {
        let seq = Guarantees::sequence(&[Guarantees::TERM, Guarantees::NONE]);
        assert!(seq.start_sorted);
        assert!(!seq.end_sorted);
        assert!(!seq.unique_start);
        assert_eq!(seq.min_length, 1);
        assert_eq!(seq.max_length, None);
    }

    #[test]
    fn test_repetition() {
        let fixed = Guarantees::repetition(&Guarantees::TERM, 3, Some(3));
        assert!(fixed.all_same_length);
        assert!(fixed.unique_start);
        assert_eq!(fixed.min_length, 3);
        assert_eq!(fixed.max_length, Some(3));

        let open = Guarantees::repetition(&Guarantees::TERM, 2, None);
        assert!(open.start_sorted);
        assert!(open.hits_are_unique());
        assert!(!open.unique_start);
        assert_eq!(open.min_length, 2);
        assert_eq!(open.max_length, None);
    }

    #[test]
    fn test_relations() {
        let sorted = Guarantees::SORTED;
        assert!(Guarantees::relations(&sorted, Direction::Both, SpanMode::Source).start_sorted);
        assert!(!Guarantees::relations(&sorted, Direction::Forward, SpanMode::FullSpan).start_sorted);
        assert!(Guarantees::relations(&sorted, Direction::Root, SpanMode::FullSpan).start_sorted);
        assert!(!Guarantees::relations(&sorted, Direction::Both, SpanMode::FullSpan).start_sorted);
        assert!(!Guarantees::relations(&sorted, Direction::Forward, SpanMode::Target).start_sorted);
        assert!(Guarantees::relations(&sorted, Direction::Root, SpanMode::Target).start_sorted);

        let unsorted = Guarantees::NONE;
        assert!(!Guarantees::relations(&unsorted, Direction::Both, SpanMode::Source).start_sorted);
    }

    #[test]
    fn test_sorted_and_unique_wrappers() {
        let by_end = Guarantees::sorted(&Guarantees::NONE, true, false);
        assert!(by_end.end_sorted);
        assert!(!by_end.start_sorted);

        let dedup = Guarantees::sorted(&Guarantees::NONE, false, true);
        assert!(dedup.is_sorted_without_duplicates());
        assert!(!dedup.is_sorted_unique());

        let unique = Guarantees::unique(&Guarantees::SORTED);
        assert!(unique.is_sorted_without_duplicates());
        assert!(!unique.hits_are_unique());

        let still_unique = Guarantees::unique(&Guarantees::SORTED_UNIQUE);
        assert!(still_unique.is_sorted_unique());
    }
}
