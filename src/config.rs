//! Engine configuration.
//!
//! [`EngineConfig`] controls the few tunables of the execution engine: how
//! bucket storage is sized and recycled, and whether the "simple" conjunction
//! and sequence engines may be selected when guarantees allow it.
//!
//! # Examples
//!
//! ```
//! use spanlab::config::EngineConfig;
//!
//! let config = EngineConfig::default()
//!     .with_bucket_initial_capacity(64)
//!     .with_simple_sequence(false);
//!
//! assert_eq!(config.bucket_initial_capacity, 64);
//! assert!(config.allow_simple_and);
//! assert!(!config.allow_simple_sequence);
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanlabError};

/// Upper bound used for repetitions written without a maximum.
pub const MAX_UNLIMITED: u32 = i32::MAX as u32;

/// Configuration for query rewriting and iterator construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Field searched by query nodes that don't name one.
    pub default_field: String,

    /// Initial capacity of the parallel arrays backing a hit bucket.
    pub bucket_initial_capacity: usize,

    /// Bucket size above which storage is reallocated instead of cleared,
    /// so one huge document doesn't pin memory for the rest of the segment.
    pub bucket_realloc_threshold: usize,

    /// Allow the two-pointer conjunction engine for sorted, unique clauses.
    pub allow_simple_and: bool,

    /// Allow the two-pointer sequence engine when clause guarantees permit.
    pub allow_simple_sequence: bool,

    /// Value an unbounded repetition maximum is clamped to.
    pub max_unlimited_repetitions: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_field: "contents".to_string(),
            bucket_initial_capacity: 1000,
            bucket_realloc_threshold: 100_000,
            allow_simple_and: true,
            allow_simple_sequence: true,
            max_unlimited_repetitions: MAX_UNLIMITED,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.bucket_realloc_threshold < self.bucket_initial_capacity {
            return Err(SpanlabError::config(format!(
                "bucket_realloc_threshold ({}) must not be smaller than bucket_initial_capacity ({})",
                self.bucket_realloc_threshold, self.bucket_initial_capacity
            )));
        }
        if self.max_unlimited_repetitions == 0 {
            return Err(SpanlabError::config(
                "max_unlimited_repetitions must be at least 1",
            ));
        }
        Ok(())
    }

    /// Set the default field.
    pub fn with_default_field<S: Into<String>>(mut self, field: S) -> Self {
        self.default_field = field.into();
        self
    }

    /// Set the initial bucket capacity.
    pub fn with_bucket_initial_capacity(mut self, capacity: usize) -> Self {
        self.bucket_initial_capacity = capacity;
        self
    }

    /// Set the bucket reallocation threshold.
    pub fn with_bucket_realloc_threshold(mut self, threshold: usize) -> Self {
        self.bucket_realloc_threshold = threshold;
        self
    }

    /// Enable or disable the simple conjunction engine.
    pub fn with_simple_and(mut self, allow: bool) -> Self {
        self.allow_simple_and = allow;
        self
    }

    /// Enable or disable the simple sequence engine.
    pub fn with_simple_sequence(mut self, allow: bool) -> Self {
        self.allow_simple_sequence = allow;
        self
    }

    /// Set the clamp value for unbounded repetitions.
    pub fn with_max_unlimited_repetitions(mut self, max: u32) -> Self {
        self.max_unlimited_repetitions = max;
        self
    }
}
