//! Configuration for the canonicalization pipeline.
//!
//! The `version` field is the contract: any change to the rule set or the
//! order rules run in must be accompanied by a version bump. Templates
//! produced under an older version remain valid under that version; a bump
//! only affects newly canonicalized messages (re-embedding old templates is
//! a bulk migration keyed on the stored version).

use serde::{Deserialize, Serialize};

/// Controls which versioned rule set [`canonicalize`](crate::canonicalize)
/// applies.
///
/// For a given `version` the output is stable across machines,
/// architectures, and locales. Version 0 is reserved and rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalizeConfig {
    /// Semantic version of the canonicalization rule set. Must be >= 1.
    pub version: u32,
}

impl Default for CanonicalizeConfig {
    fn default() -> Self {
        Self { version: 1 }
    }
}
