//! Core identifiers shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline stage a batch, step, or event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Workers mark candidate cuttable regions.
    Find,
    /// Workers rewrite one patch's context window.
    Fix,
    /// Workers vote on the rewrites.
    Verify,
    /// Final per-paragraph emission (ledger bookkeeping only).
    Emit,
}

impl Stage {
    /// Stable lowercase name used in step keys and CSV rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Find => "find",
            Stage::Fix => "fix",
            Stage::Verify => "verify",
            Stage::Emit => "emit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
