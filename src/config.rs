//! Pipeline configuration.
//!
//! Defaults follow the values the shortening pipeline has been run with in
//! practice: a 20 minute first-phase wait, two buffer assignments per
//! batch, ten Find workers at 20% minimum agreement. Environment
//! variables prefixed `SHORTN_` override individual knobs;
//! [`PipelineConfig::from_env`] loads a `.env` file first via `dotenvy`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-stage crowd parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StageConfig {
    /// Payment per assignment.
    pub reward: f64,
    /// Fraction of responding workers that must agree (Find only).
    pub minimum_agreement: f64,
    /// Desired number of independent workers.
    pub redundancy: usize,
    /// Smallest acceptable number of responses; waits never give up below
    /// this floor.
    pub minimum_workers: usize,
}

/// What to do with a patch whose options all failed verification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnverifiedPatchPolicy {
    /// Emit the patch with an empty option list; the original text remains
    /// the only choice.
    #[default]
    KeepOriginal,
    /// Drop the patch from the paragraph's output entirely.
    Drop,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Extra assignments per batch to absorb workers that accept a task
    /// but never submit.
    pub buffer_redundancy: usize,
    /// First-phase wait bound per batch, in milliseconds.
    pub wait_time_ms: u64,
    /// When false, even the first wait phase is unbounded.
    pub time_bounded: bool,
    /// Delay between status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Cost ceiling on batch extensions when a stage keeps coming up
    /// empty (zero aggregated patches, zero usable rewrites).
    pub max_extension_rounds: u32,
    /// Policy for patches left without passing options.
    pub unverified_patch_policy: UnverifiedPatchPolicy,
    /// Enable the HTML/CSV run-output writers.
    pub file_output: bool,
    /// Directory the output writers append into.
    pub output_dir: String,
    pub find: StageConfig,
    pub fix: StageConfig,
    pub verify: StageConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_redundancy: 2,
            wait_time_ms: 20 * 60 * 1000,
            time_bounded: true,
            poll_interval_ms: 5_000,
            max_extension_rounds: 10,
            unverified_patch_policy: UnverifiedPatchPolicy::default(),
            file_output: false,
            output_dir: "shortn-output".to_string(),
            find: StageConfig {
                reward: 0.01,
                minimum_agreement: 0.20,
                redundancy: 10,
                minimum_workers: 5,
            },
            fix: StageConfig {
                reward: 0.05,
                minimum_agreement: 0.0,
                redundancy: 5,
                minimum_workers: 3,
            },
            verify: StageConfig {
                reward: 0.02,
                minimum_agreement: 0.0,
                redundancy: 5,
                minimum_workers: 3,
            },
        }
    }
}

impl PipelineConfig {
    /// First-phase wait bound as a [`Duration`].
    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    /// Status-poll cadence as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Defaults overridden by `SHORTN_*` environment variables.
    ///
    /// Recognized keys: `SHORTN_BUFFER_REDUNDANCY`, `SHORTN_WAIT_TIME_MS`,
    /// `SHORTN_TIME_BOUNDED`, `SHORTN_POLL_INTERVAL_MS`,
    /// `SHORTN_MAX_EXTENSION_ROUNDS`, `SHORTN_FILE_OUTPUT`,
    /// `SHORTN_OUTPUT_DIR`. Malformed values fall back to the default.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();
        if let Some(v) = env_parse("SHORTN_BUFFER_REDUNDANCY") {
            cfg.buffer_redundancy = v;
        }
        if let Some(v) = env_parse("SHORTN_WAIT_TIME_MS") {
            cfg.wait_time_ms = v;
        }
        if let Some(v) = env_parse("SHORTN_TIME_BOUNDED") {
            cfg.time_bounded = v;
        }
        if let Some(v) = env_parse("SHORTN_POLL_INTERVAL_MS") {
            cfg.poll_interval_ms = v;
        }
        if let Some(v) = env_parse("SHORTN_MAX_EXTENSION_ROUNDS") {
            cfg.max_extension_rounds = v;
        }
        if let Some(v) = env_parse("SHORTN_FILE_OUTPUT") {
            cfg.file_output = v;
        }
        if let Ok(v) = std::env::var("SHORTN_OUTPUT_DIR") {
            cfg.output_dir = v;
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
