use serde::Deserialize;

/// Main configuration structure for Sumi-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub runner: RunnerConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Worker pool and retry behavior
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Maximum number of operations in flight at once
    pub concurrency: u32,

    /// Attempts per item per run
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Lifetime attempt count at which an exhausted item becomes permanently failed
    #[serde(rename = "permanent-after", default)]
    pub permanent_after: Option<u32>,

    /// How previously failed items become eligible again
    #[serde(rename = "retry-gating", default)]
    pub retry_gating: RetryGating,
}

/// Re-eligibility mode for items that ended a previous run as `FailedRetryable`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryGating {
    /// Eligible once `last attempt + backoff(attempt count)` has elapsed
    #[default]
    Backoff,

    /// Eligible on the next run regardless of timing
    Immediate,
}

/// Backoff curve between attempts
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default)]
    pub kind: BackoffKind,

    #[serde(rename = "base-ms", default = "default_base_ms")]
    pub base_ms: u64,

    /// Growth factor, used by the exponential curve only
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(rename = "cap-ms", default = "default_cap_ms")]
    pub cap_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            kind: BackoffKind::default(),
            base_ms: default_base_ms(),
            multiplier: default_multiplier(),
            cap_ms: default_cap_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Linear,
    Exponential,
}

/// Item list location
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Path to a JSON array of item keys
    #[serde(rename = "items-path")]
    pub items_path: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the JSON state snapshot
    #[serde(rename = "state-path")]
    pub state_path: String,

    /// Which result sink stores fetched content
    #[serde(default)]
    pub results: ResultsKind,

    /// Directory (for `directory`) or database file (for `sqlite`)
    #[serde(rename = "results-path")]
    pub results_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultsKind {
    #[default]
    Directory,
    Sqlite,
}

/// HTTP fetch and extraction settings
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "https-only", default)]
    pub https_only: bool,

    /// Text fields to pull out of each fetched document
    #[serde(default)]
    pub fields: Vec<FieldSelector>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            https_only: false,
            fields: Vec::new(),
        }
    }
}

/// A named CSS selector whose text content is extracted
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSelector {
    pub name: String,
    pub selector: String,

    /// A missing required field fails the attempt
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_base_ms() -> u64 {
    2000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_cap_ms() -> u64 {
    60_000
}

fn default_user_agent() -> String {
    format!("sumi-sweep/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_required() -> bool {
    true
}
