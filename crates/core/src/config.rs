//! TOML-based configuration for mergeorder.
//!
//! Every section has defaults, so an empty file (or no file at all) is a
//! valid configuration. The advisory credential is stored as an `_env` field
//! naming an environment variable and resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

/// Tolerance for the blend weights summing to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Repository and remote settings.
    #[serde(default)]
    pub repo: RepoConfig,

    /// Structural scorer weights.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Structural/advisory blend weights.
    #[serde(default)]
    pub blend: BlendConfig,

    /// Advisory oracle settings.
    #[serde(default)]
    pub advisory: AdvisoryConfig,

    /// Order search settings.
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            repo: RepoConfig::default(),
            scoring: ScoringConfig::default(),
            blend: BlendConfig::default(),
            advisory: AdvisoryConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Repository and remote settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Path to the local checkout (default `.`).
    #[serde(default = "default_repo_path")]
    pub path: PathBuf,

    /// Remote the candidate branches and the base live on.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Base branch every candidate is merged into.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,

    /// Prefix of the disposable simulation branch.
    #[serde(default = "default_workspace_prefix")]
    pub workspace_prefix: String,

    /// Fetch the remote before resolving refs.
    #[serde(default = "default_true")]
    pub fetch: bool,

    /// Upper bound on any single VCS command, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}
fn default_remote() -> String {
    "origin".into()
}
fn default_base_branch() -> String {
    "main".into()
}
fn default_workspace_prefix() -> String {
    "merge-order-sim".into()
}
fn default_true() -> bool {
    true
}
fn default_command_timeout() -> u64 {
    120
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            path: default_repo_path(),
            remote: default_remote(),
            base_branch: default_base_branch(),
            workspace_prefix: default_workspace_prefix(),
            fetch: true,
            command_timeout_secs: default_command_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Structural scoring
// ---------------------------------------------------------------------------

/// Weights of the structural scorer.
///
/// Touched files weigh the most: conflicts spread across files mean
/// separate edits that are harder to reconcile by hand than one long block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Points per conflicting line.
    #[serde(default = "default_line_weight")]
    pub line_weight: f64,

    /// Points per conflict block.
    #[serde(default = "default_block_weight")]
    pub block_weight: f64,

    /// Points per file touched by both sides.
    #[serde(default = "default_file_weight")]
    pub file_weight: f64,

    /// Touched-file count at which `threshold_bonus` is added.
    #[serde(default = "default_file_threshold")]
    pub file_threshold: u32,

    /// Flat penalty once `file_threshold` is reached.
    #[serde(default = "default_threshold_bonus")]
    pub threshold_bonus: f64,
}

fn default_line_weight() -> f64 {
    0.4
}
fn default_block_weight() -> f64 {
    6.0
}
fn default_file_weight() -> f64 {
    12.0
}
fn default_file_threshold() -> u32 {
    5
}
fn default_threshold_bonus() -> f64 {
    25.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            line_weight: default_line_weight(),
            block_weight: default_block_weight(),
            file_weight: default_file_weight(),
            file_threshold: default_file_threshold(),
            threshold_bonus: default_threshold_bonus(),
        }
    }
}

impl ScoringConfig {
    /// Reject negative or non-finite weights and a zero threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("scoring.line_weight", self.line_weight),
            ("scoring.block_weight", self.block_weight),
            ("scoring.file_weight", self.file_weight),
            ("scoring.threshold_bonus", self.threshold_bonus),
        ];
        for (field, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be a finite non-negative number, got {value}"),
                ));
            }
        }
        if self.file_threshold == 0 {
            return Err(ConfigError::invalid(
                "scoring.file_threshold",
                "threshold must be at least 1 file",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blending
// ---------------------------------------------------------------------------

/// Weights of the final blend `structural_weight * s + advisory_weight * a`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendConfig {
    #[serde(default = "default_half")]
    pub structural_weight: f64,

    #[serde(default = "default_half")]
    pub advisory_weight: f64,
}

fn default_half() -> f64 {
    0.5
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            structural_weight: 0.5,
            advisory_weight: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Advisory oracle
// ---------------------------------------------------------------------------

/// Advisory oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    /// Consult the oracle at all. When false the blend is structural only.
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible API (must end with `/`).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model name sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Upper bound on a single oracle request, in seconds.
    #[serde(default = "default_advisory_timeout")]
    pub timeout_secs: u64,

    /// Resolved API key (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_api_key_env() -> String {
    "MERGE_ORDER_API_KEY".into()
}
fn default_advisory_timeout() -> u64 {
    30
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_advisory_timeout(),
            api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Which order search to run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Trial-merge every permutation in a disposable branch.
    #[default]
    Exhaustive,
    /// Score each branch once against the base and sort.
    Independent,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhaustive => write!(f, "exhaustive"),
            Self::Independent => write!(f, "independent"),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exhaustive" => Ok(Self::Exhaustive),
            "independent" => Ok(Self::Independent),
            other => Err(ConfigError::invalid(
                "search.strategy",
                format!("unknown strategy '{other}' (expected exhaustive or independent)"),
            )),
        }
    }
}

/// Which side wins when a simulated conflict is force-resolved.
///
/// Forced resolution only keeps the simulation going; it biases the
/// conflicts later branches see, so it is a policy rather than a constant.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Keep what is already in the simulation branch (`-X ours`).
    #[default]
    PreferBase,
    /// Take the incoming branch's side (`-X theirs`).
    PreferIncoming,
}

impl std::fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreferBase => write!(f, "prefer_base"),
            Self::PreferIncoming => write!(f, "prefer_incoming"),
        }
    }
}

/// Order search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub strategy: Strategy,

    /// Largest branch set the exhaustive strategy accepts without forcing.
    #[serde(default = "default_max_exhaustive")]
    pub max_exhaustive_branches: usize,

    /// Forced-resolution policy during simulation.
    #[serde(default)]
    pub resolution: ResolutionPolicy,

    /// Abandon a permutation once its partial score reaches the best total.
    #[serde(default)]
    pub prune_dominated: bool,
}

fn default_max_exhaustive() -> usize {
    8
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_exhaustive_branches: default_max_exhaustive(),
            resolution: ResolutionPolicy::default(),
            prune_dominated: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve the advisory API key from its environment variable.
    ///
    /// A missing key is not an error: the advisory scorer degrades to its
    /// neutral score and says so in every rationale.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if self.advisory.enabled {
            self.advisory.api_key =
                resolve_optional_env(&self.advisory.api_key_env, "advisory.api_key_env");
        }
        Ok(())
    }

    /// Validate that every value is sane. Fails fast, before any run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repo.remote.is_empty() {
            return Err(ConfigError::invalid("repo.remote", "remote must not be empty"));
        }
        if self.repo.base_branch.is_empty() {
            return Err(ConfigError::invalid(
                "repo.base_branch",
                "base branch must not be empty",
            ));
        }
        if self.repo.workspace_prefix.is_empty() {
            return Err(ConfigError::invalid(
                "repo.workspace_prefix",
                "workspace prefix must not be empty",
            ));
        }
        if self.repo.command_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "repo.command_timeout_secs",
                "timeout must be > 0",
            ));
        }

        self.scoring.validate()?;
        validate_blend_weights(self.blend.structural_weight, self.blend.advisory_weight)?;

        if self.advisory.enabled {
            if self.advisory.timeout_secs == 0 {
                return Err(ConfigError::invalid(
                    "advisory.timeout_secs",
                    "timeout must be > 0",
                ));
            }
            if !self.advisory.api_url.ends_with('/') {
                return Err(ConfigError::invalid(
                    "advisory.api_url",
                    "API base URL must end with '/'",
                ));
            }
        }

        if self.search.max_exhaustive_branches == 0 {
            return Err(ConfigError::invalid(
                "search.max_exhaustive_branches",
                "cap must be at least 1 branch",
            ));
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Check that blend weights are each in `[0, 1]` and sum to one.
pub fn validate_blend_weights(structural: f64, advisory: f64) -> Result<(), ConfigError> {
    for (field, value) in [
        ("blend.structural_weight", structural),
        ("blend.advisory_weight", advisory),
    ] {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::invalid(
                field,
                format!("weight must be within [0, 1], got {value}"),
            ));
        }
    }
    let sum = structural + advisory;
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ConfigError::invalid(
            "blend",
            format!("weights must sum to 1, got {structural} + {advisory} = {sum}"),
        ));
    }
    Ok(())
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

/// Commented configuration written by `mergeorder init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# mergeorder configuration
# Every key is optional; the values below are the defaults.

log_level = "warn"

[repo]
path = "."
remote = "origin"
base_branch = "main"
workspace_prefix = "merge-order-sim"
fetch = true
command_timeout_secs = 120

[scoring]
line_weight = 0.4
block_weight = 6.0
file_weight = 12.0
file_threshold = 5
threshold_bonus = 25.0

[blend]
structural_weight = 0.5
advisory_weight = 0.5

[advisory]
# When disabled, scores are purely structural.
enabled = false
api_url = "https://api.openai.com/v1/"
model = "gpt-4o-mini"
api_key_env = "MERGE_ORDER_API_KEY"
timeout_secs = 30

[search]
# exhaustive | independent
strategy = "exhaustive"
max_exhaustive_branches = 8
# prefer_base | prefer_incoming
resolution = "prefer_base"
prune_dominated = false
"#;
