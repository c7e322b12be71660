//! Benchmark configuration.
//!
//! Values are resolved in order: built-in defaults, an optional YAML file,
//! then `MECHEVAL_*` environment variables. The CLI applies its own flags
//! last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Prefix shared by every configuration environment variable.
pub const ENV_PREFIX: &str = "MECHEVAL_";

/// Numeric tolerance policy used by the deterministic grader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TolerancePolicy {
    /// Relative tolerance never drops below this floor.
    pub min_relative_tolerance: f64,
    /// Absolute tolerance used when the gold value is near zero.
    pub absolute_floor: f64,
    /// Gold magnitudes below this switch to absolute comparison.
    pub near_zero_threshold: f64,
    /// Lower bound of the plausible-magnitude band, as a multiple of gold.
    pub unit_band_lower: f64,
    /// Upper bound of the plausible-magnitude band, as a multiple of gold.
    pub unit_band_upper: f64,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        Self {
            min_relative_tolerance: 0.01,
            absolute_floor: 1e-6,
            near_zero_threshold: 1e-6,
            unit_band_lower: 0.1,
            unit_band_upper: 10.0,
        }
    }
}

/// Settings for the LLM judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub enabled: bool,
    pub model: String,
    pub api_base: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "openai/gpt-4o".to_string(),
            api_base: None,
            api_key: None,
            temperature: 0.0,
            max_tokens: 1024,
            timeout_secs: 120,
        }
    }
}

/// Timeouts for the agent-to-agent transport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            connect_timeout_secs: 30,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Top-level benchmark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub target_url: Option<String>,
    pub judge: JudgeConfig,
    pub transport: TransportConfig,
    /// Turn budget per task instance, excluding repair prompts.
    pub max_turns: usize,
    pub max_format_retries: usize,
    pub sandbox_timeout_secs: u64,
    pub bootstrap_iterations: usize,
    pub confidence_level: f64,
    pub seed: Option<u64>,
    pub tolerance: TolerancePolicy,
    pub materials_file: Option<PathBuf>,
    /// Instances evaluated concurrently; results keep input order.
    pub concurrency: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            target_url: None,
            judge: JudgeConfig::default(),
            transport: TransportConfig::default(),
            max_turns: 30,
            max_format_retries: 1,
            sandbox_timeout_secs: 30,
            bootstrap_iterations: 1000,
            confidence_level: 0.95,
            seed: None,
            tolerance: TolerancePolicy::default(),
            materials_file: None,
            concurrency: 1,
        }
    }
}

impl BenchConfig {
    /// Loads defaults, an optional YAML file and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Creates a configuration from defaults and environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Parses a YAML configuration file. Missing fields keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Applies `MECHEVAL_*` overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));

        if let Some(url) = var("TARGET_URL") {
            self.target_url = Some(url);
        }
        if let Some(model) = var("JUDGE_MODEL") {
            self.judge.model = model;
        }
        if let Some(base) = var("JUDGE_API_BASE") {
            self.judge.api_base = Some(base);
        }
        if let Some(key) = var("JUDGE_API_KEY") {
            self.judge.api_key = Some(key);
        }
        if let Some(enabled) = parse_env(&var, "JUDGE_ENABLED")? {
            self.judge.enabled = enabled;
        }
        if let Some(turns) = parse_env(&var, "MAX_TURNS")? {
            self.max_turns = turns;
        }
        if let Some(retries) = parse_env(&var, "MAX_FORMAT_RETRIES")? {
            self.max_format_retries = retries;
        }
        if let Some(secs) = parse_env(&var, "SANDBOX_TIMEOUT")? {
            self.sandbox_timeout_secs = secs;
        }
        if let Some(secs) = parse_env(&var, "A2A_TIMEOUT")? {
            self.transport.timeout_secs = secs;
        }
        if let Some(secs) = parse_env(&var, "A2A_CONNECT_TIMEOUT")? {
            self.transport.connect_timeout_secs = secs;
        }
        if let Some(iterations) = parse_env(&var, "BOOTSTRAP_ITERATIONS")? {
            self.bootstrap_iterations = iterations;
        }
        if let Some(level) = parse_env(&var, "CONFIDENCE_LEVEL")? {
            self.confidence_level = level;
        }
        if let Some(seed) = parse_env(&var, "SEED")? {
            self.seed = Some(seed);
        }
        if let Some(path) = var("MATERIALS_FILE") {
            self.materials_file = Some(PathBuf::from(path));
        }
        if let Some(concurrency) = parse_env(&var, "CONCURRENCY")? {
            self.concurrency = concurrency;
        }

        Ok(())
    }

    /// Rejects values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(ConfigError::Invalid("max_turns must be at least 1".into()));
        }
        if self.bootstrap_iterations == 0 {
            return Err(ConfigError::Invalid(
                "bootstrap_iterations must be at least 1".into(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if self.sandbox_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "sandbox_timeout_secs must be at least 1".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }

        let tol = &self.tolerance;
        if !(tol.unit_band_lower > 0.0 && tol.unit_band_lower < tol.unit_band_upper) {
            return Err(ConfigError::Invalid(format!(
                "unit band [{}, {}] must satisfy 0 < lower < upper",
                tol.unit_band_lower, tol.unit_band_upper
            )));
        }
        if tol.min_relative_tolerance < 0.0 || tol.absolute_floor < 0.0 {
            return Err(ConfigError::Invalid(
                "tolerances must be non-negative".into(),
            ));
        }

        Ok(())
    }

    pub fn sandbox_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox_timeout_secs)
    }

    /// Builder: set the target URL.
    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    /// Builder: set the turn budget.
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Builder: set the bootstrap seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builder: enable or disable the LLM judge.
    pub fn with_judge_enabled(mut self, enabled: bool) -> Self {
        self.judge.enabled = enabled;
        self
    }
}

fn parse_env<T, F>(var: &F, suffix: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(suffix) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: format!("{}{}", ENV_PREFIX, suffix),
                value: raw,
            }),
        None => Ok(None),
    }
}
