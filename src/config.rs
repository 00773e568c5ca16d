//! Configuration management
//!
//! All tunable constants of the network in one place. Defaults are the
//! documented values; a YAML file can override any subset, and `GRANTGRAPH_*`
//! environment variables override the file.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Identity resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Edit ratio at or above which two distinct keys are queued for review
    pub fuzzy_threshold: f64,
    /// Confidence given to role records that carry none
    pub default_confidence: f64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.85,
            default_confidence: 0.5,
        }
    }
}

/// Weights of the organization influence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgInfluenceWeights {
    pub degree: f64,
    pub betweenness: f64,
    pub closeness: f64,
    pub connections: f64,
    /// `c / (c + saturation)` term for the connection count `c`
    pub connection_saturation: f64,
}

impl Default for OrgInfluenceWeights {
    fn default() -> Self {
        Self {
            degree: 0.30,
            betweenness: 0.35,
            closeness: 0.20,
            connections: 0.15,
            connection_saturation: 5.0,
        }
    }
}

/// Weights of the person influence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonInfluenceWeights {
    pub position: f64,
    pub network: f64,
    /// Summed role weight that saturates the position score
    pub position_cap: f64,
    /// Share of the network score taken by mean organization influence
    pub organization_share: f64,
    /// Share of the network score taken by bridge count
    pub bridge_share: f64,
    /// Bridge count that saturates the bridge term
    pub bridge_cap: f64,
}

impl Default for PersonInfluenceWeights {
    fn default() -> Self {
        Self {
            position: 0.4,
            network: 0.6,
            position_cap: 10.0,
            organization_share: 0.6,
            bridge_share: 0.4,
            bridge_cap: 5.0,
        }
    }
}

/// Metrics engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Components above this size use the betweenness proxy
    pub exact_betweenness_max_nodes: usize,
    pub louvain_seed: u64,
    pub min_modularity_gain: f64,
    pub recency_window_years: i32,
    pub recency_bonus: f64,
    /// Reference year for recency; latest grant year in the data when unset
    pub reference_year: Option<i32>,
    pub similarity_threshold: f64,
    pub organization: OrgInfluenceWeights,
    pub person: PersonInfluenceWeights,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            exact_betweenness_max_nodes: 2_000,
            louvain_seed: 42,
            min_modularity_gain: 1e-7,
            recency_window_years: 3,
            recency_bonus: 0.25,
            reference_year: None,
            similarity_threshold: 0.5,
            organization: OrgInfluenceWeights::default(),
            person: PersonInfluenceWeights::default(),
        }
    }
}

/// Pathfinder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfinderConfig {
    pub max_hops_limit: usize,
    pub max_enumerated_paths: usize,
    pub top_n: usize,
    pub timeout_ms: u64,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_hops_limit: 6,
            max_enumerated_paths: 10_000,
            top_n: 5,
            timeout_ms: 5_000,
        }
    }
}

/// Recompute coordinator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecomputeConfig {
    /// Hard budget for one component recompute
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RecomputeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub identity: IdentityConfig,
    pub metrics: MetricsConfig,
    pub pathfinder: PathfinderConfig,
    pub recompute: RecomputeConfig,
}

impl NetworkConfig {
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: NetworkConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file, apply environment overrides and validate
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let mut config: NetworkConfig = serde_yaml::from_str(&std::fs::read_to_string(path)?)?;
        config.apply_env();
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Defaults with environment overrides, validated
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `GRANTGRAPH_*` environment variables. Unparseable
    /// values are ignored with a warning.
    pub fn apply_env(&mut self) {
        override_from_env("GRANTGRAPH_FUZZY_THRESHOLD", &mut self.identity.fuzzy_threshold);
        override_from_env("GRANTGRAPH_DEFAULT_CONFIDENCE", &mut self.identity.default_confidence);

        override_from_env(
            "GRANTGRAPH_EXACT_BETWEENNESS_MAX_NODES",
            &mut self.metrics.exact_betweenness_max_nodes,
        );
        override_from_env("GRANTGRAPH_LOUVAIN_SEED", &mut self.metrics.louvain_seed);
        override_from_env("GRANTGRAPH_RECENCY_WINDOW_YEARS", &mut self.metrics.recency_window_years);
        override_from_env("GRANTGRAPH_RECENCY_BONUS", &mut self.metrics.recency_bonus);
        override_from_env("GRANTGRAPH_SIMILARITY_THRESHOLD", &mut self.metrics.similarity_threshold);
        if let Ok(val) = env::var("GRANTGRAPH_REFERENCE_YEAR") {
            match val.parse() {
                Ok(year) => self.metrics.reference_year = Some(year),
                Err(_) => warn!("Ignoring GRANTGRAPH_REFERENCE_YEAR={:?}", val),
            }
        }

        override_from_env("GRANTGRAPH_MAX_HOPS_LIMIT", &mut self.pathfinder.max_hops_limit);
        override_from_env("GRANTGRAPH_MAX_ENUMERATED_PATHS", &mut self.pathfinder.max_enumerated_paths);
        override_from_env("GRANTGRAPH_TOP_PATHS", &mut self.pathfinder.top_n);
        override_from_env("GRANTGRAPH_PATH_TIMEOUT_MS", &mut self.pathfinder.timeout_ms);

        override_from_env("GRANTGRAPH_RECOMPUTE_TIMEOUT_MS", &mut self.recompute.timeout_ms);
        override_from_env("GRANTGRAPH_RECOMPUTE_MAX_RETRIES", &mut self.recompute.max_retries);
        override_from_env("GRANTGRAPH_RECOMPUTE_BACKOFF_MS", &mut self.recompute.backoff_base_ms);
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let unit = [
            ("identity.fuzzy_threshold", self.identity.fuzzy_threshold),
            ("identity.default_confidence", self.identity.default_confidence),
            ("metrics.recency_bonus", self.metrics.recency_bonus),
            ("metrics.similarity_threshold", self.metrics.similarity_threshold),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{} = {} is outside [0, 1]", name, value)));
            }
        }
        if self.metrics.recency_window_years < 1 {
            return Err(ConfigError::Invalid("metrics.recency_window_years must be at least 1".into()));
        }
        if self.pathfinder.max_hops_limit == 0 {
            return Err(ConfigError::Invalid("pathfinder.max_hops_limit must be at least 1".into()));
        }
        if self.pathfinder.top_n == 0 || self.pathfinder.max_enumerated_paths == 0 {
            return Err(ConfigError::Invalid("pathfinder limits must be positive".into()));
        }
        if self.recompute.timeout_ms == 0 || self.pathfinder.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        Ok(())
    }

    /// Log the effective configuration
    pub fn log(&self) {
        info!(
            "Configuration: fuzzy_threshold={}, exact_betweenness_max_nodes={}, louvain_seed={}, max_hops_limit={}, recompute_timeout_ms={}",
            self.identity.fuzzy_threshold,
            self.metrics.exact_betweenness_max_nodes,
            self.metrics.louvain_seed,
            self.pathfinder.max_hops_limit,
            self.recompute.timeout_ms
        );
    }
}

fn override_from_env<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(val) = env::var(name) {
        match val.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("Ignoring {}={:?}", name, val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.identity.fuzzy_threshold, 0.85);
        assert_eq!(config.metrics.exact_betweenness_max_nodes, 2_000);
        assert_eq!(config.metrics.louvain_seed, 42);
        assert_eq!(config.pathfinder.max_hops_limit, 6);
        assert_eq!(config.pathfinder.top_n, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = NetworkConfig::from_yaml_str(
            "metrics:\n  recency_bonus: 0.1\n  reference_year: 2023\npathfinder:\n  top_n: 3\n",
        )
        .unwrap();
        assert_eq!(config.metrics.recency_bonus, 0.1);
        assert_eq!(config.metrics.reference_year, Some(2023));
        assert_eq!(config.metrics.recency_window_years, 3);
        assert_eq!(config.pathfinder.top_n, 3);
        assert_eq!(config.identity, IdentityConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            NetworkConfig::from_yaml_str("identity:\n  fuzzy_threshold: 1.5\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(NetworkConfig::from_yaml_str("pathfinder:\n  max_hops_limit: 0\n").is_err());
        assert!(matches!(
            NetworkConfig::from_yaml_str("metrics: [1, 2]"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_env_override() {
        env::set_var("GRANTGRAPH_LOUVAIN_SEED", "7");
        env::set_var("GRANTGRAPH_RECOMPUTE_MAX_RETRIES", "not-a-number");

        let config = NetworkConfig::from_env().unwrap();
        assert_eq!(config.metrics.louvain_seed, 7);
        assert_eq!(config.recompute.max_retries, 3);

        env::remove_var("GRANTGRAPH_LOUVAIN_SEED");
        env::remove_var("GRANTGRAPH_RECOMPUTE_MAX_RETRIES");

        // Overrides go through the same validation as files
        env::set_var("GRANTGRAPH_SIMILARITY_THRESHOLD", "1.5");
        assert!(matches!(NetworkConfig::from_env(), Err(ConfigError::Invalid(_))));
        env::set_var("GRANTGRAPH_SIMILARITY_THRESHOLD", "0.6");
        assert_eq!(NetworkConfig::from_env().unwrap().metrics.similarity_threshold, 0.6);
        env::remove_var("GRANTGRAPH_SIMILARITY_THRESHOLD");
    }
}
