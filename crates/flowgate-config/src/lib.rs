// flowgate-config/src/lib.rs
// ============================================================================
// Crate: flowgate-config
// Description: Configuration loading and validation for the flow engine.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path
//! limits, then validated fail-closed before the engine starts. Every knob
//! carries the same default the core crate assumes when no configuration is
//! supplied, so running with `FlowEngineConfig::default()` and running with
//! a freshly generated example file behave identically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "flowgate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "FLOWGATE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Default session lifetime, in milliseconds.
pub const DEFAULT_FLOW_TTL_MS: i64 = 600_000;
/// Default idempotency cache FIFO capacity.
pub const DEFAULT_MAX_PROCESSED_REQUEST_IDS: usize = 100;
/// Default state-store shard count.
pub const DEFAULT_SHARD_COUNT: usize = 32;
/// Default interval between TTL deletion alarm sweeps, in milliseconds.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;
/// Default rate-limit sliding window, in milliseconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: i64 = 60_000;
/// Default maximum submits accepted per rate-limit window.
pub const DEFAULT_MAX_REQUESTS_PER_WINDOW: usize = 30;
/// Default hard session timeout, in milliseconds.
pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 1_800_000;
/// Default maximum visits a single node may accumulate before cycle detection trips.
pub const DEFAULT_MAX_VISITS_PER_NODE: usize = 3;
/// Default maximum total nodes a single session history may record.
pub const DEFAULT_MAX_TOTAL_NODES: usize = 50;
/// Default bound on the visited-node and audit-log histories.
pub const DEFAULT_MAX_VISITED_HISTORY: usize = 200;
/// Default before-hook timeout, in milliseconds.
pub const DEFAULT_BEFORE_HOOK_TIMEOUT_MS: u64 = 5_000;
/// Default after-hook timeout, in milliseconds.
pub const DEFAULT_AFTER_HOOK_TIMEOUT_MS: u64 = 30_000;
/// Default hook registration priority.
pub const DEFAULT_HOOK_PRIORITY: i32 = 0;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Top-level flow engine configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowEngineConfig {
    /// Flow session lifecycle knobs.
    pub session: SessionConfig,
    /// Flow state store sharding knobs.
    pub store: StoreConfig,
    /// Per-session rate limiting knobs.
    pub rate_limit: RateLimitConfig,
    /// Cycle-detection knobs applied during `submit`.
    pub cycle_detection: CycleDetectionConfig,
    /// Event dispatcher and hook registry knobs.
    pub hooks: HookConfig,
}

impl Default for FlowEngineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            store: StoreConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cycle_detection: CycleDetectionConfig::default(),
            hooks: HookConfig::default(),
        }
    }
}

impl FlowEngineConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// an explicit `path`, then the `FLOWGATE_CONFIG` environment variable,
    /// then `flowgate.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, exceeds the
    /// size cap, is not valid UTF-8, fails to parse, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content =
            std::str::from_utf8(&bytes).map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency, failing closed
    /// on any out-of-range value rather than silently clamping it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when any knob is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        self.store.validate()?;
        self.rate_limit.validate()?;
        self.cycle_detection.validate()?;
        self.hooks.validate()?;
        Ok(())
    }
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session lifetime in milliseconds from `init` to expiry.
    pub default_flow_ttl_ms: i64,
    /// Hard session timeout in milliseconds from `createdAt`, checked per submit.
    pub session_timeout_ms: i64,
    /// Idempotency FIFO cache capacity per session.
    pub max_processed_request_ids: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_flow_ttl_ms: DEFAULT_FLOW_TTL_MS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            max_processed_request_ids: DEFAULT_MAX_PROCESSED_REQUEST_IDS,
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_flow_ttl_ms <= 0 {
            return Err(ConfigError::Invalid("session.default_flow_ttl_ms must be positive".to_string()));
        }
        if self.session_timeout_ms <= 0 {
            return Err(ConfigError::Invalid("session.session_timeout_ms must be positive".to_string()));
        }
        if self.max_processed_request_ids == 0 {
            return Err(ConfigError::Invalid(
                "session.max_processed_request_ids must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Flow state store sharding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of shard actor tasks the state store spawns.
    pub shard_count: usize,
    /// Interval, in milliseconds, between TTL deletion alarm sweeps.
    pub sweep_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(ConfigError::Invalid("store.shard_count must be at least 1".to_string()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid("store.sweep_interval_ms must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Per-session submit rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Width of the sliding window, in milliseconds.
    pub window_ms: i64,
    /// Maximum submits accepted within one window.
    pub max_requests_per_window: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS, max_requests_per_window: DEFAULT_MAX_REQUESTS_PER_WINDOW }
    }
}

impl RateLimitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms <= 0 {
            return Err(ConfigError::Invalid("rate_limit.window_ms must be positive".to_string()));
        }
        if self.max_requests_per_window == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.max_requests_per_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cycle-detection configuration applied while advancing a session.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CycleDetectionConfig {
    /// Maximum times a single node may appear in `visitedNodes` before a
    /// submit fails with `circular_reference`.
    pub max_visits_per_node: usize,
    /// Maximum total nodes a session's visited-node history may hold before
    /// a submit fails with `flow_too_long`.
    pub max_total_nodes: usize,
    /// Bound applied to the visited-node and audit-log histories.
    pub max_visited_history: usize,
}

impl Default for CycleDetectionConfig {
    fn default() -> Self {
        Self {
            max_visits_per_node: DEFAULT_MAX_VISITS_PER_NODE,
            max_total_nodes: DEFAULT_MAX_TOTAL_NODES,
            max_visited_history: DEFAULT_MAX_VISITED_HISTORY,
        }
    }
}

impl CycleDetectionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_visits_per_node == 0 {
            return Err(ConfigError::Invalid(
                "cycle_detection.max_visits_per_node must be at least 1".to_string(),
            ));
        }
        if self.max_total_nodes == 0 {
            return Err(ConfigError::Invalid("cycle_detection.max_total_nodes must be at least 1".to_string()));
        }
        if self.max_visited_history < self.max_total_nodes {
            return Err(ConfigError::Invalid(
                "cycle_detection.max_visited_history must be at least max_total_nodes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Event dispatcher and hook registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HookConfig {
    /// Default before-hook timeout applied when a registration omits one.
    pub default_before_timeout_ms: u64,
    /// Default after-hook timeout applied when a registration omits one.
    pub default_after_timeout_ms: u64,
    /// Default registration priority applied when a registration omits one.
    pub default_priority: i32,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            default_before_timeout_ms: DEFAULT_BEFORE_HOOK_TIMEOUT_MS,
            default_after_timeout_ms: DEFAULT_AFTER_HOOK_TIMEOUT_MS,
            default_priority: DEFAULT_HOOK_PRIORITY,
        }
    }
}

impl HookConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_before_timeout_ms == 0 {
            return Err(ConfigError::Invalid("hooks.default_before_timeout_ms must be positive".to_string()));
        }
        if self.default_after_timeout_ms == 0 {
            return Err(ConfigError::Invalid("hooks.default_after_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while loading or validating a [`FlowEngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from an explicit argument, the environment, or the default filename.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits before it is opened.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = FlowEngineConfig::default();
        assert_eq!(config.session.default_flow_ttl_ms, 600_000);
        assert_eq!(config.session.max_processed_request_ids, 100);
        assert_eq!(config.store.shard_count, 32);
        assert_eq!(config.store.sweep_interval_ms, 60_000);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.rate_limit.max_requests_per_window, 30);
        assert_eq!(config.session.session_timeout_ms, 1_800_000);
        assert_eq!(config.cycle_detection.max_visits_per_node, 3);
        assert_eq!(config.cycle_detection.max_total_nodes, 50);
        assert_eq!(config.cycle_detection.max_visited_history, 200);
        assert_eq!(config.hooks.default_before_timeout_ms, 5_000);
        assert_eq!(config.hooks.default_after_timeout_ms, 30_000);
        assert_eq!(config.hooks.default_priority, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_shard_count_fails_validation() {
        let mut config = FlowEngineConfig::default();
        config.store.shard_count = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_sweep_interval_fails_validation() {
        let mut config = FlowEngineConfig::default();
        config.store.sweep_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn partial_toml_document_fills_in_remaining_defaults() {
        let config: FlowEngineConfig = toml::from_str("[rate_limit]\nmax_requests_per_window = 10\n").unwrap();
        assert_eq!(config.rate_limit.max_requests_per_window, 10);
        assert_eq!(config.rate_limit.window_ms, DEFAULT_RATE_LIMIT_WINDOW_MS);
        assert_eq!(config.store.shard_count, DEFAULT_SHARD_COUNT);
    }

    #[test]
    fn visited_history_shorter_than_total_nodes_fails_validation() {
        let mut config = FlowEngineConfig::default();
        config.cycle_detection.max_visited_history = 10;
        config.cycle_detection.max_total_nodes = 50;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
