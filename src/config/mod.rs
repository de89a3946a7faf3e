// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for AZ Interface

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Web server settings
    #[serde(default)]
    pub web: WebConfig,

    /// Mock backend the status command talks to
    #[serde(default)]
    pub backend: BackendConfig,

    /// Workflow runner settings
    #[serde(default)]
    pub workflows: WorkflowConfig,

    /// Startup seed data
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub cors_permissive: bool,
    /// Buffered change events per WebSocket client before it starts lagging
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    Simulated,
    Webhook,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowConfig {
    #[serde(default = "default_runner")]
    pub runner: RunnerKind,
    /// Base URL of the workflow engine webhooks (webhook runner only)
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_steps")]
    pub simulated_steps: u32,
    #[serde(default = "default_step_delay")]
    pub step_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SeedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_true() -> bool { true }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8080 }
fn default_feed_capacity() -> usize { 256 }
fn default_backend_url() -> String { "http://localhost:3001".to_string() }
fn default_timeout() -> u64 { 10 }
fn default_runner() -> RunnerKind { RunnerKind::Simulated }
fn default_steps() -> u32 { 4 }
fn default_step_delay() -> u64 { 500 }

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            cors_permissive: true,
            feed_capacity: default_feed_capacity(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            runner: default_runner(),
            webhook_url: None,
            timeout_secs: default_timeout(),
            simulated_steps: default_steps(),
            step_delay_ms: default_step_delay(),
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::AzError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> crate::Result<()> {
        if self.workflows.runner == RunnerKind::Webhook && self.workflows.webhook_url.is_none() {
            return Err(crate::AzError::Config(
                "workflows.webhook_url is required when workflows.runner is \"webhook\"".to_string(),
            ));
        }
        if self.web.feed_capacity == 0 {
            return Err(crate::AzError::Config("web.feed_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.workflows.runner, RunnerKind::Simulated);
        assert!(config.seed.enabled);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.web.port = 9191;
        config.seed.enabled = false;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.web.port, 9191);
        assert!(!loaded.seed.enabled);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"web": {"port": 3000}}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.web.port, 3000);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.workflows.simulated_steps, 4);
    }

    #[test]
    fn test_webhook_runner_needs_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"workflows": {"runner": "webhook"}}"#).unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, crate::AzError::Config(_)));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(crate::AzError::Config(_))));
    }
}
