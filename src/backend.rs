// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP client for the (mock) backend
//!
//! The backend is treated as an opaque JSON request/response service. Any
//! failure comes back as [`AzError::Backend`]; nothing is retried.

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::config::BackendConfig;
use crate::mock::{Agent, HealthResponse};
use crate::{AzError, Result};

/// Backend API client
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    /// Create a new backend client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            AzError::Backend(format!("Cannot reach backend at {}: {}", self.base_url, e))
        })?;

        if !response.status().is_success() {
            return Err(AzError::Backend(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AzError::Backend(format!("Invalid JSON from {}: {}", url, e)))
    }

    /// Check if the backend is available
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json("health").await
    }

    pub async fn agents(&self) -> Result<Vec<Agent>> {
        self.get_json("api/agents").await
    }
}
