// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! AZ Interface: observable in-memory data services
//!
//! Each data service (discovery targets, curated items, workflow runs) owns
//! its records and publishes an immutable snapshot to a notification hub
//! after every mutation. The web module serves the mock backend, REST
//! access to the services and a WebSocket feed of those snapshots.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod feed;
pub mod hub;
pub mod items;
pub mod mock;
pub mod store;
pub mod targets;
pub mod web;
pub mod workflows;

pub use config::AppConfig;
pub use context::AppContext;
pub use error::{AzError, Result};
