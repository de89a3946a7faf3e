// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Discovery targets and their curated content
//!
//! A target moves through `discovered -> validated -> monitored`. Only
//! explicit calls move it forward; monitored targets become refresh
//! candidates for whatever collaborator performs the refresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::hub::Subscription;
use crate::store::{Record, RecordId, RecordStore, Snapshot};
use crate::{AzError, Result};

/// Topic the target service publishes on
pub const TOPIC: &str = "targets";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Discovered,
    Validated,
    Monitored,
}

/// A discovered source worth curating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: RecordId,
    pub url: String,
    pub title: String,
    pub status: TargetStatus,
    pub is_new_discovery: bool,
    pub discovered_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Input for [`TargetService::add`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTarget {
    pub url: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }
}

/// Partial update for [`TargetService::update`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetPatch {
    pub url: Option<String>,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Curated content attached to a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CuratedContent {
    pub target_id: RecordId,
    pub summary: String,
    pub excerpts: Vec<String>,
    pub curated_at: DateTime<Utc>,
}

/// Input for [`TargetService::curate`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CurationInput {
    pub summary: Option<String>,
    #[serde(default)]
    pub excerpts: Vec<String>,
}

pub type TargetSnapshot = Snapshot<Target, CuratedContent>;

impl Target {
    /// A freshly discovered target, used for seed data
    pub fn discovered(url: &str, title: &str) -> Self {
        Self {
            id: RecordId::generate(),
            url: url.to_string(),
            title: title.to_string(),
            status: TargetStatus::Discovered,
            is_new_discovery: true,
            discovered_at: Utc::now(),
            validated_at: None,
            last_refreshed_at: None,
            tags: Vec::new(),
        }
    }
}

/// Check that `url` is an absolute http(s) URL with a host.
///
/// Returns the trimmed input as given together with the parsed host.
fn check_url(url: &str) -> Result<(String, String)> {
    let url = url.trim();
    if url.is_empty() {
        return Err(AzError::validation("url is required"));
    }
    let parsed = Url::parse(url).map_err(|e| AzError::validation(format!("invalid url {}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AzError::validation(format!("url must use http or https: {}", url)));
    }
    let host = match parsed.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => return Err(AzError::validation(format!("url has no host: {}", url))),
    };
    Ok((url.to_string(), host))
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

impl Record for Target {
    type Input = NewTarget;
    type Patch = TargetPatch;
    const KIND: &'static str = "target";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn create(id: RecordId, input: NewTarget) -> Result<Self> {
        let (url, host) = check_url(input.url.as_deref().unwrap_or(""))?;
        let title = match input.title.map(|t| t.trim().to_string()) {
            Some(t) if !t.is_empty() => t,
            _ => host,
        };

        Ok(Self {
            id,
            url,
            title,
            status: TargetStatus::Discovered,
            is_new_discovery: true,
            discovered_at: Utc::now(),
            validated_at: None,
            last_refreshed_at: None,
            tags: clean_tags(input.tags),
        })
    }

    fn apply(&mut self, patch: TargetPatch) -> Result<()> {
        if let Some(url) = patch.url {
            self.url = check_url(&url)?.0;
        }
        if let Some(title) = patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(AzError::validation("title cannot be empty"));
            }
            self.title = title.to_string();
        }
        if let Some(tags) = patch.tags {
            self.tags = clean_tags(tags);
        }
        Ok(())
    }
}

/// Data service for discovery targets
#[derive(Clone, Debug)]
pub struct TargetService {
    store: RecordStore<Target, CuratedContent>,
}

impl Default for TargetService {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetService {
    pub fn new() -> Self {
        Self {
            store: RecordStore::new(TOPIC),
        }
    }

    pub fn store(&self) -> &RecordStore<Target, CuratedContent> {
        &self.store
    }

    pub fn list(&self) -> TargetSnapshot {
        self.store.list()
    }

    pub fn get(&self, id: &RecordId) -> Result<Target> {
        self.store.get(id)
    }

    pub fn add(&self, input: NewTarget) -> Result<Target> {
        let target = self.store.add(input)?;
        info!("New discovery: {} ({})", target.title, target.url);
        Ok(target)
    }

    pub fn update(&self, id: &RecordId, patch: TargetPatch) -> Result<Target> {
        self.store.update(id, patch)
    }

    /// Remove a target together with its curated content
    pub fn remove(&self, id: &RecordId) -> Result<Target> {
        self.store.remove(id)
    }

    /// Confirm a discovered target: `discovered -> validated`
    pub fn validate_target(&self, id: &RecordId) -> Result<Target> {
        self.store.modify(id, |t| match t.status {
            TargetStatus::Discovered => {
                t.status = TargetStatus::Validated;
                t.is_new_discovery = false;
                t.validated_at = Some(Utc::now());
                Ok(())
            }
            other => Err(AzError::validation(format!(
                "target {} is {:?}, only discovered targets can be validated",
                t.id, other
            ))),
        })
    }

    /// Start monitoring a validated target: `validated -> monitored`
    pub fn monitor_target(&self, id: &RecordId) -> Result<Target> {
        self.store.modify(id, |t| match t.status {
            TargetStatus::Validated => {
                t.status = TargetStatus::Monitored;
                Ok(())
            }
            other => Err(AzError::validation(format!(
                "target {} is {:?}, only validated targets can be monitored",
                t.id, other
            ))),
        })
    }

    /// Monitored targets, oldest refresh first (never-refreshed ones lead)
    pub fn refresh_candidates(&self) -> Vec<Target> {
        let mut candidates: Vec<Target> = self
            .list()
            .iter()
            .filter(|t| t.status == TargetStatus::Monitored)
            .cloned()
            .collect();
        candidates.sort_by_key(|t| t.last_refreshed_at);
        candidates
    }

    /// Record that an external refresh of a monitored target happened
    pub fn mark_refreshed(&self, id: &RecordId) -> Result<Target> {
        self.store.modify(id, |t| {
            if t.status != TargetStatus::Monitored {
                return Err(AzError::validation(format!("target {} is not monitored", t.id)));
            }
            t.last_refreshed_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Attach curated content to an existing target
    pub fn curate(&self, id: &RecordId, input: CurationInput) -> Result<CuratedContent> {
        let summary = input
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AzError::validation("summary is required"))?;

        let content = CuratedContent {
            target_id: id.clone(),
            summary,
            excerpts: input.excerpts,
            curated_at: Utc::now(),
        };
        self.store.set_derived(id, content.clone())?;
        Ok(content)
    }

    /// Curated content for `id`, or `None`. Never notifies.
    pub fn get_data_for_target(&self, id: &RecordId) -> Option<CuratedContent> {
        self.store.derived(id)
    }

    pub fn seed(&self, targets: Vec<Target>) -> Result<()> {
        self.store.seed(targets)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TargetSnapshot) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn watch(service: &TargetService) -> (Arc<Mutex<Vec<TargetSnapshot>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = service.subscribe(move |snap| sink.lock().unwrap().push(snap.clone()));
        (seen, sub)
    }

    #[test]
    fn test_discovery_and_validation_scenario() {
        let service = TargetService::new();
        let (seen, _sub) = watch(&service);

        let target = service.add(NewTarget::new("http://example.com")).unwrap();
        assert!(target.is_new_discovery);
        assert_eq!(target.status, TargetStatus::Discovered);
        assert_eq!(target.title, "example.com");
        assert_eq!(service.list().len(), 1);
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[1].len(), 1);
        }

        let validated = service.validate_target(&target.id).unwrap();
        assert!(!validated.is_new_discovery);
        assert_eq!(validated.status, TargetStatus::Validated);
        assert!(validated.validated_at.is_some());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(!seen[2].records()[0].is_new_discovery);
    }

    #[test]
    fn test_remove_only_target_purges_curated_content() {
        let service = TargetService::new();
        let target = service.add(NewTarget::new("https://books.example.org/list")).unwrap();
        service
            .curate(
                &target.id,
                CurationInput {
                    summary: Some("Reading list".into()),
                    excerpts: vec!["chapter one".into()],
                },
            )
            .unwrap();
        assert!(service.get_data_for_target(&target.id).is_some());

        service.remove(&target.id).unwrap();
        assert!(service.list().is_empty());
        assert!(service.get_data_for_target(&target.id).is_none());
    }

    #[test]
    fn test_add_requires_valid_url() {
        let service = TargetService::new();
        for input in [
            NewTarget::default(),
            NewTarget::new("   "),
            NewTarget::new("ftp://example.com"),
            NewTarget::new("https://"),
        ] {
            let err = service.add(input).unwrap_err();
            assert!(matches!(err, AzError::Validation(_)), "{:?}", err);
        }
        assert!(service.list().is_empty());
    }

    #[test]
    fn test_malformed_urls_are_rejected_without_publishing() {
        let service = TargetService::new();
        let kept = service.add(NewTarget::new("https://example.com:8443/feed")).unwrap();
        assert_eq!(kept.title, "example.com");
        let version = service.list().version;

        for url in ["http://exa mple.com", "http://:80/", "https://@", "http://[::1"] {
            let err = service.add(NewTarget::new(url)).unwrap_err();
            assert!(matches!(err, AzError::Validation(_)), "{}: {:?}", url, err);

            let patch = TargetPatch { url: Some(url.to_string()), ..Default::default() };
            let err = service.update(&kept.id, patch).unwrap_err();
            assert!(matches!(err, AzError::Validation(_)), "{}: {:?}", url, err);
        }

        let after = service.list();
        assert_eq!(after.version, version);
        assert_eq!(after.len(), 1);
        assert_eq!(after.records()[0].url, "https://example.com:8443/feed");
    }

    #[test]
    fn test_validate_twice_is_rejected_without_notification() {
        let service = TargetService::new();
        let target = service.add(NewTarget::new("https://example.com")).unwrap();
        service.validate_target(&target.id).unwrap();
        let (seen, _sub) = watch(&service);

        let err = service.validate_target(&target.id).unwrap_err();
        assert!(matches!(err, AzError::Validation(_)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_full_lifecycle_to_refresh() {
        let service = TargetService::new();
        let target = service.add(NewTarget::new("https://feeds.example.com/rss")).unwrap();

        assert!(service.monitor_target(&target.id).is_err());
        assert!(service.mark_refreshed(&target.id).is_err());

        service.validate_target(&target.id).unwrap();
        service.monitor_target(&target.id).unwrap();
        assert_eq!(service.refresh_candidates().len(), 1);

        let refreshed = service.mark_refreshed(&target.id).unwrap();
        assert!(refreshed.last_refreshed_at.is_some());
        assert_eq!(refreshed.status, TargetStatus::Monitored);
    }

    #[test]
    fn test_update_merges_fields_and_keeps_id() {
        let service = TargetService::new();
        let target = service
            .add(NewTarget {
                url: Some("https://example.com".into()),
                title: Some("Example".into()),
                tags: vec!["Books".into(), "books".into()],
            })
            .unwrap();
        assert_eq!(target.tags, vec!["books"]);

        let updated = service
            .update(
                &target.id,
                TargetPatch {
                    title: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.id, target.id);
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.url, "https://example.com");
    }

    #[test]
    fn test_curate_unknown_target_is_not_found() {
        let service = TargetService::new();
        let err = service
            .curate(
                &RecordId::from("nope"),
                CurationInput {
                    summary: Some("x".into()),
                    excerpts: vec![],
                },
            )
            .unwrap_err();
        assert!(matches!(err, AzError::NotFound { kind: "target", .. }));
    }

    #[test]
    fn test_patch_with_id_is_rejected_by_schema() {
        let result: std::result::Result<TargetPatch, _> =
            serde_json::from_str(r#"{"id":"other","title":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_target_serializes_camel_case() {
        let target = Target::discovered("https://example.com", "Example");
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["isNewDiscovery"], true);
        assert_eq!(json["status"], "discovered");
    }
}
