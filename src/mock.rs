// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Canned data for the mock backend endpoints and startup seeding

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::items::CuratedItem;
use crate::store::RecordId;
use crate::targets::{Target, TargetStatus};
use crate::workflows::Workflow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub description: String,
    pub traits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
}

pub fn health() -> HealthResponse {
    HealthResponse {
        status: "healthy".to_string(),
        message: "AZ Interface API is running".to_string(),
    }
}

pub fn agents() -> Vec<Agent> {
    [
        ("agent-curator", "Curator", "Collects and summarizes sources", "online"),
        ("agent-librarian", "Librarian", "Maintains the reading list", "online"),
        ("agent-courier", "Courier", "Triggers workflow runs", "idle"),
    ]
    .into_iter()
    .map(|(id, name, role, status)| Agent {
        id: id.to_string(),
        name: name.to_string(),
        role: role.to_string(),
        status: status.to_string(),
    })
    .collect()
}

pub fn personas() -> Vec<Persona> {
    vec![
        Persona {
            id: "persona-archivist".to_string(),
            name: "Archivist".to_string(),
            description: "Careful, citation-first reviewer".to_string(),
            traits: vec!["precise".to_string(), "patient".to_string()],
        },
        Persona {
            id: "persona-scout".to_string(),
            name: "Scout".to_string(),
            description: "Finds new sources quickly".to_string(),
            traits: vec!["curious".to_string(), "fast".to_string()],
        },
    ]
}

pub fn tasks() -> Vec<Task> {
    vec![
        Task {
            id: "1".to_string(),
            title: "System Check".to_string(),
            description: "Run diagnostics".to_string(),
            status: "pending".to_string(),
        },
        Task {
            id: "2".to_string(),
            title: "Backup".to_string(),
            description: "Create system backup".to_string(),
            status: "completed".to_string(),
        },
    ]
}

pub fn task(id: &str) -> Option<Task> {
    tasks().into_iter().find(|t| t.id == id)
}

pub fn workflows() -> Vec<Workflow> {
    [
        ("ingest-sources", "Ingest sources", "Fetch and normalize newly discovered targets", "manual", true),
        ("curate-digest", "Curate digest", "Summarize validated targets into a digest", "schedule", true),
        ("refresh-monitored", "Refresh monitored", "Re-fetch every monitored target", "schedule", true),
        ("legacy-export", "Legacy export", "Export to the retired archive format", "manual", false),
    ]
    .into_iter()
    .map(|(id, name, description, trigger, active)| Workflow {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        trigger: trigger.to_string(),
        active,
    })
    .collect()
}

pub fn seed_targets() -> Vec<Target> {
    let mut docs = Target::discovered("https://doc.rust-lang.org/book/", "The Rust Book");
    docs.status = TargetStatus::Monitored;
    docs.is_new_discovery = false;
    docs.validated_at = Some(Utc::now() - Duration::days(3));
    docs.tags = vec!["rust".to_string(), "reference".to_string()];

    let mut gutenberg = Target::discovered("https://www.gutenberg.org/", "Project Gutenberg");
    gutenberg.status = TargetStatus::Validated;
    gutenberg.is_new_discovery = false;
    gutenberg.validated_at = Some(Utc::now() - Duration::days(1));
    gutenberg.tags = vec!["books".to_string()];

    let arxiv = Target::discovered("https://arxiv.org/list/cs.DC/recent", "arXiv cs.DC");

    vec![docs, gutenberg, arxiv]
}

pub fn seed_items() -> Vec<CuratedItem> {
    [
        ("Dune", "Frank Herbert", "Fiction", Some(5)),
        ("Thinking in Systems", "Donella Meadows", "Nonfiction", Some(4)),
        ("The Left Hand of Darkness", "Ursula K. Le Guin", "Fiction", None),
    ]
    .into_iter()
    .map(|(title, author, category, rating)| CuratedItem {
        id: RecordId::generate(),
        title: title.to_string(),
        author: author.to_string(),
        category: category.to_string(),
        tags: Vec::new(),
        rating,
        notes: None,
        added_at: Utc::now(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_lookup() {
        assert_eq!(task("1").map(|t| t.title), Some("System Check".to_string()));
        assert!(task("99").is_none());
    }

    #[test]
    fn test_seed_targets_cover_every_status() {
        let targets = seed_targets();
        for status in [TargetStatus::Discovered, TargetStatus::Validated, TargetStatus::Monitored] {
            assert!(targets.iter().any(|t| t.status == status));
        }
        assert!(targets.iter().all(|t| t.is_new_discovery == (t.status == TargetStatus::Discovered)));
    }

    #[test]
    fn test_workflow_ids_are_unique() {
        let mut ids: Vec<_> = workflows().into_iter().map(|w| w.id).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
