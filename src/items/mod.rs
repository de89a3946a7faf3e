// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Curated items for the book-curation dashboard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::hub::Subscription;
use crate::store::{Record, RecordId, RecordStore, Snapshot};
use crate::{AzError, Result};

/// Topic the item service publishes on
pub const TOPIC: &str = "curated-items";

const DEFAULT_CATEGORY: &str = "Uncategorized";

/// A curated book or article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CuratedItem {
    pub id: RecordId,
    pub title: String,
    pub author: String,
    pub category: String,
    pub tags: Vec<String>,
    pub rating: Option<u8>,
    pub notes: Option<String>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewCuratedItem {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub rating: Option<u8>,
    pub notes: Option<String>,
}

impl NewCuratedItem {
    pub fn new(title: &str, author: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            author: Some(author.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CuratedItemPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub rating: Option<u8>,
    pub notes: Option<String>,
}

pub type ItemSnapshot = Snapshot<CuratedItem, ()>;

fn required(field: &str, value: Option<String>) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AzError::validation(format!("{} is required", field)))
}

fn check_rating(rating: Option<u8>) -> Result<Option<u8>> {
    match rating {
        Some(r) if !(1..=5).contains(&r) => {
            Err(AzError::validation(format!("rating must be between 1 and 5, got {}", r)))
        }
        other => Ok(other),
    }
}

impl Record for CuratedItem {
    type Input = NewCuratedItem;
    type Patch = CuratedItemPatch;
    const KIND: &'static str = "curated item";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn create(id: RecordId, input: NewCuratedItem) -> Result<Self> {
        let title = required("title", input.title)?;
        let author = required("author", input.author)?;
        let rating = check_rating(input.rating)?;
        let category = input
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Ok(Self {
            id,
            title,
            author,
            category,
            tags: input.tags,
            rating,
            notes: input.notes,
            added_at: Utc::now(),
        })
    }

    fn apply(&mut self, patch: CuratedItemPatch) -> Result<()> {
        // Validate everything before assigning anything
        let title = patch.title.map(|t| required("title", Some(t))).transpose()?;
        let author = patch.author.map(|a| required("author", Some(a))).transpose()?;
        let category = patch.category.map(|c| required("category", Some(c))).transpose()?;
        let rating = check_rating(patch.rating)?;

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(author) = author {
            self.author = author;
        }
        if let Some(category) = category {
            self.category = category;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if rating.is_some() {
            self.rating = rating;
        }
        if let Some(notes) = patch.notes {
            self.notes = Some(notes);
        }
        Ok(())
    }
}

/// Data service for curated items
#[derive(Clone, Debug)]
pub struct CuratedItemService {
    store: RecordStore<CuratedItem>,
}

impl Default for CuratedItemService {
    fn default() -> Self {
        Self::new()
    }
}

impl CuratedItemService {
    pub fn new() -> Self {
        Self {
            store: RecordStore::new(TOPIC),
        }
    }

    pub fn store(&self) -> &RecordStore<CuratedItem> {
        &self.store
    }

    pub fn list(&self) -> ItemSnapshot {
        self.store.list()
    }

    pub fn get(&self, id: &RecordId) -> Result<CuratedItem> {
        self.store.get(id)
    }

    pub fn add(&self, input: NewCuratedItem) -> Result<CuratedItem> {
        self.store.add(input)
    }

    pub fn update(&self, id: &RecordId, patch: CuratedItemPatch) -> Result<CuratedItem> {
        self.store.update(id, patch)
    }

    pub fn remove(&self, id: &RecordId) -> Result<CuratedItem> {
        self.store.remove(id)
    }

    /// Case-insensitive match on title, author or tag
    pub fn search(&self, query: &str) -> Vec<CuratedItem> {
        let needle = query.trim().to_lowercase();
        self.list()
            .iter()
            .filter(|item| {
                needle.is_empty()
                    || item.title.to_lowercase().contains(&needle)
                    || item.author.to_lowercase().contains(&needle)
                    || item.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub fn by_category(&self, category: &str) -> Vec<CuratedItem> {
        self.list()
            .iter()
            .filter(|item| item.category.eq_ignore_ascii_case(category))
            .cloned()
            .collect()
    }

    /// Item count per category, sorted by name
    pub fn category_stats(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for item in self.list().iter() {
            *counts.entry(item.category.clone()).or_default() += 1;
        }
        counts.into_iter().collect()
    }

    pub fn seed(&self, items: Vec<CuratedItem>) -> Result<()> {
        self.store.seed(items)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ItemSnapshot) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }
}
