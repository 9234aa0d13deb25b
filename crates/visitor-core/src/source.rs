//! Storage and realtime collaborators the engine consumes.
//!
//! [`EventSource`] is the contract: an initial fetch of events and labels,
//! a subscription for newly inserted events, and label deletion.
//! [`LocalStore`] implements it over JSON files on disk plus an in-process
//! [`EventFeed`].

use crate::config::AppConfig;
use crate::error::{Result, VisitorError};
use crate::feed::{EventFeed, UserSubscriber};
use crate::types::{Label, VisitEvent};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::sync::RwLock;

/// External storage and change-notification capabilities.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// All stored events for `user_id` that carry a company name.
    async fn fetch_events(&self, user_id: &str) -> Result<Vec<VisitEvent>>;

    /// All labels owned by `user_id`.
    async fn fetch_labels(&self, user_id: &str) -> Result<Vec<Label>>;

    /// Newly inserted events for `user_id`. Dropping the subscriber unsubscribes.
    fn subscribe(&self, user_id: &str) -> UserSubscriber;

    /// Delete a label definition by id.
    async fn delete_label(&self, label_id: &str) -> Result<()>;
}

/// File locations for a persisted [`LocalStore`].
#[derive(Debug, Clone)]
struct StorePaths {
    events: PathBuf,
    labels: PathBuf,
}

/// JSON-file backed event store with an in-process insert feed.
pub struct LocalStore {
    events: RwLock<Vec<VisitEvent>>,
    labels: RwLock<Vec<Label>>,
    feed: EventFeed,
    paths: Option<StorePaths>,
}

impl LocalStore {
    /// An empty, memory-only store.
    pub fn in_memory(feed: EventFeed) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            labels: RwLock::new(Vec::new()),
            feed,
            paths: None,
        }
    }

    /// A memory-only store seeded with events and labels.
    pub fn with_data(feed: EventFeed, events: Vec<VisitEvent>, labels: Vec<Label>) -> Self {
        Self {
            events: RwLock::new(events),
            labels: RwLock::new(labels),
            feed,
            paths: None,
        }
    }

    /// Open the store described by `config`. Missing files start empty.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let dir = config.resolved_data_dir();
        let paths = StorePaths {
            events: dir.join(&config.data.events_file),
            labels: dir.join(&config.data.labels_file),
        };
        let events: Vec<VisitEvent> = read_json_array(&paths.events).await?;
        let labels: Vec<Label> = read_json_array(&paths.labels).await?;
        tracing::info!(
            "Opened local store at {:?}: {} events, {} labels",
            dir,
            events.len(),
            labels.len()
        );

        Ok(Self {
            events: RwLock::new(events),
            labels: RwLock::new(labels),
            feed: EventFeed::with_capacity(config.feed.capacity),
            paths: Some(paths),
        })
    }

    pub fn feed(&self) -> &EventFeed {
        &self.feed
    }

    /// Store a new event and announce it on the feed.
    pub async fn insert_event(&self, event: VisitEvent) -> Result<()> {
        let snapshot = {
            let mut events = self.events.write().await;
            events.push(event.clone());
            events.clone()
        };
        if let Some(paths) = &self.paths {
            write_json_array(&paths.events, &snapshot).await?;
        }
        let delivered = self.feed.publish(event);
        tracing::debug!("Inserted event, delivered to {} subscribers", delivered);
        Ok(())
    }

    /// Store a label definition.
    pub async fn insert_label(&self, label: Label) -> Result<()> {
        let snapshot = {
            let mut labels = self.labels.write().await;
            labels.push(label);
            labels.clone()
        };
        if let Some(paths) = &self.paths {
            write_json_array(&paths.labels, &snapshot).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventSource for LocalStore {
    async fn fetch_events(&self, user_id: &str) -> Result<Vec<VisitEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.user_id == user_id && e.company_name.is_some())
            .cloned()
            .collect())
    }

    async fn fetch_labels(&self, user_id: &str) -> Result<Vec<Label>> {
        let labels = self.labels.read().await;
        Ok(labels
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    fn subscribe(&self, user_id: &str) -> UserSubscriber {
        self.feed.subscribe_for(user_id)
    }

    async fn delete_label(&self, label_id: &str) -> Result<()> {
        let snapshot = {
            let mut labels = self.labels.write().await;
            let before = labels.len();
            labels.retain(|l| l.id != label_id);
            if labels.len() == before {
                return Err(VisitorError::LabelNotFound(label_id.to_string()));
            }
            labels.clone()
        };
        if let Some(paths) = &self.paths {
            write_json_array(&paths.labels, &snapshot).await?;
        }
        tracing::info!("Deleted label {}", label_id);
        Ok(())
    }
}

/// Read a JSON array of rows. A malformed row is logged and skipped; only
/// an unreadable file or a non-array document fails.
async fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !async_fs::try_exists(path).await? {
        return Ok(Vec::new());
    }
    let json = async_fs::read_to_string(path).await?;
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<Value> = serde_json::from_str(&json).map_err(|e| {
        VisitorError::Source(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let total = rows.len();
    let items: Vec<T> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(i, row)| match serde_json::from_value(row) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping row {} of {}: {}", i, path.display(), e);
                None
            }
        })
        .collect();
    if items.len() < total {
        tracing::warn!(
            "Loaded {} of {} rows from {}",
            items.len(),
            total,
            path.display()
        );
    }
    Ok(items)
}

async fn write_json_array<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(items)?;
    async_fs::write(path, json).await?;
    Ok(())
}
