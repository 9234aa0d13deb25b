//! Keeps a [`Dashboard`] current with the source's realtime feed.
//!
//! The subscription is opened before the initial fetch so nothing inserted
//! in between is missed; anything delivered twice is dropped by the working
//! set's id check.

use crate::dashboard::Dashboard;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use visitor_core::config::AppConfig;
use visitor_core::error::Result;
use visitor_core::source::EventSource;
use visitor_core::types::VisitEvent;
use visitor_core::working_set::{Admission, WorkingSet};

pub type SharedDashboard = Arc<RwLock<Dashboard>>;

/// Owns the background merge task. Dropping it unsubscribes.
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
    merged: broadcast::Sender<VisitEvent>,
}

impl SubscriptionHandle {
    /// Events that were actually merged into the working set.
    pub fn merged(&self) -> broadcast::Receiver<VisitEvent> {
        self.merged.subscribe()
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop receiving events. Idempotent.
    pub fn unsubscribe(&self) {
        self.task.abort();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Load `user_id`'s events and labels and start merging live inserts.
pub async fn connect(
    source: Arc<dyn EventSource>,
    user_id: &str,
    config: &AppConfig,
) -> Result<(SharedDashboard, SubscriptionHandle)> {
    let mut subscriber = source.subscribe(user_id);

    let events = source.fetch_events(user_id).await?;
    let labels = source.fetch_labels(user_id).await?;
    let working_set = WorkingSet::load(user_id, events);
    tracing::info!(
        "Loaded {} events and {} labels for user {}",
        working_set.len(),
        labels.len(),
        user_id
    );

    let dashboard = Arc::new(RwLock::new(Dashboard::from_config(
        config,
        working_set,
        labels,
    )));
    let (merged, _) = broadcast::channel(config.feed.capacity.max(1));

    let task = {
        let dashboard = Arc::clone(&dashboard);
        let merged = merged.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            loop {
                match subscriber.recv().await {
                    Ok(event) => merge(&dashboard, &merged, event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Live feed lagged, {} events dropped; resyncing", n);
                        match source.fetch_events(&user_id).await {
                            Ok(events) => {
                                for event in events {
                                    merge(&dashboard, &merged, event).await;
                                }
                            }
                            Err(e) => tracing::warn!("Resync after lag failed: {}", e),
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Live feed closed");
                        break;
                    }
                }
            }
        })
    };

    Ok((dashboard, SubscriptionHandle { task, merged }))
}

async fn merge(
    dashboard: &SharedDashboard,
    merged: &broadcast::Sender<VisitEvent>,
    event: VisitEvent,
) {
    let admission = dashboard.write().await.ingest(event.clone());
    match admission {
        Admission::Merged => {
            let _ = merged.send(event);
        }
        other => tracing::debug!("Skipped event {}: {:?}", event.id, other),
    }
}

/// Re-read labels after label management changed them.
pub async fn refresh_labels(
    source: &dyn EventSource,
    user_id: &str,
    dashboard: &SharedDashboard,
) -> Result<usize> {
    let labels = source.fetch_labels(user_id).await?;
    let count = labels.len();
    dashboard.write().await.set_labels(labels);
    Ok(count)
}
