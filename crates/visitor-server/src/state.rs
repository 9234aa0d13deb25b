use std::sync::Arc;
use visitor_analytics::live::{self, SharedDashboard, SubscriptionHandle};
use visitor_core::config::AppConfig;
use visitor_core::source::LocalStore;

/// Shared application state for the server.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<LocalStore>,
    pub dashboard: SharedDashboard,
    pub subscription: Arc<SubscriptionHandle>,
}

impl AppState {
    /// Open the configured store and connect a live dashboard to it.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store = Arc::new(LocalStore::open(&config).await?);
        Self::with_store(config, store).await
    }

    pub async fn with_store(config: AppConfig, store: Arc<LocalStore>) -> anyhow::Result<Self> {
        let (dashboard, subscription) =
            live::connect(store.clone(), &config.user.id, &config).await?;
        Ok(Self {
            config,
            store,
            dashboard,
            subscription: Arc::new(subscription),
        })
    }
}
