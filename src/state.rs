use crate::client::StoreClient;
use crate::config::AppConfig;
use crate::session::SessionStore;
use crate::storage::RecordStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub client: StoreClient,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, sessions: SessionStore, config: AppConfig) -> Self {
        Self {
            client: StoreClient::new(store),
            sessions: Arc::new(sessions),
            config: Arc::new(config),
        }
    }
}
