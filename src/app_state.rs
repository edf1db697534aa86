use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

use crate::{
    config::AppConfig, conversation::Conversation, navigator::NavigatorService,
    preferences::PreferencesStore, preview::PreviewPane, qa_client::QaClient,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub http: reqwest::Client,
    pub navigator: Arc<NavigatorService>,
    pub preferences: Arc<PreferencesStore>,
    pub qa: Arc<QaClient>,
    pub conversation: Arc<Mutex<Conversation>>,
    pub preview: Arc<PreviewPane>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
}

impl AppState {
    pub fn set_status(&self, is_busy: bool, message: impl Into<String>) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.is_busy = is_busy;
        status.message = message.into();
    }
}
