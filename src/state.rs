//! Application state management

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::form::{AutoSaveScheduler, FormSession};
use crate::inspection::{InspectionError, InspectionService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    service: InspectionService,
    autosave: Option<AutoSaveScheduler>,
    /// Open editing sessions keyed by record id
    sessions: Mutex<HashMap<String, FormSession>>,
}

impl AppState {
    /// Create a new application state. Auto-save follows `config.autosave`.
    pub fn new(config: Config, service: InspectionService) -> Self {
        let autosave = config
            .autosave
            .enabled
            .then(|| AutoSaveScheduler::new(config.autosave.window()));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                service,
                autosave,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the inspection service
    pub fn service(&self) -> &InspectionService {
        &self.inner.service
    }

    /// Get the auto-save scheduler, if enabled
    pub fn autosave(&self) -> Option<&AutoSaveScheduler> {
        self.inner.autosave.as_ref()
    }

    /// Run `f` against the record's session, opening one if needed
    pub async fn with_session<T, F>(&self, record_id: &str, f: F) -> Result<T, InspectionError>
    where
        F: FnOnce(&mut FormSession) -> Result<T, InspectionError>,
    {
        let mut sessions = self.inner.sessions.lock().await;

        if !sessions.contains_key(record_id) {
            let session = self
                .inner
                .service
                .open_session(record_id, self.inner.autosave.clone())
                .await?;
            tracing::debug!(record_id = %record_id, "Opened form session");
            sessions.insert(record_id.to_string(), session);
        }

        match sessions.get_mut(record_id) {
            Some(session) => f(session),
            None => Err(InspectionError::NotFound(record_id.to_string())),
        }
    }

    /// Save a held session immediately. Returns false when none is open.
    pub async fn save_session(&self, record_id: &str) -> Result<bool, InspectionError> {
        let mut sessions = self.inner.sessions.lock().await;
        match sessions.get_mut(record_id) {
            Some(session) => {
                session.handle_save().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close a held session, dropping its pending auto-save
    pub async fn close_session(&self, record_id: &str) -> bool {
        let mut sessions = self.inner.sessions.lock().await;
        match sessions.remove(record_id) {
            Some(mut session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Flush unsaved sessions, then stop pending auto-saves
    pub async fn shutdown(&self) {
        let mut sessions = self.inner.sessions.lock().await;
        for (record_id, mut session) in sessions.drain() {
            if session.is_dirty() {
                if let Err(e) = session.handle_save().await {
                    tracing::warn!(record_id = %record_id, error = %e, "Failed to flush session");
                }
            }
            session.close();
        }
        if let Some(scheduler) = &self.inner.autosave {
            let cancelled = scheduler.cancel_all();
            tracing::info!(cancelled, "Cancelled pending auto-saves");
        }
    }
}
