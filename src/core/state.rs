use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::attempts::AttemptService;
use crate::store::AttemptStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn AttemptStore>,
    attempts: AttemptService,
}

impl AppState {
    pub(crate) fn new(settings: Settings, store: Arc<dyn AttemptStore>) -> Self {
        let attempts = AttemptService::new(store.clone(), settings.exam().submit_grace_seconds);
        Self { inner: Arc::new(InnerState { settings, store, attempts }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn AttemptStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn attempts(&self) -> &AttemptService {
        &self.inner.attempts
    }
}
