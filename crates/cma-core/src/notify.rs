use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Collectors with a configuration change not yet picked up by their
/// container healthcheck.
///
/// Written by the installer and the drift tracker, read and cleared by the
/// `/config/{collector}` handler. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct PendingNotifications {
    inner: Arc<Mutex<HashMap<String, bool>>>,
}

impl PendingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, collector: &str) {
        self.lock().insert(collector.to_string(), true);
    }

    /// Remove and return the pending flag for `collector`.
    pub fn take(&self, collector: &str) -> bool {
        self.lock().remove(collector).unwrap_or(false)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        // The map stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
