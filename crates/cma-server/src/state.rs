use cma_core::client::ApiClient;
use cma_core::notify::PendingNotifications;
use std::time::Duration;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: ApiClient,
    pub notifications: PendingNotifications,
    /// Upper bound on a single handler's upstream work.
    pub handler_timeout: Duration,
}

impl AppState {
    pub fn new(client: ApiClient, notifications: PendingNotifications) -> Self {
        Self {
            client,
            notifications,
            handler_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_shares_notifications() {
        let client = ApiClient::new("http://localhost:1", Duration::from_secs(1), "t").unwrap();
        let pending = PendingNotifications::new();
        let state = AppState::new(client, pending.clone());
        pending.mark("telegraf");
        assert!(state.notifications.take("telegraf"));
        assert_eq!(state.handler_timeout, Duration::from_secs(30));
    }
}
