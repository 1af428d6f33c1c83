//! Shared, read-only state for request handlers.

use std::sync::Arc;
use std::time::Instant;

use downlog_core::CategoryTable;

use crate::config::ServerConfig;

/// State shared by all handlers.
///
/// Built once at startup; nothing in it changes while the server runs.
#[derive(Debug)]
pub struct AppState {
    config: Arc<ServerConfig>,
    start_time: Instant,
}

impl AppState {
    /// Create state from the server configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Category table.
    pub fn categories(&self) -> &CategoryTable {
        &self.config.categories
    }

    /// Maximum download size in bytes, if limited.
    pub fn download_limit(&self) -> Option<u64> {
        self.config.download_limit
    }

    /// Seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_exposes_config() {
        let state = AppState::new(ServerConfig::default().with_download_limit(Some(42)));

        assert_eq!(state.download_limit(), Some(42));
        assert_eq!(state.categories().len(), 4);
        assert_eq!(state.config().api_base(), "/api");
        assert!(state.uptime_secs() < 5);
    }
}
