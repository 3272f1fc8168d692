use std::sync::Arc;

use crate::config::Config;
use crate::crypto::clock::{Clock, SystemClock};
use crate::crypto::csrf::CsrfService;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// The CSRF token service.
    pub csrf: CsrfService,
}

impl AppState {
    /// Creates a new `AppState` that reads time from the system clock.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a new `AppState` with an explicit time source.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let csrf = CsrfService::new(config.csrf_secret.clone(), clock);
        tracing::info!(
            "✅ CSRF service initialized (cookie binding: {})",
            config.csrf_cookie_binding
        );

        AppState {
            config: Arc::new(config),
            csrf,
        }
    }
}
