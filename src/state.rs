use std::sync::Arc;

use crate::fetch::Fetcher;

/// Shared application state passed to all handlers.
/// Holds no per-request data: every summary is built fresh.
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<dyn Fetcher>,
}

impl AppState {
    pub fn new(fetcher: impl Fetcher + 'static) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }
}
