use std::sync::Arc;
use crate::assistant::Assistant;
use crate::rate_limit::RateLimiter;
use crate::store::Store;
// app's shared state

pub struct AppState {
    pub store: Store,
    pub rate_limiter: Arc<RateLimiter>, // shared with the sweeper task
    pub assistant: Arc<dyn Assistant>,
}
