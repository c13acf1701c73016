use std::sync::Arc;

use crate::{Config, model::ModelManager, web::middlewares::RateLimiter};

#[derive(Debug, Clone)]
pub struct AppState {
    mm: ModelManager,
    config: &'static Config,
    rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(mm: ModelManager, config: &'static Config) -> Self {
        let rate_limiter = Arc::new(RateLimiter::from_config(config.rate_limit()));
        Self {
            mm,
            config,
            rate_limiter,
        }
    }

    pub fn pool(&self) -> &ModelManager {
        &self.mm
    }

    pub fn config(&self) -> &'static Config {
        self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}
