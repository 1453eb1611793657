pub mod api;
pub mod config;
pub mod db;
pub mod email;
pub mod storage;
pub mod util;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::email::Mailer;
use crate::storage::{LocalStorage, MediaStorage};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub storage: Arc<dyn MediaStorage>,
    pub mailer: Arc<Mailer>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let storage = Arc::new(LocalStorage::new(config.storage.media_dir.clone()));
        let mailer = Arc::new(Mailer::new(config.email.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            storage,
            mailer,
            rate_limiter,
        }
    }
}
