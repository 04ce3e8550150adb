use std::sync::Arc;

use sqlx::PgPool;

use crate::{config::Config, media::MediaStore, session::SessionKeys};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub media: MediaStore,
    pub sessions: Arc<SessionKeys>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let media = MediaStore::new(config.media_root.clone());
        let sessions = SessionKeys::new(&config.session_secret, config.session_ttl_hours);

        Self {
            pool,
            config: Arc::new(config),
            media,
            sessions: Arc::new(sessions),
        }
    }
}
