//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::{AuthState, IdentityResolver, JwtManager};
use crate::config::Config;
use crate::sync::Synchronizer;
use crate::ws::broadcast::Broadcaster;
use crate::ws::room::RoomRouter;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub rooms: Arc<RoomRouter>,
    pub resolver: Arc<IdentityResolver>,
    pub sync: Synchronizer,
    pub broadcaster: Broadcaster,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let rooms = Arc::new(RoomRouter::new());
        let resolver = Arc::new(IdentityResolver::new(JwtManager::new(
            &config.jwt_secret,
            &config.session_secret,
            config.jwt_leeway_secs,
        )));
        let broadcaster = Broadcaster::Live(Arc::clone(&rooms));
        let sync = Synchronizer::new(pool.clone(), broadcaster.clone());

        Self {
            pool,
            config: Arc::new(config),
            rooms,
            resolver,
            sync,
            broadcaster,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            resolver: Arc::clone(&self.resolver),
        }
    }
}
