use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::Config;
use crate::db::Store;
use crate::rooms::RoomManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub store: Store,
    pub rooms: Arc<RoomManager>,
}

impl AppState {
    pub fn new(config: Config, auth: AuthService, store: Store, rooms: RoomManager) -> Self {
        Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            store,
            rooms: Arc::new(rooms),
        }
    }
}
