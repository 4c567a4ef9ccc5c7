//! Fixtures shared by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jsonwebtoken::Algorithm;

use crate::config::Config;
use crate::db::{self, Store};
use crate::error::{AppError, Result};
use crate::livekit::{ParticipantSummary, ProviderClient, ProviderRoom};

pub fn config() -> Config {
    Config {
        server_host: "localhost".to_string(),
        server_port: 8000,
        debug: false,
        log_json: false,
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test-secret-key".to_string(),
        jwt_algorithm: Algorithm::HS256,
        access_token_expire_minutes: 30,
        livekit_url: "ws://localhost:7880".to_string(),
        livekit_api_key: "devkey".to_string(),
        livekit_api_secret: "devsecret-devsecret-devsecret-00".to_string(),
        livekit_token_ttl_seconds: 1800,
        livekit_timeout_seconds: 5,
        livekit_health_timeout_ms: 100,
        livekit_fail_open: true,
        livekit_register_rooms: true,
    }
}

/// Migrated in-memory store
pub async fn store() -> Store {
    let pool = db::create_pool("sqlite::memory:")
        .await
        .expect("Should open in-memory database");
    db::migrate(&pool).await.expect("Should migrate");
    Store::new(pool)
}

/// Migrated store on a temporary file with a multi-connection pool.
/// The database lives as long as the returned directory guard.
pub async fn file_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Should create temp dir");
    let url = format!("sqlite://{}", dir.path().join("rooms.db").display());
    let pool = db::create_pool(&url)
        .await
        .expect("Should open file database");
    db::migrate(&pool).await.expect("Should migrate");
    (Store::new(pool), dir)
}

#[derive(Default)]
struct FakeState {
    reachable: bool,
    created: Vec<String>,
    deleted: Vec<String>,
    participants: HashMap<String, Vec<ParticipantSummary>>,
}

/// In-process stand-in for LiveKit that can be switched off
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
}

impl FakeProvider {
    pub fn healthy() -> Self {
        let provider = Self::default();
        provider.set_reachable(true);
        provider
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    pub fn add_participant(&self, room: &str, identity: &str) {
        self.state
            .lock()
            .unwrap()
            .participants
            .entry(room.to_string())
            .or_default()
            .push(ParticipantSummary {
                identity: identity.to_string(),
                name: identity.to_string(),
                state: "ACTIVE".to_string(),
                ..Default::default()
            });
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn check(&self) -> Result<()> {
        if self.state.lock().unwrap().reachable {
            Ok(())
        } else {
            Err(AppError::Upstream("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn create_room(&self, name: &str) -> Result<ProviderRoom> {
        self.check()?;
        self.state.lock().unwrap().created.push(name.to_string());
        Ok(ProviderRoom {
            name: name.to_string(),
            sid: format!("RM_{}", name),
            ..Default::default()
        })
    }

    async fn delete_room(&self, name: &str) -> Result<()> {
        self.check()?;
        self.state.lock().unwrap().deleted.push(name.to_string());
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<ProviderRoom>> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .created
            .iter()
            .filter(|name| !state.deleted.contains(name))
            .map(|name| ProviderRoom {
                name: name.clone(),
                sid: format!("RM_{}", name),
                ..Default::default()
            })
            .collect())
    }

    async fn list_participants(&self, room: &str) -> Result<Vec<ParticipantSummary>> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .participants
            .get(room)
            .cloned()
            .unwrap_or_default())
    }
}
