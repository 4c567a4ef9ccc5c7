//! Room lifecycle: create, join, leave and delete against the store and LiveKit.

use std::sync::Arc;

use chrono::Utc;

use crate::config::Config;
use crate::db::{MemberJoin, Store};
use crate::error::{AppError, Result};
use crate::livekit::{FailMode, ParticipantSummary, ProviderClient, ProviderRoom, TokenIssuer};
use crate::models::{JoinResponse, Room, RoomWithParticipants, User};
use crate::security::generate_room_id;

const MAX_ROOM_NAME_LEN: usize = 100;

/// Room lifecycle manager
pub struct RoomManager {
    store: Store,
    provider: Arc<dyn ProviderClient>,
    issuer: TokenIssuer,
    livekit_url: String,
    read_mode: FailMode,
}

impl RoomManager {
    pub fn new(
        config: &Config,
        store: Store,
        provider: Arc<dyn ProviderClient>,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            store,
            provider,
            issuer,
            livekit_url: config.livekit_url.clone(),
            read_mode: FailMode::from_flag(config.livekit_fail_open),
        }
    }

    /// Register a room with LiveKit, then persist it. Nothing is stored when
    /// LiveKit refuses.
    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        max_participants: i64,
        creator: &User,
    ) -> Result<Room> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Room name is required".to_string()));
        }
        if name.chars().count() > MAX_ROOM_NAME_LEN {
            return Err(AppError::BadRequest(
                "Room name must be at most 100 characters".to_string(),
            ));
        }
        if max_participants < 1 {
            return Err(AppError::BadRequest(
                "max_participants must be at least 1".to_string(),
            ));
        }

        let room_id = generate_room_id();

        FailMode::Closed
            .apply("create_room", self.provider.create_room(&room_id).await)
            .map_err(|e| AppError::Upstream(format!("Failed to create room: {}", e)))?;

        let description = description.map(str::trim).filter(|d| !d.is_empty());
        let room = self
            .store
            .create_room(name, description, max_participants, creator.id, &room_id)
            .await?;

        tracing::info!(
            id = room.id,
            room_id = %room.room_id,
            creator = %creator.username,
            "Room created"
        );
        Ok(room)
    }

    /// Connect `user` (once) and hand out a fresh LiveKit token.
    pub async fn join(&self, id: i64, user: &User) -> Result<JoinResponse> {
        let room = self.require_room(id).await?;
        if !room.is_active {
            return Err(AppError::InvalidState("Room is not active".to_string()));
        }

        let (membership, inserted) = match self
            .store
            .connect_member(room.id, user.id, room.max_participants)
            .await?
        {
            MemberJoin::Joined(membership) => (membership, true),
            MemberJoin::AlreadyConnected(membership) => (membership, false),
            MemberJoin::Full => return Err(AppError::RoomFull),
        };

        let token = self
            .issuer
            .issue(&room.room_id, &user.username, &user.username)?;

        tracing::info!(
            room_id = %room.room_id,
            user = %user.username,
            membership_id = membership.id,
            new_membership = inserted,
            "User joined room"
        );

        Ok(JoinResponse {
            room_url: format!("{}?token={}", self.livekit_url, token),
            token,
        })
    }

    pub async fn leave(&self, id: i64, user: &User) -> Result<()> {
        let membership = self
            .store
            .find_active_membership(id, user.id)
            .await?
            .ok_or_else(|| AppError::InvalidState("You are not in this room".to_string()))?;

        self.store
            .set_membership_connected(membership.id, false, Some(Utc::now()))
            .await?;

        tracing::info!(id, user = %user.username, "User left room");
        Ok(())
    }

    /// Creator-only soft delete. LiveKit failures are logged, never returned.
    pub async fn delete(&self, id: i64, requester: &User) -> Result<()> {
        let room = self.require_room(id).await?;
        if room.creator_id != requester.id {
            return Err(AppError::Forbidden(
                "Only the room creator can delete the room".to_string(),
            ));
        }

        FailMode::Open.apply("delete_room", self.provider.delete_room(&room.room_id).await)?;

        self.store.deactivate_room(room.id).await?;

        tracing::info!(id, room_id = %room.room_id, "Room deleted");
        Ok(())
    }

    /// Participants LiveKit currently sees in the room
    pub async fn list_participants(&self, id: i64) -> Result<Vec<ParticipantSummary>> {
        let room = self.require_room(id).await?;
        self.read_mode.apply(
            "list_participants",
            self.provider.list_participants(&room.room_id).await,
        )
    }

    /// Rooms LiveKit currently hosts
    pub async fn provider_rooms(&self, mode: FailMode) -> Result<Vec<ProviderRoom>> {
        mode.apply("list_rooms", self.provider.list_rooms().await)
    }

    pub async fn get(&self, id: i64) -> Result<RoomWithParticipants> {
        let room = self.require_room(id).await?;
        let participants_count = self.store.count_connected(room.id).await?;
        self.with_creator(room, participants_count).await
    }

    /// Active rooms only
    pub async fn list(&self, skip: i64, limit: i64) -> Result<Vec<RoomWithParticipants>> {
        let rows = self.store.list_active_rooms(skip, limit).await?;

        let mut rooms = Vec::with_capacity(rows.len());
        for (room, participants_count) in rows {
            rooms.push(self.with_creator(room, participants_count).await?);
        }
        Ok(rooms)
    }

    async fn require_room(&self, id: i64) -> Result<Room> {
        self.store
            .get_room(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Room not found".to_string()))
    }

    async fn with_creator(&self, room: Room, participants_count: i64) -> Result<RoomWithParticipants> {
        let creator = self.store.get_user(room.creator_id).await?.ok_or_else(|| {
            AppError::InternalError(format!("Creator of room {} is missing", room.id))
        })?;

        Ok(RoomWithParticipants {
            status: room.status(),
            room,
            participants_count,
            creator,
        })
    }
}
