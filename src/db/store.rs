use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::error::{AppError, Result};
use crate::models::{Membership, Room, User};

/// Room row joined with its connected-member count
#[derive(Debug, FromRow)]
struct RoomCountRow {
    #[sqlx(flatten)]
    room: Room,
    participants_count: i64,
}

/// Result of [`Store::connect_member`]
#[derive(Debug)]
pub enum MemberJoin {
    Joined(Membership),
    AlreadyConnected(Membership),
    Full,
}

/// Store for users, rooms and memberships
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== User Operations ====================

    /// Insert a user. Username and email must both be unused.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> Result<User> {
        let username_taken: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        if username_taken != 0 {
            return Err(AppError::Conflict("Username already registered".to_string()));
        }

        let email_taken: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        if email_taken != 0 {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, hashed_password, full_name, is_active, created_at)
             VALUES (?, ?, ?, ?, 1, ?)
             RETURNING *",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(full_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration.
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                if db.message().contains("users.email") {
                    AppError::Conflict("Email already registered".to_string())
                } else {
                    AppError::Conflict("Username already registered".to_string())
                }
            }
            other => other.into(),
        })?;

        tracing::info!(user_id = user.id, username = %user.username, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn list_active_users(&self, skip: i64, limit: i64) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE is_active = 1 ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    // ==================== Room Operations ====================

    pub async fn create_room(
        &self,
        name: &str,
        description: Option<&str>,
        max_participants: i64,
        creator_id: i64,
        room_id: &str,
    ) -> Result<Room> {
        let room = sqlx::query_as::<_, Room>(
            "INSERT INTO rooms (name, room_id, description, creator_id, is_active, max_participants, created_at)
             VALUES (?, ?, ?, ?, 1, ?, ?)
             RETURNING *",
        )
        .bind(name)
        .bind(room_id)
        .bind(description)
        .bind(creator_id)
        .bind(max_participants)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Room id {} already exists", room_id))
            }
            other => other.into(),
        })?;

        tracing::info!(id = room.id, room_id = %room.room_id, "Room stored");
        Ok(room)
    }

    pub async fn get_room(&self, id: i64) -> Result<Option<Room>> {
        let room = sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(room)
    }

    /// Active rooms with their connected-member counts, oldest first
    pub async fn list_active_rooms(&self, skip: i64, limit: i64) -> Result<Vec<(Room, i64)>> {
        let rows = sqlx::query_as::<_, RoomCountRow>(
            "SELECT r.*, COUNT(p.id) AS participants_count
             FROM rooms r
             LEFT JOIN room_participants p ON p.room_id = r.id AND p.is_connected = 1
             WHERE r.is_active = 1
             GROUP BY r.id
             ORDER BY r.id
             LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.room, row.participants_count))
            .collect())
    }

    /// Soft delete: the row and its membership history are kept
    pub async fn deactivate_room(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE rooms SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Room not found".to_string()));
        }

        tracing::info!(id, "Room deactivated");
        Ok(())
    }

    // ==================== Membership Operations ====================

    pub async fn count_connected(&self, room_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM room_participants WHERE room_id = ? AND is_connected = 1",
        )
        .bind(room_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn find_active_membership(
        &self,
        room_id: i64,
        user_id: i64,
    ) -> Result<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            "SELECT * FROM room_participants
             WHERE room_id = ? AND user_id = ? AND is_connected = 1",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(membership)
    }

    /// Connect `user_id` to `room_id` if it has room for one more member.
    ///
    /// Runs under `BEGIN IMMEDIATE`, so the capacity check and the insert
    /// see the same committed state as every other writer. A caller who is
    /// already connected gets their existing membership back.
    pub async fn connect_member(
        &self,
        room_id: i64,
        user_id: i64,
        capacity: i64,
    ) -> Result<MemberJoin> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let outcome = connect_member_locked(&mut conn, room_id, user_id, capacity).await;
        let finish = if outcome.is_ok() { "COMMIT" } else { "ROLLBACK" };
        if let Err(e) = sqlx::query(finish).execute(&mut *conn).await {
            // Never hand a connection with an open transaction back to the pool.
            drop(conn.detach());
            return Err(outcome.err().unwrap_or_else(|| e.into()));
        }

        let outcome = outcome?;
        if let MemberJoin::Joined(membership) = &outcome {
            tracing::debug!(room_id, user_id, membership_id = membership.id, "Member connected");
        }
        Ok(outcome)
    }

    /// Flip a membership's connection flag. `left_at` must be given exactly
    /// when disconnecting.
    pub async fn set_membership_connected(
        &self,
        membership_id: i64,
        connected: bool,
        left_at: Option<DateTime<Utc>>,
    ) -> Result<Membership> {
        if connected == left_at.is_some() {
            return Err(AppError::InvalidState(
                "left_at must be set exactly when a membership is disconnected".to_string(),
            ));
        }

        let membership = sqlx::query_as::<_, Membership>(
            "UPDATE room_participants SET is_connected = ?, left_at = ? WHERE id = ? RETURNING *",
        )
        .bind(connected)
        .bind(left_at)
        .bind(membership_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::InvalidState("User is already connected to this room".to_string())
            }
            other => other.into(),
        })?
        .ok_or_else(|| AppError::NotFound("Membership not found".to_string()))?;

        tracing::debug!(membership_id, connected, "Membership updated");
        Ok(membership)
    }

    /// Membership history for a (room, user) pair, oldest first
    pub async fn memberships_for(&self, room_id: i64, user_id: i64) -> Result<Vec<Membership>> {
        let rows = sqlx::query_as::<_, Membership>(
            "SELECT * FROM room_participants WHERE room_id = ? AND user_id = ? ORDER BY id",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ==================== Health Check ====================

    pub async fn ping(&self) -> Result<bool> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(one == 1)
    }
}

async fn connect_member_locked(
    conn: &mut SqliteConnection,
    room_id: i64,
    user_id: i64,
    capacity: i64,
) -> Result<MemberJoin> {
    let existing = sqlx::query_as::<_, Membership>(
        "SELECT * FROM room_participants
         WHERE room_id = ? AND user_id = ? AND is_connected = 1",
    )
    .bind(room_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(membership) = existing {
        return Ok(MemberJoin::AlreadyConnected(membership));
    }

    let connected: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM room_participants WHERE room_id = ? AND is_connected = 1",
    )
    .bind(room_id)
    .fetch_one(&mut *conn)
    .await?;
    if connected >= capacity {
        return Ok(MemberJoin::Full);
    }

    let membership = sqlx::query_as::<_, Membership>(
        "INSERT INTO room_participants (room_id, user_id, joined_at, is_connected)
         VALUES (?, ?, ?, 1)
         RETURNING *",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;
    Ok(MemberJoin::Joined(membership))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use pretty_assertions::assert_eq;

    fn joined(outcome: MemberJoin) -> Membership {
        match outcome {
            MemberJoin::Joined(membership) => membership,
            other => panic!("expected a new membership, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_and_email() {
        let store = test_support::store().await;
        store
            .create_user("alice", "a@x.com", "hash", None)
            .await
            .unwrap();

        let by_name = store.create_user("alice", "other@x.com", "hash", None).await;
        assert!(matches!(by_name, Err(AppError::Conflict(msg)) if msg.contains("Username")));

        let by_email = store.create_user("bob", "a@x.com", "hash", None).await;
        assert!(matches!(by_email, Err(AppError::Conflict(msg)) if msg.contains("Email")));
    }

    #[tokio::test]
    async fn test_connect_member_is_idempotent() {
        let store = test_support::store().await;
        let user = store.create_user("alice", "a@x.com", "h", None).await.unwrap();
        let room = store
            .create_room("Standup", None, 10, user.id, "room_00000001")
            .await
            .unwrap();

        let first = joined(store.connect_member(room.id, user.id, 10).await.unwrap());
        match store.connect_member(room.id, user.id, 10).await.unwrap() {
            MemberJoin::AlreadyConnected(second) => assert_eq!(first.id, second.id),
            other => panic!("expected existing membership, got {:?}", other),
        }
        assert_eq!(store.count_connected(room.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_connect_member_full_room() {
        let store = test_support::store().await;
        let alice = store.create_user("alice", "a@x.com", "h", None).await.unwrap();
        let bob = store.create_user("bob", "b@x.com", "h", None).await.unwrap();
        let room = store
            .create_room("Pair", None, 1, alice.id, "room_00000005")
            .await
            .unwrap();

        joined(store.connect_member(room.id, alice.id, 1).await.unwrap());
        assert!(matches!(
            store.connect_member(room.id, bob.id, 1).await.unwrap(),
            MemberJoin::Full
        ));
        // A connected member is recognised even when the room is at capacity.
        assert!(matches!(
            store.connect_member(room.id, alice.id, 1).await.unwrap(),
            MemberJoin::AlreadyConnected(_)
        ));
        assert!(store.find_active_membership(room.id, bob.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_then_reconnect_adds_row() {
        let store = test_support::store().await;
        let user = store.create_user("alice", "a@x.com", "h", None).await.unwrap();
        let room = store
            .create_room("Standup", None, 10, user.id, "room_00000002")
            .await
            .unwrap();

        let membership = joined(store.connect_member(room.id, user.id, 10).await.unwrap());
        let left = store
            .set_membership_connected(membership.id, false, Some(Utc::now()))
            .await
            .unwrap();
        assert!(!left.is_connected);
        assert!(left.left_at.is_some());

        let again = joined(store.connect_member(room.id, user.id, 10).await.unwrap());
        assert_ne!(again.id, membership.id);
        assert_eq!(store.memberships_for(room.id, user.id).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_connects_by_one_user() {
        let (store, _file) = test_support::file_store().await;
        let user = store.create_user("alice", "a@x.com", "h", None).await.unwrap();
        let room = store
            .create_room("Standup", None, 10, user.id, "room_00000006")
            .await
            .unwrap();

        let (room_id, user_id) = (room.id, user.id);
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.connect_member(room_id, user_id, 10).await })
            })
            .collect();

        let mut new_rows = 0;
        for task in tasks {
            if let MemberJoin::Joined(_) = task.await.unwrap().unwrap() {
                new_rows += 1;
            }
        }

        assert_eq!(new_rows, 1);
        assert_eq!(store.count_connected(room.id).await.unwrap(), 1);
        assert_eq!(store.memberships_for(room.id, user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_connected_rejects_inconsistent_left_at() {
        let store = test_support::store().await;
        let result = store.set_membership_connected(1, true, Some(Utc::now())).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
        let result = store.set_membership_connected(1, false, None).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_deactivate_keeps_row_and_hides_from_listing() {
        let store = test_support::store().await;
        let user = store.create_user("alice", "a@x.com", "h", None).await.unwrap();
        let room = store
            .create_room("Standup", Some("daily"), 10, user.id, "room_00000003")
            .await
            .unwrap();
        assert_eq!(store.list_active_rooms(0, 100).await.unwrap().len(), 1);

        store.deactivate_room(room.id).await.unwrap();

        let kept = store.get_room(room.id).await.unwrap().unwrap();
        assert!(!kept.is_active);
        assert!(store.list_active_rooms(0, 100).await.unwrap().is_empty());
        assert!(matches!(
            store.deactivate_room(9999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_counts_connected_only() {
        let store = test_support::store().await;
        let alice = store.create_user("alice", "a@x.com", "h", None).await.unwrap();
        let bob = store.create_user("bob", "b@x.com", "h", None).await.unwrap();
        let room = store
            .create_room("Standup", None, 10, alice.id, "room_00000004")
            .await
            .unwrap();

        joined(store.connect_member(room.id, alice.id, 10).await.unwrap());
        let m = joined(store.connect_member(room.id, bob.id, 10).await.unwrap());
        store
            .set_membership_connected(m.id, false, Some(Utc::now()))
            .await
            .unwrap();

        let rooms = store.list_active_rooms(0, 100).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].1, 1);
    }

    #[tokio::test]
    async fn test_ping() {
        let store = test_support::store().await;
        assert!(store.ping().await.unwrap());
    }
}
