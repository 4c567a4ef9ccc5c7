use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::livekit::token::{TokenIssuer, VideoGrant};

/// Room as reported by LiveKit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderRoom {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sid: String,
    #[serde(default, alias = "numParticipants", deserialize_with = "lenient_i64")]
    pub num_participants: i64,
    #[serde(default, alias = "creationTime", deserialize_with = "lenient_i64")]
    pub creation_time: i64,
}

/// Participant as reported by LiveKit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSummary {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sid: String,
    #[serde(default, alias = "joinedAt", deserialize_with = "lenient_i64")]
    pub joined_at: i64,
    #[serde(default = "unknown_state", deserialize_with = "participant_state")]
    pub state: String,
}

fn unknown_state() -> String {
    "UNKNOWN".to_string()
}

/// protojson renders int64 as a string; older servers send numbers.
fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Enum names pass through; numeric values map to `ParticipantInfo.State`.
fn participant_state<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(0) => "JOINING".to_string(),
        Raw::Num(1) => "JOINED".to_string(),
        Raw::Num(2) => "ACTIVE".to_string(),
        Raw::Num(3) => "DISCONNECTED".to_string(),
        Raw::Num(_) => unknown_state(),
    })
}

/// What to do when a provider call fails at a given call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Log and hand back an empty value
    Open,
    /// Propagate the error
    Closed,
}

impl FailMode {
    pub fn from_flag(fail_open: bool) -> Self {
        if fail_open {
            FailMode::Open
        } else {
            FailMode::Closed
        }
    }

    pub fn apply<T: Default>(self, operation: &str, result: Result<T>) -> Result<T> {
        match (self, result) {
            (_, Ok(value)) => Ok(value),
            (FailMode::Open, Err(e)) => {
                tracing::warn!(operation, error = %e, "LiveKit call failed, continuing without it");
                Ok(T::default())
            }
            (FailMode::Closed, Err(e)) => Err(e),
        }
    }
}

/// Management surface of the media provider
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn create_room(&self, name: &str) -> Result<ProviderRoom>;

    /// Deleting a room the provider does not know about succeeds.
    async fn delete_room(&self, name: &str) -> Result<()>;

    async fn list_rooms(&self) -> Result<Vec<ProviderRoom>>;

    async fn list_participants(&self, room: &str) -> Result<Vec<ParticipantSummary>>;
}

#[derive(Deserialize)]
struct TwirpError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
}

#[derive(Deserialize)]
struct ListRoomsResponse {
    #[serde(default)]
    rooms: Vec<ProviderRoom>,
}

#[derive(Deserialize)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<ParticipantSummary>,
}

/// LiveKit RoomService over Twirp/JSON
#[derive(Clone)]
pub struct LiveKitClient {
    client: Client,
    base_url: String,
    issuer: TokenIssuer,
    register_rooms: bool,
}

impl LiveKitClient {
    pub fn new(config: &Config, issuer: TokenIssuer) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.livekit_timeout_seconds))
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.livekit_http_url(),
            issuer,
            register_rooms: config.livekit_register_rooms,
        })
    }

    async fn call<B, R>(&self, method: &str, grant: VideoGrant, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/twirp/livekit.RoomService/{}", self.base_url, method);
        let token = self.issuer.admin(grant)?;

        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let twirp: Option<TwirpError> = serde_json::from_str(&text).ok();

            if status == reqwest::StatusCode::NOT_FOUND
                || twirp.as_ref().is_some_and(|t| t.code == "not_found")
            {
                return Err(AppError::NotFound(format!("LiveKit {}: not found", method)));
            }

            let detail = twirp.map(|t| t.msg).unwrap_or(text);
            return Err(AppError::Upstream(format!(
                "LiveKit {} returned {}: {}",
                method, status, detail
            )));
        }

        res.json::<R>()
            .await
            .map_err(|e| AppError::Upstream(format!("LiveKit {} response: {}", method, e)))
    }
}

#[async_trait]
impl ProviderClient for LiveKitClient {
    async fn create_room(&self, name: &str) -> Result<ProviderRoom> {
        if !self.register_rooms {
            // LiveKit creates the room on first join.
            return Ok(ProviderRoom {
                name: name.to_string(),
                sid: format!("RM_{}", name),
                ..Default::default()
            });
        }

        let grant = VideoGrant {
            room_create: true,
            ..Default::default()
        };
        let room: ProviderRoom = self.call("CreateRoom", grant, &json!({ "name": name })).await?;

        tracing::info!(room = %name, sid = %room.sid, "LiveKit room registered");
        Ok(room)
    }

    async fn delete_room(&self, name: &str) -> Result<()> {
        let grant = VideoGrant {
            room_create: true,
            ..Default::default()
        };

        match self
            .call::<_, serde_json::Value>("DeleteRoom", grant, &json!({ "room": name }))
            .await
        {
            Ok(_) => {
                tracing::info!(room = %name, "LiveKit room deleted");
                Ok(())
            }
            Err(AppError::NotFound(_)) => {
                tracing::debug!(room = %name, "LiveKit room already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list_rooms(&self) -> Result<Vec<ProviderRoom>> {
        let grant = VideoGrant {
            room_list: true,
            ..Default::default()
        };
        let res: ListRoomsResponse = self.call("ListRooms", grant, &json!({})).await?;
        Ok(res.rooms)
    }

    async fn list_participants(&self, room: &str) -> Result<Vec<ParticipantSummary>> {
        let grant = VideoGrant {
            room: Some(room.to_string()),
            room_admin: true,
            ..Default::default()
        };
        let res: ListParticipantsResponse = self
            .call("ListParticipants", grant, &json!({ "room": room }))
            .await?;
        Ok(res.participants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_protojson_rooms() {
        let body = r#"{"rooms":[{"sid":"RM_1","name":"room_ab12cd34","numParticipants":2,"creationTime":"1700000000"}]}"#;
        let parsed: ListRoomsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.rooms,
            vec![ProviderRoom {
                name: "room_ab12cd34".to_string(),
                sid: "RM_1".to_string(),
                num_participants: 2,
                creation_time: 1_700_000_000,
            }]
        );
    }

    #[test]
    fn test_parse_participants_and_states() {
        let body = r#"{"participants":[
            {"identity":"alice","name":"alice","sid":"PA_1","joined_at":"1700000001","state":"ACTIVE"},
            {"identity":"bob","sid":"PA_2","joined_at":1700000002,"state":1},
            {"identity":"carol"}
        ]}"#;
        let parsed: ListParticipantsResponse = serde_json::from_str(body).unwrap();
        let states: Vec<&str> = parsed.participants.iter().map(|p| p.state.as_str()).collect();

        assert_eq!(states, vec!["ACTIVE", "JOINED", "UNKNOWN"]);
        assert_eq!(parsed.participants[1].joined_at, 1_700_000_002);
        assert_eq!(parsed.participants[2].name, "");
    }

    #[test]
    fn test_empty_list_body() {
        let parsed: ListRoomsResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.rooms.is_empty());
    }

    #[test]
    fn test_fail_mode() {
        let failed: Result<Vec<ProviderRoom>> = Err(AppError::Upstream("down".into()));
        assert!(FailMode::Open.apply("list_rooms", failed).unwrap().is_empty());

        let failed: Result<Vec<ProviderRoom>> = Err(AppError::Upstream("down".into()));
        assert!(matches!(
            FailMode::Closed.apply("list_rooms", failed),
            Err(AppError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn test_create_without_registration_is_local() {
        let mut config = test_support::config();
        config.livekit_register_rooms = false;
        // Nothing listens here; the call must not leave the process.
        config.livekit_url = "ws://127.0.0.1:9".to_string();

        let client = LiveKitClient::new(&config, TokenIssuer::new(&config)).unwrap();
        let room = client.create_room("room_0badf00d").await.unwrap();
        assert_eq!(room.name, "room_0badf00d");
        assert_eq!(room.sid, "RM_room_0badf00d");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_upstream_error() {
        let mut config = test_support::config();
        config.livekit_url = "ws://127.0.0.1:9".to_string();
        config.livekit_timeout_seconds = 2;

        let client = LiveKitClient::new(&config, TokenIssuer::new(&config)).unwrap();
        assert!(matches!(
            client.list_participants("room_1").await,
            Err(AppError::Upstream(_))
        ));
    }
}
