use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;

/// LiveKit `video` grant. Unset flags are omitted from the token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub room_join: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub room_create: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub room_list: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub room_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl VideoGrant {
    /// Join one room with publish and subscribe rights
    pub fn participant(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            room_join: true,
            can_publish: Some(true),
            can_subscribe: Some(true),
            ..Default::default()
        }
    }
}

/// LiveKit access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveKitClaims {
    pub iss: String,
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
    pub video: VideoGrant,
}

/// Mints LiveKit access tokens signed with the API secret
#[derive(Clone)]
pub struct TokenIssuer {
    api_key: String,
    encoding_key: EncodingKey,
    ttl_seconds: u64,
}

impl TokenIssuer {
    pub fn new(config: &Config) -> Self {
        Self {
            api_key: config.livekit_api_key.clone(),
            encoding_key: EncodingKey::from_secret(config.livekit_api_secret.as_bytes()),
            ttl_seconds: config.livekit_token_ttl_seconds,
        }
    }

    /// Token letting `identity` join, publish and subscribe in `room`.
    /// Every call yields a distinct token (fresh `jti`).
    pub fn issue(&self, room: &str, identity: &str, display_name: &str) -> Result<String> {
        self.sign(
            identity,
            Some(display_name),
            VideoGrant::participant(room),
            self.ttl_seconds,
        )
    }

    /// Short-lived token for room-service administration calls
    pub fn admin(&self, grant: VideoGrant) -> Result<String> {
        self.sign(&self.api_key, None, grant, 600)
    }

    fn sign(
        &self,
        identity: &str,
        name: Option<&str>,
        video: VideoGrant,
        ttl_seconds: u64,
    ) -> Result<String> {
        let now = Utc::now().timestamp();

        let claims = LiveKitClaims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            name: name.map(str::to_string),
            nbf: now,
            exp: now.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)),
            jti: Uuid::new_v4().to_string(),
            video,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use pretty_assertions::assert_eq;

    fn decode_claims(token: &str, secret: &str) -> LiveKitClaims {
        decode::<LiveKitClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .expect("Should decode LiveKit token")
        .claims
    }

    #[test]
    fn test_participant_token_is_scoped_to_room() {
        let config = test_support::config();
        let issuer = TokenIssuer::new(&config);

        let token = issuer
            .issue("room_deadbeef", "alice", "alice")
            .expect("Should issue token");
        let claims = decode_claims(&token, &config.livekit_api_secret);

        assert_eq!(claims.iss, config.livekit_api_key);
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.name.as_deref(), Some("alice"));
        assert_eq!(claims.video, VideoGrant::participant("room_deadbeef"));
        assert_eq!(claims.exp - claims.nbf, config.livekit_token_ttl_seconds as i64);
        assert!(!claims.video.room_admin);
    }

    #[test]
    fn test_grant_wire_names() {
        let json = serde_json::to_value(VideoGrant::participant("r")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "room": "r",
                "roomJoin": true,
                "canPublish": true,
                "canSubscribe": true
            })
        );
    }

    #[test]
    fn test_tokens_are_unique() {
        let issuer = TokenIssuer::new(&test_support::config());
        let a = issuer.issue("room_1", "alice", "alice").unwrap();
        let b = issuer.issue("room_1", "alice", "alice").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenIssuer::new(&test_support::config());
        let token = issuer.issue("room_1", "alice", "alice").unwrap();
        let result = decode::<LiveKitClaims>(
            &token,
            &DecodingKey::from_secret(b"another-secret"),
            &Validation::new(Algorithm::HS256),
        );
        assert!(result.is_err());
    }
}
