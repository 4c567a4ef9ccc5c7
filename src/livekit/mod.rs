//! LiveKit integration: access-token minting and the RoomService client.

pub mod client;
pub mod token;

pub use client::{FailMode, LiveKitClient, ParticipantSummary, ProviderClient, ProviderRoom};
pub use token::{LiveKitClaims, TokenIssuer, VideoGrant};
