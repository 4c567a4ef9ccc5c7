pub mod room;
pub mod user;

pub use room::{
    CreateRoomRequest, JoinResponse, Membership, MessageResponse, ParticipantsResponse, Room,
    RoomStatus, RoomWithParticipants,
};

pub use user::{Claims, LoginForm, Pagination, RegisterRequest, TokenResponse, User};
