use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::api::extract::{JsonBody, PathParam, QueryParams};
use crate::auth::CurrentUser;
use crate::error::Result;
use crate::models::{
    CreateRoomRequest, JoinResponse, MessageResponse, Pagination, ParticipantsResponse, Room,
    RoomWithParticipants,
};
use crate::state::AppState;

/// Room routes
pub fn room_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/", get(list_rooms).post(create_room))
        .route("/rooms/{id}", get(get_room).delete(delete_room))
        .route("/rooms/{id}/join", post(join_room))
        .route("/rooms/{id}/leave", post(leave_room))
        .route("/rooms/{id}/participants", get(list_participants))
}

/// POST /rooms/ - Create a new room
async fn create_room(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(request): JsonBody<CreateRoomRequest>,
) -> Result<Json<Room>> {
    let room = state
        .rooms
        .create(
            &request.name,
            request.description.as_deref(),
            request.max_participants,
            &user,
        )
        .await?;
    Ok(Json(room))
}

/// GET /rooms/ - List active rooms
async fn list_rooms(
    State(state): State<AppState>,
    _user: CurrentUser,
    QueryParams(page): QueryParams<Pagination>,
) -> Result<Json<Vec<RoomWithParticipants>>> {
    let rooms = state.rooms.list(page.skip(), page.limit()).await?;
    Ok(Json(rooms))
}

/// GET /rooms/:id - Get a room, active or not
async fn get_room(
    State(state): State<AppState>,
    _user: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<RoomWithParticipants>> {
    let room = state.rooms.get(id).await?;
    Ok(Json(room))
}

/// POST /rooms/:id/join - Join and get a LiveKit access token
async fn join_room(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<JoinResponse>> {
    let response = state.rooms.join(id, &user).await?;
    Ok(Json(response))
}

/// POST /rooms/:id/leave
async fn leave_room(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<MessageResponse>> {
    state.rooms.leave(id, &user).await?;
    Ok(Json(MessageResponse::new("Successfully left the room")))
}

/// DELETE /rooms/:id - Creator only
async fn delete_room(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<MessageResponse>> {
    state.rooms.delete(id, &user).await?;
    Ok(Json(MessageResponse::new("Room deleted successfully")))
}

/// GET /rooms/:id/participants - What LiveKit currently reports
async fn list_participants(
    State(state): State<AppState>,
    _user: CurrentUser,
    PathParam(id): PathParam<i64>,
) -> Result<Json<ParticipantsResponse>> {
    let participants = state.rooms.list_participants(id).await?;
    Ok(Json(ParticipantsResponse { participants }))
}
