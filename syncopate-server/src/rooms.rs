use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json,
};

use syncopate_core::{generate_room_code, EntryId, NewEntry, ProviderKind, Room as CoreRoom, RoomParams};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewRoomSchema, NewTrackSchema, RoomActionSchema, ValidatedJson, VoteSchema},
    serialized::{serialize_room, PlaybackState, QueueEntry, Room, ToSerialized},
    Router,
};

fn room_payload(context: &ServerContext, room: &Arc<CoreRoom>) -> Room {
    let members = context.syncopate.hub().members(room.code());
    serialize_room(room.data(), &members)
}

#[utoipa::path(
    get,
    path = "/v1/rooms",
    tag = "rooms",
    responses(
        (status = 200, body = Vec<Room>)
    )
)]
pub(crate) async fn list_rooms(State(context): State<ServerContext>) -> Json<Vec<Room>> {
    let rooms: Vec<_> = context
        .syncopate
        .rooms
        .list_all()
        .iter()
        .map(|r| room_payload(&context, r))
        .collect();

    Json(rooms)
}

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn create_room(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<Room>> {
    let code = body
        .code
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or_else(generate_room_code);

    let room = context
        .syncopate
        .rooms
        .get_or_create(
            &code,
            RoomParams {
                name: body.name,
                capacity: body.capacity.map(|c| c as usize),
                host_id: body.host_id,
            },
        )
        .await;

    Ok(Json(room_payload(&context, &room)))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{code}",
    tag = "rooms",
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn room(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<Room>> {
    let room = context.syncopate.rooms.room_by_code(&code)?;

    Ok(Json(room_payload(&context, &room)))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{code}",
    tag = "rooms",
    responses(
        (status = 200, description = "Room was closed")
    )
)]
pub(crate) async fn close_room(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<()> {
    context.syncopate.rooms.close(&code)?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{code}/queue",
    tag = "rooms",
    responses(
        (status = 200, body = Vec<QueueEntry>)
    )
)]
pub(crate) async fn queue(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<Vec<QueueEntry>>> {
    let room = context.syncopate.rooms.room_by_code(&code)?;

    Ok(Json(room.queue().to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{code}/queue",
    tag = "rooms",
    request_body = NewTrackSchema,
    responses(
        (status = 200, body = QueueEntry)
    )
)]
pub(crate) async fn add_to_queue(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
    ValidatedJson(body): ValidatedJson<NewTrackSchema>,
) -> ServerResult<Json<QueueEntry>> {
    let room = context.syncopate.rooms.room_by_code(&code)?;

    let entry = room.add_track(NewEntry {
        title: body.title,
        artist: body.artist,
        provider: body
            .provider
            .map(ProviderKind::from)
            .unwrap_or(ProviderKind::YouTube),
        provider_ref: body.provider_ref,
        added_by: body.member_id,
    })?;

    Ok(Json(entry.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{code}/queue/{entry}/votes",
    tag = "rooms",
    request_body = VoteSchema,
    responses(
        (status = 200, body = QueueEntry)
    )
)]
pub(crate) async fn vote(
    State(context): State<ServerContext>,
    Path((code, entry)): Path<(String, u64)>,
    ValidatedJson(body): ValidatedJson<VoteSchema>,
) -> ServerResult<Json<QueueEntry>> {
    let room = context.syncopate.rooms.room_by_code(&code)?;
    let entry = room.vote(EntryId::from(entry), body.delta)?;

    Ok(Json(entry.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{code}/queue/{entry}",
    tag = "rooms",
    responses(
        (status = 200, description = "Entry was removed from the queue")
    )
)]
pub(crate) async fn remove_from_queue(
    State(context): State<ServerContext>,
    Path((code, entry)): Path<(String, u64)>,
) -> ServerResult<()> {
    let room = context.syncopate.rooms.room_by_code(&code)?;
    room.remove_track(EntryId::from(entry))?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{code}/actions",
    tag = "rooms",
    request_body = RoomActionSchema,
    responses(
        (status = 200, body = PlaybackState)
    )
)]
pub(crate) async fn perform_room_action(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
    Json(body): Json<RoomActionSchema>,
) -> ServerResult<Json<PlaybackState>> {
    let room = context.syncopate.rooms.room_by_code(&code)?;

    let playback = match body {
        RoomActionSchema::Play => room.play()?,
        RoomActionSchema::Pause => room.pause()?,
        RoomActionSchema::Skip => room.skip()?,
        RoomActionSchema::Seek { to } => room.seek(to)?,
    };

    Ok(Json(playback.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{code}/playback",
    tag = "rooms",
    responses(
        (status = 200, body = PlaybackState)
    )
)]
pub(crate) async fn playback(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<PlaybackState>> {
    let room = context.syncopate.rooms.room_by_code(&code)?;

    Ok(Json(room.playback().to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms))
        .route("/", post(create_room))
        .route("/:code", get(room))
        .route("/:code", delete(close_room))
        .route("/:code/queue", get(queue))
        .route("/:code/queue", post(add_to_queue))
        .route("/:code/queue/:entry/votes", post(vote))
        .route("/:code/queue/:entry", delete(remove_from_queue))
        .route("/:code/actions", post(perform_room_action))
        .route("/:code/playback", get(playback))
}
