use axum::Json;
use utoipa::OpenApi;

use crate::gateway::ServerEvent;
use crate::schemas::{NewRoomSchema, NewTrackSchema, RoomActionSchema, VoteSchema};
use crate::serialized::{
    Member, PlaybackPhase, PlaybackState, Provider, QueueEntry, Room, Stream,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "syncopate API",
        description = "Exposes endpoints to interact with a syncopate server"
    ),
    paths(
        crate::rooms::list_rooms,
        crate::rooms::create_room,
        crate::rooms::room,
        crate::rooms::close_room,
        crate::rooms::queue,
        crate::rooms::add_to_queue,
        crate::rooms::vote,
        crate::rooms::remove_from_queue,
        crate::rooms::perform_room_action,
        crate::rooms::playback,
    ),
    components(schemas(
        Room,
        Member,
        QueueEntry,
        PlaybackState,
        PlaybackPhase,
        Stream,
        Provider,
        ServerEvent,
        NewRoomSchema,
        NewTrackSchema,
        VoteSchema,
        RoomActionSchema,
    ))
)]
pub struct ApiDoc;

pub async fn serve_api() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
