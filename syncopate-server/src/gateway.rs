use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use syncopate_core::{Member, Room, RoomEvent};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    serialized::{Member as SerializedMember, PlaybackState, QueueEntry, ToSerialized},
    Router,
};

/// Messages pushed to gateway connections.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ServerEvent {
    /// The playback state machine transitioned
    PlaybackUpdate { playback: PlaybackState },
    /// Periodic position report while a track is playing
    PositionUpdate { position_millis: u64 },
    /// The queue was mutated and re-ranked
    QueueUpdate { entries: Vec<QueueEntry> },
    /// An entry exhausted its resolution attempts and was skipped
    TrackFailed { entry: QueueEntry, error: String },
    MemberJoined { member: SerializedMember },
    MemberLeft { member_id: u64 },
    /// The room was closed; the connection ends after this
    RoomClosed,
}

impl From<RoomEvent> for ServerEvent {
    fn from(value: RoomEvent) -> Self {
        match value {
            RoomEvent::PlaybackUpdate { playback } => Self::PlaybackUpdate {
                playback: playback.to_serialized(),
            },
            RoomEvent::PositionUpdate { position_millis } => {
                Self::PositionUpdate { position_millis }
            }
            RoomEvent::QueueUpdate { entries } => Self::QueueUpdate {
                entries: entries.to_serialized(),
            },
            RoomEvent::TrackFailed { entry, error } => Self::TrackFailed {
                entry: entry.to_serialized(),
                error,
            },
            RoomEvent::MemberJoined { member } => Self::MemberJoined {
                member: member.to_serialized(),
            },
            RoomEvent::MemberLeft { member_id } => Self::MemberLeft { member_id },
            RoomEvent::RoomClosed => Self::RoomClosed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayQuery {
    pub member_id: u64,
    pub display_name: String,
}

/// Upgrades to the room's real-time channel.
///
/// The server pushes [ServerEvent]s as JSON; the client sends a liveness
/// ping at least every few seconds, and may send anything else without
/// breaking the connection.
async fn gateway(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> ServerResult<Response> {
    let room = context.syncopate.rooms.room_by_code(&code)?;

    let member = Member {
        id: query.member_id,
        display_name: query.display_name,
        joined_at: Utc::now(),
    };

    Ok(ws.on_upgrade(move |socket| handle_connection(room, member, socket)))
}

async fn handle_connection(room: Arc<Room>, member: Member, socket: WebSocket) {
    let mut events = match room.subscribe(member) {
        Ok(handle) => handle,
        // Capacity or a close raced the upgrade; nothing to do but hang up
        Err(_) => return,
    };

    let (mut outgoing, mut incoming) = socket.split();
    let subscription_id = events.id();

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    let payload = serde_json::to_string(&ServerEvent::from(event))
                        .expect("event serializes");

                    // A failed send means the connection is gone; dropping
                    // the handle below cleans the subscription up
                    if outgoing.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                // Evicted by the hub, or the room closed
                None => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if is_liveness_signal(&text) {
                        room.heartbeat(subscription_id);
                    }
                    // Anything else on the channel is ignored, not fatal
                }
                Some(Ok(Message::Ping(_))) => {
                    room.heartbeat(subscription_id);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    debug!("Gateway connection to room {} ended", room.code());
}

/// The liveness signal: the literal text "ping", or a JSON object tagged as
/// one.
fn is_liveness_signal(text: &str) -> bool {
    if text.trim().eq_ignore_ascii_case("ping") {
        return true;
    }

    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| {
            value
                .get("type")
                .and_then(|t| t.as_str())
                .map(|t| t == "ping")
        })
        .unwrap_or_default()
}

pub fn router() -> Router {
    Router::new().route("/:code/gateway", get(gateway))
}

#[cfg(test)]
mod test {
    use super::is_liveness_signal;

    #[test]
    fn recognizes_liveness_signals() {
        assert!(is_liveness_signal("ping"));
        assert!(is_liveness_signal("  PING \n"));
        assert!(is_liveness_signal(r#"{"type":"ping"}"#));
    }

    #[test]
    fn tolerates_arbitrary_text() {
        assert!(!is_liveness_signal(""));
        assert!(!is_liveness_signal("hello there"));
        assert!(!is_liveness_signal(r#"{"type":"shout"}"#));
        assert!(!is_liveness_signal("{not json"));
    }
}
