use crate::error::RegistryError;
use crate::relay::RelayState;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use parley_core::{
    CLOSE_SUPERSEDED, CLOSE_UNAUTHORIZED, ErrorCode, ParticipantId, RoomId, SignalBody,
    SignalMessage,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(participant): Path<String>,
    Query(params): Query<ConnectParams>,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    let participant = ParticipantId::from(participant);
    let authorized = state.authorize(params.token.as_deref());

    ws.on_upgrade(move |socket| async move {
        if authorized {
            handle_socket(socket, participant, state).await;
        } else {
            reject_socket(socket, participant).await;
        }
    })
}

async fn reject_socket(mut socket: WebSocket, participant: ParticipantId) {
    warn!(participant = %participant, "Rejecting connection: bad token");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_UNAUTHORIZED,
            reason: "unauthorized".into(),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, participant: ParticipantId, state: RelayState) {
    info!(participant = %participant, "New WebSocket connection");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let (connection_id, _) = state.signaling.attach(participant.clone(), tx, CLOSE_SUPERSEDED);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let rooms: Arc<Mutex<HashSet<RoomId>>> = Arc::new(Mutex::new(HashSet::new()));

    let mut recv_task = tokio::spawn({
        let state = state.clone();
        let participant = participant.clone();
        let rooms = rooms.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(signal) => {
                            dispatch(&state, &participant, &rooms, signal).await;
                        }
                        Err(e) => {
                            warn!(participant = %participant, "Invalid SignalMessage: {:?}", e);
                            let error = SignalMessage::error(
                                RoomId::default(),
                                ErrorCode::BadRequest,
                                format!("invalid message: {e}"),
                            )
                            .to(participant.clone());
                            state.signaling.send_signal(&participant, &error);
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    let rooms: Vec<RoomId> = rooms.lock().await.drain().collect();

    // Only the current connection may tear down membership; a superseded one leaves it
    // to the connection that replaced it.
    if state.signaling.detach(&participant, connection_id) {
        for room in rooms {
            state
                .registry
                .leave(&room, &participant, Some("connection lost".to_string()))
                .await;
        }
    } else {
        debug!(participant = %participant, "Connection superseded, keeping memberships");
    }

    info!(participant = %participant, "WebSocket disconnected");
}

async fn dispatch(
    state: &RelayState,
    participant: &ParticipantId,
    rooms: &Mutex<HashSet<RoomId>>,
    mut signal: SignalMessage,
) {
    // Never trust the client's claim about who it is.
    signal.from_participant = participant.clone();
    let room = signal.room_id.clone();

    match signal.body {
        SignalBody::Join { media } => {
            // Recorded before awaiting the join so an aborted dispatch still gets its leave.
            rooms.lock().await.insert(room.clone());
            if let Err(e) = state.registry.join(&room, participant, media).await {
                rooms.lock().await.remove(&room);
                let code = match e {
                    RegistryError::NotEnrolled { .. } => ErrorCode::NotEnrolled,
                    RegistryError::RoomClosed => ErrorCode::RoomClosed,
                };
                let error =
                    SignalMessage::error(room, code, e.to_string()).to(participant.clone());
                state.signaling.send_signal(participant, &error);
            }
        }

        SignalBody::Leave { reason } => {
            rooms.lock().await.remove(&room);
            state.registry.leave(&room, participant, reason).await;
        }

        SignalBody::Offer { .. } | SignalBody::Answer { .. } | SignalBody::Candidate(_) => {
            state.registry.relay(signal).await;
        }

        SignalBody::MediaStateChanged { media } => {
            state.registry.update_media(&room, participant, media).await;
        }

        SignalBody::ParticipantList { .. } | SignalBody::Error { .. } => {
            let error = SignalMessage::error(
                room,
                ErrorCode::BadRequest,
                format!("{} is a server-only message", signal.body.kind()),
            )
            .to(participant.clone());
            state.signaling.send_signal(participant, &error);
        }
    }
}
