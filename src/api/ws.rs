//! `/ws/letters`: live letter events for dashboards.
//!
//! On connect the client gets a sync of every letter it may see, then each
//! committed transition it may see. A lagging client is re-synced.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::ApiState;
use super::identity::Identity;
use crate::letters::events::LetterEvent;
use crate::letters::model::{Actor, Letter};
use crate::letters::visibility::{SortMode, visible_at};

/// Messages pushed to dashboard clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Sync { letters: Vec<Letter> },
    Event { event: LetterEvent },
}

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Identity(actor): Identity,
) -> impl IntoResponse {
    info!(role = %actor.role, "Letter WebSocket client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, state, actor))
}

async fn handle_socket(mut socket: WebSocket, state: ApiState, actor: Actor) {
    // Subscribe first so nothing committed during the sync is missed.
    let mut rx = state.workflow.subscribe();

    if !send_sync(&mut socket, &state, &actor).await {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !may_see(&actor, &event) {
                            continue;
                        }
                        if !send_json(&mut socket, &WsMessage::Event { event }).await {
                            debug!("WS client disconnected");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind letter events");
                        if !send_sync(&mut socket, &state, &actor).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Letter event channel closed");
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!(role = %actor.role, "Letter WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {e}");
                        break;
                    }
                }
            }
        }
    }
}

fn may_see(actor: &Actor, event: &LetterEvent) -> bool {
    visible_at(
        actor.role,
        actor.department.as_deref(),
        &event.department,
        event.classification,
        event.state(),
    )
}

async fn send_sync(socket: &mut WebSocket, state: &ApiState, actor: &Actor) -> bool {
    match state.workflow.list_for(actor, SortMode::Date).await {
        Ok(letters) => send_json(socket, &WsMessage::Sync { letters }).await,
        Err(e) => {
            warn!(error = %e, "Cannot load letters for WS sync");
            false
        }
    }
}

async fn send_json(socket: &mut WebSocket, msg: &WsMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize WS message: {e}");
            true
        }
    }
}
