//! Chat channel over a WebSocket.
//!
//! Frames in both directions are JSON envelopes `{"event": .., "data": ..}`.
//! The client sends `chat message` with a [`ChatRequest`]; the server replies
//! with `chat message` carrying a [`ChatReply`], or `error` with a fixed
//! string when anything goes wrong.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::AppState;
use crate::assistant::{ChatModel, ChatRequest};

pub const CHAT_EVENT: &str = "chat message";
pub const ERROR_EVENT: &str = "error";
pub const GENERIC_ERROR: &str = "An error occurred";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    fn error() -> Self {
        Self {
            event: ERROR_EVENT.to_owned(),
            data: Value::String(GENERIC_ERROR.to_owned()),
        }
    }
}

pub async fn chat_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let model = state.assistant.clone();
    ws.on_upgrade(move |socket| run_session(socket, model))
}

async fn run_session(mut socket: WebSocket, model: Arc<dyn ChatModel>) {
    info!("chat client connected");
    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!("chat socket error: {err}");
                break;
            }
        };

        let Some(reply) = handle_frame(model.as_ref(), text.as_str()).await else {
            continue;
        };
        let payload = match serde_json::to_string(&reply) {
            Ok(payload) => payload,
            Err(err) => {
                error!("could not encode chat reply: {err}");
                continue;
            }
        };
        if socket.send(Message::Text(payload.into())).await.is_err() {
            break;
        }
    }
    info!("chat client disconnected");
}

/// Handles one inbound frame. Events other than `chat message` are ignored.
pub async fn handle_frame(model: &dyn ChatModel, frame: &str) -> Option<Envelope> {
    let envelope: Envelope = match serde_json::from_str(frame) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!("unreadable chat frame: {err}");
            return Some(Envelope::error());
        }
    };
    if envelope.event != CHAT_EVENT {
        debug!(event = %envelope.event, "ignoring chat event");
        return None;
    }

    let request: ChatRequest = match serde_json::from_value(envelope.data) {
        Ok(request) => request,
        Err(err) => {
            warn!("invalid chat request: {err}");
            return Some(Envelope::error());
        }
    };

    match model.answer(&request).await {
        Ok(reply) => match serde_json::to_value(reply) {
            Ok(data) => Some(Envelope {
                event: CHAT_EVENT.to_owned(),
                data,
            }),
            Err(err) => {
                error!("could not encode chat answer: {err}");
                Some(Envelope::error())
            }
        },
        Err(err) => {
            error!("Error in chat: {err}");
            Some(Envelope::error())
        }
    }
}
