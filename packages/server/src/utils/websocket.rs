use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use werewolf_rules::ChannelId;

use crate::services::game_service;
use crate::state::AppState;

pub async fn handler(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, origin))
}

/// Stream the origin's feed to one spectator. The feed is read-only; anything the client sends
/// is ignored apart from close frames.
pub async fn handle_socket(ws: WebSocket, state: AppState, origin: ChannelId) {
    info!("New WebSocket connection established for channel: {}", origin);
    let mut rx = game_service::subscribe(&state, origin).await;
    let (mut sender, mut receiver) = ws.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%origin, skipped, "spectator fell behind the feed");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("failed to serialize feed event: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text)).await {
                tracing::debug!(%origin, "spectator socket closed: {}", e);
                break;
            }
        }
    });

    let mut receive_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    // The aborted task is awaited so its feed receiver is gone before the feed is released.
    tokio::select! {
        _ = &mut send_task => {
            receive_task.abort();
            let _ = receive_task.await;
        }
        _ = &mut receive_task => {
            send_task.abort();
            let _ = send_task.await;
        }
    }
    game_service::unsubscribe(&state, origin).await;
    info!("WebSocket connection closed for channel: {}", origin);
}
