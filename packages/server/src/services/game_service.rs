//! Entry points the enclosing application uses: start a session in an origin channel, forward
//! player events to it, and read its public state. At most one live session per origin.

use tokio::sync::broadcast;
use werewolf_rules::ChannelId;

use super::session::{self, SessionHandle, SessionRequest};
use crate::error::SessionError;
use crate::models::session::{FeedEvent, GameSnapshot, SessionEvent};
use crate::state::AppState;

pub async fn start_session(
    state: &AppState,
    request: SessionRequest,
) -> Result<SessionHandle, SessionError> {
    let origin = request.origin;
    let mut sessions = state.sessions.lock().await;
    if let Some(existing) = sessions.get(&origin) {
        if !existing.is_closed() {
            return Err(SessionError::AlreadyRunning(origin));
        }
    }
    // Taken under the registry lock so a closing session cannot release it meanwhile.
    let feed = state.get_or_create_feed(origin).await;

    let (handle, task) = session::spawn(request, state.session_deps(feed));
    sessions.insert(origin, handle.clone());
    drop(sessions);
    tracing::info!(%origin, session_id = %handle.id(), "session registered");

    let state = state.clone();
    let id = handle.id();
    tokio::spawn(async move {
        if let Err(e) = task.await {
            tracing::error!(%origin, "session task failed: {}", e);
        }
        {
            let mut sessions = state.sessions.lock().await;
            if sessions.get(&origin).map_or(false, |h| h.id() == id) {
                sessions.remove(&origin);
            }
        }
        state.release_feed(origin).await;
    });

    Ok(handle)
}

pub async fn get_session(state: &AppState, origin: ChannelId) -> Result<SessionHandle, SessionError> {
    state
        .sessions
        .lock()
        .await
        .get(&origin)
        .cloned()
        .ok_or(SessionError::NotFound(origin))
}

pub async fn submit(
    state: &AppState,
    origin: ChannelId,
    event: SessionEvent,
) -> Result<(), SessionError> {
    let handle = get_session(state, origin).await?;
    handle.send(event).await
}

pub async fn get_snapshot(state: &AppState, origin: ChannelId) -> Result<GameSnapshot, SessionError> {
    Ok(get_session(state, origin).await?.snapshot())
}

pub async fn subscribe(state: &AppState, origin: ChannelId) -> broadcast::Receiver<FeedEvent> {
    state.get_or_create_feed(origin).await.subscribe()
}

/// Called when a spectator leaves.
pub async fn unsubscribe(state: &AppState, origin: ChannelId) {
    state.release_feed(origin).await;
}
