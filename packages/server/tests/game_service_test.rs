use std::sync::Arc;
use std::time::Duration;

use werewolf_rules::{ChannelId, PlayerId};
use werewolf_server::{
    error::SessionError,
    models::config::GameConfig,
    models::session::{SessionEvent, SessionStage},
    platform::MemoryPlatform,
    services::{game_service, session::SessionRequest},
    state::AppState,
    utils::{config::ServerConfig, test_setup::setup_test_env},
};

fn test_state(platform: &MemoryPlatform) -> AppState {
    setup_test_env();
    AppState::in_memory(ServerConfig::new("secret"), GameConfig::default())
        .with_platform(Arc::new(platform.clone()))
}

/// Polls `done` until it holds, failing after a few virtual seconds.
async fn eventually<F, Fut>(mut done: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

async fn cancel(state: &AppState, origin: u64, by: u64) {
    game_service::submit(
        state,
        ChannelId(origin),
        SessionEvent::Cancel {
            by: PlayerId(by),
            operator: false,
        },
    )
    .await
    .unwrap();
}

fn request(origin: u64, initiator: u64) -> SessionRequest {
    SessionRequest {
        origin: ChannelId(origin),
        initiator: PlayerId(initiator),
        initiator_name: format!("Player{}", initiator),
        player_hint: None,
    }
}

#[tokio::test(start_paused = true)]
async fn one_live_session_per_origin() {
    let platform = MemoryPlatform::new();
    let state = test_state(&platform);

    let first = game_service::start_session(&state, request(1, 1)).await.unwrap();
    let again = game_service::start_session(&state, request(1, 2)).await;
    assert!(matches!(again, Err(SessionError::AlreadyRunning(ChannelId(1)))));

    // A different origin is independent.
    let other = game_service::start_session(&state, request(2, 2)).await.unwrap();
    assert_ne!(first.id(), other.id());
    assert_eq!(state.sessions.lock().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn events_reach_the_session_for_their_origin() {
    let platform = MemoryPlatform::new();
    let state = test_state(&platform);
    game_service::start_session(&state, request(1, 1)).await.unwrap();

    game_service::submit(
        &state,
        ChannelId(1),
        SessionEvent::Join {
            player: PlayerId(2),
            name: "Player2".to_string(),
        },
    )
    .await
    .unwrap();

    let snapshot = game_service::get_snapshot(&state, ChannelId(1)).await.unwrap();
    assert_eq!(snapshot.stage, SessionStage::Lobby);
    assert_eq!(snapshot.players.len(), 2);

    let missing = game_service::submit(&state, ChannelId(9), SessionEvent::StartNow { by: PlayerId(1) }).await;
    assert!(matches!(missing, Err(SessionError::NotFound(ChannelId(9)))));
}

#[tokio::test(start_paused = true)]
async fn origin_frees_up_once_the_session_closes() {
    let platform = MemoryPlatform::new();
    let state = test_state(&platform);
    let first = game_service::start_session(&state, request(1, 1)).await.unwrap();

    game_service::submit(
        &state,
        ChannelId(1),
        SessionEvent::Cancel {
            by: PlayerId(1),
            operator: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(first.closed().await.stage, SessionStage::Aborted);

    let second = game_service::start_session(&state, request(1, 3)).await.unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(second.snapshot().initiator, PlayerId(3));
}

#[tokio::test(start_paused = true)]
async fn feed_is_dropped_once_nobody_plays_or_watches() {
    let platform = MemoryPlatform::new();
    let state = test_state(&platform);

    game_service::start_session(&state, request(1, 1)).await.unwrap();
    assert!(state.channel.lock().await.contains_key(&ChannelId(1)));
    cancel(&state, 1, 1).await;
    eventually(|| async { !state.channel.lock().await.contains_key(&ChannelId(1)) }).await;
    assert!(state.sessions.lock().await.is_empty());

    // A spectator keeps the feed alive past the session.
    game_service::start_session(&state, request(2, 1)).await.unwrap();
    let spectator = game_service::subscribe(&state, ChannelId(2)).await;
    cancel(&state, 2, 1).await;
    eventually(|| async { state.sessions.lock().await.is_empty() }).await;
    state.release_feed(ChannelId(2)).await;
    assert!(state.channel.lock().await.contains_key(&ChannelId(2)));

    drop(spectator);
    game_service::unsubscribe(&state, ChannelId(2)).await;
    assert!(state.channel.lock().await.is_empty());
}
