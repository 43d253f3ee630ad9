use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use werewolf_rules::{ChannelId, PlayerId, Role, VoteTarget};

use crate::error::SessionError;
use crate::models::session::SessionEvent;
use crate::services::game_service;
use crate::services::session::SessionRequest;
use crate::state::AppState;
use crate::utils::websocket;

pub mod auth_middleware;

use auth_middleware::Actor;

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub origin: ChannelId,
    #[serde(default)]
    pub player_hint: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    /// None abstains.
    #[serde(default)]
    pub target: Option<PlayerId>,
}

#[derive(Debug, Deserialize)]
pub struct NightActionRequest {
    #[serde(default)]
    pub targets: Vec<PlayerId>,
}

pub fn routes(state: AppState) -> Router {
    let authed = Router::new()
        // curl -X POST localhost:8080/api/sessions -H "Authorization: Bearer $TOKEN" -d '{"origin": 1}'
        .route("/", post(start_session))
        .nest(
            "/:origin",
            Router::new()
                .route("/join", post(join))
                .route("/leave", post(leave))
                .route("/start", post(start_now))
                .route("/cancel", post(cancel))
                // 役職選択
                .nest(
                    "/roles",
                    Router::new()
                        .route("/toggle", post(toggle_role))
                        .route("/confirm", post(confirm_roles))
                        .route("/cancel", post(cancel_selection)),
                )
                .nest(
                    "/actions",
                    Router::new()
                        .route("/vote", post(vote))
                        .route("/night", post(night_action)),
                ),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::auth_middleware,
        ));

    Router::new()
        // curl localhost:8080/api/sessions/1
        .route("/:origin", get(get_snapshot))
        // websocat ws://localhost:8080/api/sessions/1/ws
        .route("/:origin/ws", get(websocket::handler))
        .merge(authed)
        .with_state(state)
}

pub async fn start_session(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, SessionError> {
    let request = SessionRequest {
        origin: req.origin,
        initiator: actor.id,
        initiator_name: actor.name,
        player_hint: req.player_hint,
    };
    let handle = game_service::start_session(&state, request).await?;
    Ok((StatusCode::CREATED, Json(handle.snapshot())))
}

pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
) -> Result<impl IntoResponse, SessionError> {
    let snapshot = game_service::get_snapshot(&state, origin).await?;
    Ok(Json(snapshot))
}

async fn submit(
    state: &AppState,
    origin: ChannelId,
    event: SessionEvent,
) -> Result<StatusCode, SessionError> {
    game_service::submit(state, origin, event).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn join(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
    Extension(actor): Extension<Actor>,
) -> Result<StatusCode, SessionError> {
    let event = SessionEvent::Join {
        player: actor.id,
        name: actor.name,
    };
    submit(&state, origin, event).await
}

async fn leave(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
    Extension(actor): Extension<Actor>,
) -> Result<StatusCode, SessionError> {
    submit(&state, origin, SessionEvent::Leave { player: actor.id }).await
}

async fn start_now(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
    Extension(actor): Extension<Actor>,
) -> Result<StatusCode, SessionError> {
    submit(&state, origin, SessionEvent::StartNow { by: actor.id }).await
}

async fn cancel(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
    Extension(actor): Extension<Actor>,
) -> Result<StatusCode, SessionError> {
    let event = SessionEvent::Cancel {
        by: actor.id,
        operator: actor.operator,
    };
    submit(&state, origin, event).await
}

async fn toggle_role(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ToggleRoleRequest>,
) -> Result<StatusCode, SessionError> {
    let event = SessionEvent::ToggleRole {
        by: actor.id,
        role: req.role,
    };
    submit(&state, origin, event).await
}

async fn confirm_roles(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
    Extension(actor): Extension<Actor>,
) -> Result<StatusCode, SessionError> {
    submit(&state, origin, SessionEvent::ConfirmRoles { by: actor.id }).await
}

async fn cancel_selection(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
    Extension(actor): Extension<Actor>,
) -> Result<StatusCode, SessionError> {
    submit(&state, origin, SessionEvent::CancelSelection { by: actor.id }).await
}

async fn vote(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<VoteRequest>,
) -> Result<StatusCode, SessionError> {
    let target = req.target.map_or(VoteTarget::Abstain, VoteTarget::Player);
    let event = SessionEvent::Vote {
        voter: actor.id,
        target,
    };
    submit(&state, origin, event).await
}

async fn night_action(
    State(state): State<AppState>,
    Path(origin): Path<ChannelId>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<NightActionRequest>,
) -> Result<StatusCode, SessionError> {
    let event = SessionEvent::NightAction {
        actor: actor.id,
        targets: req.targets,
    };
    submit(&state, origin, event).await
}
