use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use werewolf_rules::{ActionError, ChannelId, Role, SetupError};

/// Failure talking to the entitlement store or the reward ledger.
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {key} has an invalid value: {value}")]
    Invalid { key: String, value: String },
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Why a session refused one submitted event. The session keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("only the session initiator can do that")]
    NotInitiator,
    #[error("not accepted during {0}")]
    NotAcceptedNow(&'static str),
    #[error("the lobby is full")]
    LobbyFull,
    #[error("already joined")]
    AlreadyJoined,
    #[error("not seated in this session")]
    NotSeated,
    #[error("{0} is not offered in this session")]
    RoleNotOffered(Role),
    #[error(transparent)]
    Setup(#[from] SetupError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a session is already running in channel {0}")]
    AlreadyRunning(ChannelId),
    #[error("no session in channel {0}")]
    NotFound(ChannelId),
    #[error("the session event queue is full")]
    QueueFull,
    #[error("the session has ended")]
    Closed,
    #[error(transparent)]
    Rejected(#[from] EventError),
    #[error(transparent)]
    Setup(#[from] SetupError),
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            SessionError::AlreadyRunning(_) => StatusCode::CONFLICT,
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::Closed => StatusCode::GONE,
            SessionError::Rejected(EventError::NotInitiator) => StatusCode::FORBIDDEN,
            SessionError::Rejected(_) | SessionError::Setup(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
