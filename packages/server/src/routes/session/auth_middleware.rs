use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde_json::json;
use werewolf_rules::PlayerId;

use crate::{state::AppState, utils::auth::verify_token};

/// The authenticated caller of a session route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: PlayerId,
    pub name: String,
    pub operator: bool,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned)
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "認証が必要です" })),
            )
        })?;

    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "無効なトークンです" })),
        )
    };
    let claims = verify_token(&token, &state.server_config.jwt_secret).map_err(|_| invalid())?;
    let id = claims.player_id().map_err(|_| invalid())?;

    let actor = Actor {
        id,
        name: claims.name.unwrap_or_else(|| format!("player-{}", id)),
        operator: state.server_config.is_operator(id),
    };
    request.extensions_mut().insert(actor);

    Ok(next.run(request).await)
}
