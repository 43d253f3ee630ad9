use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use werewolf_rules::PlayerId;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Platform user id, as a decimal string.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn player_id(&self) -> Result<PlayerId, AuthError> {
        self.sub
            .parse::<u64>()
            .map(PlayerId)
            .map_err(|_| AuthError::InvalidSubject)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to create token")]
    TokenCreation,
    #[error("failed to validate token")]
    TokenValidation,
    #[error("token subject is not a user id")]
    InvalidSubject,
}

pub fn create_token(user: PlayerId, name: Option<&str>, secret: &str) -> Result<String, AuthError> {
    let now = Utc::now();
    let iat = now.timestamp() as usize;
    let exp = (now + Duration::hours(24)).timestamp() as usize;
    let claims = Claims {
        sub: user.to_string(),
        name: name.map(str::to_string),
        exp,
        iat,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::TokenCreation)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AuthError::TokenValidation)?;

    Ok(token_data.claims)
}
