use std::collections::BTreeSet;
use std::env;
use std::net::SocketAddr;
use werewolf_rules::PlayerId;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub cors_origin: String,
    /// Entitlements and rewards go to Supabase when set, otherwise to in-process stand-ins.
    pub supabase: Option<SupabaseConfig>,
    /// Users allowed to cancel a lobby they did not start.
    pub operators: BTreeSet<PlayerId>,
}

impl ServerConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            jwt_secret: jwt_secret.into(),
            cors_origin: "http://localhost:3000".to_string(),
            supabase: None,
            operators: BTreeSet::new(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        let mut config = Self::new(jwt_secret);

        if let Ok(raw) = env::var("SERVER_ADDR") {
            config.bind_addr = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "SERVER_ADDR".to_string(),
                value: raw.clone(),
            })?;
        }
        if let Ok(origin) = env::var("CORS_ORIGIN") {
            config.cors_origin = origin;
        }

        config.supabase = match (env::var("SUPABASE_URL").ok(), env::var("SUPABASE_KEY").ok()) {
            (Some(url), Some(key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                key,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("SUPABASE_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("SUPABASE_URL")),
        };

        if let Ok(raw) = env::var("WEREWOLF_OPERATORS") {
            config.operators = parse_operators(&raw)?;
        }
        Ok(config)
    }

    pub fn is_operator(&self, user: PlayerId) -> bool {
        self.operators.contains(&user)
    }
}

fn parse_operators(raw: &str) -> Result<BTreeSet<PlayerId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map(PlayerId)
                .map_err(|_| ConfigError::Invalid {
                    key: "WEREWOLF_OPERATORS".to_string(),
                    value: s.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_are_comma_separated_ids() {
        let ops = parse_operators(" 12, 34 ,,").unwrap();
        assert_eq!(ops.into_iter().collect::<Vec<_>>(), vec![PlayerId(12), PlayerId(34)]);
    }

    #[test]
    fn non_numeric_operator_is_rejected() {
        assert!(matches!(
            parse_operators("12,bob"),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
