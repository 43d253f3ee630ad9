use std::env;
use std::str::FromStr;
use std::time::Duration;
use werewolf_rules::{ChannelId, NarrationTiming, PlayerLimits, Role, RoleThresholds};

use crate::error::ConfigError;

/// Names given to the spaces a session provisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceNames {
    pub village: String,
    pub wolf_den: String,
    pub voice: String,
}

impl Default for SpaceNames {
    fn default() -> Self {
        Self {
            village: "werewolf-village".to_string(),
            wolf_den: "wolf-den".to_string(),
            voice: "Werewolf Village".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub limits: PlayerLimits,
    pub join_duration: Duration,
    pub selection_duration: Duration,
    // 夜の各サブステップごとの締め切り
    pub night_duration: Duration,
    pub discussion_duration: Duration,
    pub vote_duration: Duration,
    pub reactive_duration: Duration,
    pub thresholds: RoleThresholds,
    pub narration: NarrationTiming,
    pub space_names: SpaceNames,
    /// Pre-existing voice space renamed for the game instead of creating one.
    pub voice_channel: Option<ChannelId>,
    pub reward_amount: i64,
    pub provision_attempts: u32,
    pub provision_backoff: Duration,
    pub queue_capacity: usize,
    pub seed: Option<u64>,
    // スナップショットに全員の役職を含めるかどうか
    pub show_player_roles: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            limits: PlayerLimits::default(),
            join_duration: Duration::from_secs(60),
            selection_duration: Duration::from_secs(120),
            night_duration: Duration::from_secs(60),
            discussion_duration: Duration::from_secs(90),
            vote_duration: Duration::from_secs(60),
            reactive_duration: Duration::from_secs(30),
            thresholds: RoleThresholds::default(),
            narration: NarrationTiming::default(),
            space_names: SpaceNames::default(),
            voice_channel: None,
            reward_amount: 100,
            provision_attempts: 3,
            provision_backoff: Duration::from_millis(250),
            queue_capacity: 64,
            seed: None,
            show_player_roles: false,
        }
    }
}

/// Unset keys fall back to `default`. Unparseable values are logged and also fall back.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("ignoring invalid value {:?} for {}", raw, key);
            default
        }),
        Err(_) => default,
    }
}

fn parse_opt<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring invalid value {:?} for {}", raw, key);
            None
        }
    }
}

fn seconds(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_or(key, default.as_secs()))
}

fn millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(parse_or(key, default.as_millis() as u64))
}

impl GameConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let limits = PlayerLimits {
            min: parse_or("WEREWOLF_MIN_PLAYERS", defaults.limits.min),
            max: parse_or("WEREWOLF_MAX_PLAYERS", defaults.limits.max),
        };

        let mut thresholds = defaults.thresholds.clone();
        for role in Role::OPTIONAL {
            let key = format!("WEREWOLF_THRESHOLD_{}", role.name().to_uppercase());
            if let Some(min_players) = parse_opt::<usize>(&key) {
                thresholds = thresholds.with_threshold(role, min_players);
            }
        }

        let base = defaults.narration.clone();
        let narration = NarrationTiming {
            chars_per_second: parse_or("WEREWOLF_NARRATION_CPS", base.chars_per_second),
            min_duration: seconds("WEREWOLF_NARRATION_MIN_SECONDS", base.min_duration),
            buffer: millis("WEREWOLF_NARRATION_BUFFER_MS", base.buffer),
            char_ceiling: parse_or("WEREWOLF_NARRATION_CEILING", base.char_ceiling),
            morning_pause: millis("WEREWOLF_PAUSE_MORNING_MS", base.morning_pause),
            victim_pause: millis("WEREWOLF_PAUSE_VICTIM_MS", base.victim_pause),
            no_victim_pause: millis("WEREWOLF_PAUSE_NO_VICTIM_MS", base.no_victim_pause),
            lynch_pause: millis("WEREWOLF_PAUSE_LYNCH_MS", base.lynch_pause),
        };

        let names = defaults.space_names.clone();
        let space_names = SpaceNames {
            village: env::var("WEREWOLF_VILLAGE_NAME").unwrap_or(names.village),
            wolf_den: env::var("WEREWOLF_WOLF_DEN_NAME").unwrap_or(names.wolf_den),
            voice: env::var("WEREWOLF_VOICE_NAME").unwrap_or(names.voice),
        };

        Self {
            limits,
            join_duration: seconds("WEREWOLF_JOIN_SECONDS", defaults.join_duration),
            selection_duration: seconds("WEREWOLF_SELECTION_SECONDS", defaults.selection_duration),
            night_duration: seconds("WEREWOLF_NIGHT_SECONDS", defaults.night_duration),
            discussion_duration: seconds(
                "WEREWOLF_DISCUSSION_SECONDS",
                defaults.discussion_duration,
            ),
            vote_duration: seconds("WEREWOLF_VOTE_SECONDS", defaults.vote_duration),
            reactive_duration: seconds("WEREWOLF_REACTIVE_SECONDS", defaults.reactive_duration),
            thresholds,
            narration,
            space_names,
            voice_channel: parse_opt::<u64>("WEREWOLF_VOICE_CHANNEL").map(ChannelId),
            reward_amount: parse_or("WEREWOLF_REWARD_WIN", defaults.reward_amount),
            provision_attempts: parse_or("WEREWOLF_PROVISION_ATTEMPTS", defaults.provision_attempts),
            provision_backoff: millis("WEREWOLF_PROVISION_BACKOFF_MS", defaults.provision_backoff),
            queue_capacity: parse_or("WEREWOLF_QUEUE_CAPACITY", defaults.queue_capacity),
            seed: parse_opt("WEREWOLF_SEED"),
            show_player_roles: env::var("WEREWOLF_SHOW_PLAYER_ROLES")
                .map(|v| v == "true")
                .unwrap_or(defaults.show_player_roles),
        }
    }

    /// Reject combinations no session could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.min == 0 || self.limits.min > self.limits.max {
            return Err(ConfigError::Inconsistent(format!(
                "player limits {}..={} are empty",
                self.limits.min, self.limits.max
            )));
        }
        if self.provision_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "WEREWOLF_PROVISION_ATTEMPTS".to_string(),
                value: "0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "WEREWOLF_QUEUE_CAPACITY".to_string(),
                value: "0".to_string(),
            });
        }
        if !(self.narration.chars_per_second > 0.0) {
            return Err(ConfigError::Invalid {
                key: "WEREWOLF_NARRATION_CPS".to_string(),
                value: self.narration.chars_per_second.to_string(),
            });
        }
        Ok(())
    }
}
