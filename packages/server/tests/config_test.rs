use serial_test::serial;
use std::env;
use std::time::Duration;
use werewolf_rules::{ChannelId, PlayerId, Role};
use werewolf_server::{
    error::ConfigError, models::config::GameConfig, utils::config::ServerConfig,
};

fn clear(keys: &[&str]) {
    for key in keys {
        env::remove_var(key);
    }
}

const SERVER_KEYS: &[&str] = &[
    "JWT_SECRET",
    "SERVER_ADDR",
    "CORS_ORIGIN",
    "SUPABASE_URL",
    "SUPABASE_KEY",
    "WEREWOLF_OPERATORS",
];

const GAME_KEYS: &[&str] = &[
    "WEREWOLF_JOIN_SECONDS",
    "WEREWOLF_MIN_PLAYERS",
    "WEREWOLF_THRESHOLD_HUNTER",
    "WEREWOLF_VOICE_CHANNEL",
    "WEREWOLF_PAUSE_LYNCH_MS",
    "WEREWOLF_WOLF_DEN_NAME",
    "WEREWOLF_SHOW_PLAYER_ROLES",
];

#[test]
#[serial]
fn server_config_requires_a_jwt_secret() {
    clear(SERVER_KEYS);
    assert_eq!(
        ServerConfig::from_env().unwrap_err(),
        ConfigError::Missing("JWT_SECRET")
    );
}

#[test]
#[serial]
fn server_config_reads_supabase_and_operators() {
    clear(SERVER_KEYS);
    env::set_var("JWT_SECRET", "s3cret");
    env::set_var("SERVER_ADDR", "0.0.0.0:9000");
    env::set_var("SUPABASE_URL", "https://example.supabase.co/");
    env::set_var("SUPABASE_KEY", "key");
    env::set_var("WEREWOLF_OPERATORS", "5, 6");

    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config.bind_addr.port(), 9000);
    let supabase = config.supabase.unwrap();
    assert_eq!(supabase.url, "https://example.supabase.co");
    assert!(config.operators.contains(&PlayerId(5)));
    assert!(config.operators.contains(&PlayerId(6)));
    clear(SERVER_KEYS);
}

#[test]
#[serial]
fn half_configured_supabase_is_an_error() {
    clear(SERVER_KEYS);
    env::set_var("JWT_SECRET", "s3cret");
    env::set_var("SUPABASE_URL", "https://example.supabase.co");
    assert_eq!(
        ServerConfig::from_env().unwrap_err(),
        ConfigError::Missing("SUPABASE_KEY")
    );
    clear(SERVER_KEYS);
}

#[test]
#[serial]
fn game_config_overrides_from_env() {
    clear(GAME_KEYS);
    env::set_var("WEREWOLF_JOIN_SECONDS", "15");
    env::set_var("WEREWOLF_MIN_PLAYERS", "5");
    env::set_var("WEREWOLF_THRESHOLD_HUNTER", "8");
    env::set_var("WEREWOLF_VOICE_CHANNEL", "321");
    env::set_var("WEREWOLF_PAUSE_LYNCH_MS", "1500");
    env::set_var("WEREWOLF_WOLF_DEN_NAME", "lair");
    env::set_var("WEREWOLF_SHOW_PLAYER_ROLES", "true");

    let config = GameConfig::from_env();
    assert_eq!(config.join_duration, Duration::from_secs(15));
    assert_eq!(config.limits.min, 5);
    assert_eq!(config.thresholds.threshold(Role::Hunter), Some(8));
    assert_eq!(config.voice_channel, Some(ChannelId(321)));
    assert_eq!(config.narration.lynch_pause, Duration::from_millis(1500));
    assert_eq!(config.space_names.wolf_den, "lair");
    assert!(config.show_player_roles);
    assert!(config.validate().is_ok());
    clear(GAME_KEYS);
}

#[test]
#[serial]
fn invalid_game_values_fall_back_to_defaults() {
    clear(GAME_KEYS);
    env::set_var("WEREWOLF_JOIN_SECONDS", "soon");
    env::set_var("WEREWOLF_MIN_PLAYERS", "-1");

    let config = GameConfig::from_env();
    let defaults = GameConfig::default();
    assert_eq!(config.join_duration, defaults.join_duration);
    assert_eq!(config.limits.min, defaults.limits.min);
    clear(GAME_KEYS);
}
