use dotenvy::dotenv;
use std::sync::Once;

static INIT: Once = Once::new();

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";

pub fn setup_test_env() {
    INIT.call_once(|| {
        dotenv().ok();
        if std::env::var("JWT_SECRET").is_err() {
            std::env::set_var("JWT_SECRET", TEST_JWT_SECRET);
        }
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}
