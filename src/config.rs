#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub session_id: String,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let session_id = std::env::var("AURA_SESSION_ID")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            log_level,
            session_id,
        }
    }
}
