use std::{env, path::PathBuf};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_path: PathBuf,
    pub session_path: PathBuf,
    pub blob_dir: PathBuf,
    /// How often clients are told to re-fetch the feed.
    pub poll_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parse_env("PORT").unwrap_or(DEFAULT_PORT),
            data_path: path_env("APP_DATA_PATH", "data/state.json"),
            session_path: path_env("APP_SESSION_PATH", "data/sessions.json"),
            blob_dir: path_env("APP_BLOB_DIR", "data/blobs"),
            poll_interval_secs: parse_env("APP_POLL_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_path: PathBuf::from("data/state.json"),
            session_path: PathBuf::from("data/sessions.json"),
            blob_dir: PathBuf::from("data/blobs"),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

fn path_env(key: &str, fallback: &str) -> PathBuf {
    match env::var(key) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(fallback),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse::<T>().ok())
}
