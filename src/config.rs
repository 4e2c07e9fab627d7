//! Environment-driven configuration. Every knob has the default the service
//! ships with; a `.env` file or real environment variables override them.

use std::path::PathBuf;

use time::Duration;

use crate::clock::TtlPolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub ttl: TtlPolicy,
    pub sweep_interval: std::time::Duration,
    pub empty_room_grace: Duration,
    pub limits: UploadLimits,
}

#[derive(Clone, Copy, Debug)]
pub struct UploadLimits {
    pub max_file_size: usize,
}

const DEFAULT_MAX_FILE_SIZE: usize = 100 * 1024 * 1024;

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            upload_dir: dotenv::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            ttl: TtlPolicy {
                message_expiry: Duration::seconds(env_i64("MESSAGE_EXPIRY_SECS", 3600)),
                user_timeout: Duration::seconds(env_i64("USER_TIMEOUT_SECS", 60)),
            },
            sweep_interval: std::time::Duration::from_secs(
                env_i64("SWEEP_INTERVAL_SECS", 30).max(1) as u64,
            ),
            empty_room_grace: Duration::seconds(env_i64("EMPTY_ROOM_GRACE_SECS", 300)),
            limits: UploadLimits {
                max_file_size: env_i64("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE as i64) as usize,
            },
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    match dotenv::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable config value, using default");
            default
        }),
        Err(_) => default,
    }
}
