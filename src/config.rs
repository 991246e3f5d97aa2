use crate::logging::LogFormat;
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_STORAGE_KEY: &str = "kasthuri_data";
pub const DEFAULT_ADMIN_EMAIL: &str = "vinovator@gmail.com";
pub const DEFAULT_HEAD_TEACHER_EMAIL: &str = "sowbhakyarajabojan@gmail.com";
pub const DEFAULT_PASSWORD: &str = "password123";

#[derive(Debug, Parser)]
#[command(name = "studiod", version, about = "Dance school state store sidecar")]
pub struct Cli {
    /// Open this workspace directory at startup instead of waiting for `workspace.select`.
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). `STUDIOD_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

/// Business constants of the store. Reserved emails decide which
/// self-registrations receive elevated roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub storage_key: String,
    pub admin_email: String,
    pub head_teacher_email: String,
    pub default_password: String,
    pub min_password_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            head_teacher_email: DEFAULT_HEAD_TEACHER_EMAIL.to_string(),
            default_password: DEFAULT_PASSWORD.to_string(),
            min_password_len: 6,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_non_empty("STUDIOD_ADMIN_EMAIL") {
            cfg.admin_email = v.to_lowercase();
        }
        if let Some(v) = env_non_empty("STUDIOD_HEAD_TEACHER_EMAIL") {
            cfg.head_teacher_email = v.to_lowercase();
        }
        if let Some(v) = env_non_empty("STUDIOD_DEFAULT_PASSWORD") {
            cfg.default_password = v;
        }
        cfg
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
