//! Server configuration from environment variables

use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAILBOX_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `FITCOACH_DB_PATH`
    pub db_path: PathBuf,
    /// `FITCOACH_PORT`
    pub port: u16,
    /// `FITCOACH_MAILBOX_CAPACITY`: events queued per user before senders wait
    pub mailbox_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparsable values fall back to defaults
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("FITCOACH_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".fitcoach").join("fitcoach.db")
            },
            PathBuf::from,
        );

        let port = lookup("FITCOACH_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let mailbox_capacity = lookup("FITCOACH_MAILBOX_CAPACITY")
            .and_then(|c| c.parse().ok())
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_MAILBOX_CAPACITY);

        Self {
            db_path,
            port,
            mailbox_capacity,
        }
    }
}
