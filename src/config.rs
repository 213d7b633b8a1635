//! Runtime configuration loaded from environment variables.
//!
//! Every knob has a default so the server starts with no environment at
//! all; unparsable values fall back to the default rather than failing.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 7001;
const DEFAULT_DATA_DIR: &str = "data/retro";
const DEFAULT_MAX_CLIENTS: usize = 20;
const DEFAULT_GRACE_PERIOD_SECS: u64 = 30;
const DEFAULT_REACTION_MS: u64 = 4000;
const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 2000;
const DEFAULT_ROOM_COMMAND_CAPACITY: usize = 256;
const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;

/// Per-room tuning shared by every room actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomConfig {
    /// Seats per room, counting seats held in the grace period.
    pub max_clients: usize,
    /// How long a voting-room seat survives an unexpected disconnect.
    pub grace_period: Duration,
    /// Lifetime of an emoji reaction status before it reverts.
    pub reaction_duration: Duration,
    /// Quiet interval after the last board mutation before a save.
    pub save_debounce: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS),
            reaction_duration: Duration::from_millis(DEFAULT_REACTION_MS),
            save_debounce: Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
        }
    }
}

impl RoomConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            max_clients: env_parse("MAX_CLIENTS", DEFAULT_MAX_CLIENTS),
            grace_period: Duration::from_secs(env_parse("GRACE_PERIOD_SECS", DEFAULT_GRACE_PERIOD_SECS)),
            reaction_duration: Duration::from_millis(env_parse("REACTION_MS", DEFAULT_REACTION_MS)),
            save_debounce: Duration::from_millis(env_parse("SAVE_DEBOUNCE_MS", DEFAULT_SAVE_DEBOUNCE_MS)),
        }
    }
}

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory holding one JSON snapshot per board room.
    pub data_dir: PathBuf,
    pub room: RoomConfig,
    /// Bounded queue depth for commands into one room actor.
    pub room_command_capacity: usize,
    /// Bounded queue depth for frames out to one connection.
    pub client_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            room: RoomConfig::default(),
            room_command_capacity: DEFAULT_ROOM_COMMAND_CAPACITY,
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            data_dir: std::env::var("DATA_DIR").map_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            room: RoomConfig::from_env(),
            room_command_capacity: env_parse("ROOM_COMMAND_CAPACITY", DEFAULT_ROOM_COMMAND_CAPACITY).max(1),
            client_channel_capacity: env_parse("CLIENT_CHANNEL_CAPACITY", DEFAULT_CLIENT_CHANNEL_CAPACITY).max(1),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
