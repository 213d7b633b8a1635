//! Room engine services used by the websocket route.
//!
//! ARCHITECTURE
//! ============
//! `room` is the synchronous core: one `Room` value per live room, mutated
//! one command at a time. The leaf modules (`identity`, `reaction`,
//! `board`, `session`) hold the rules it composes. `actor` wraps a `Room`
//! in a tokio task and owns its connections and timers; `persistence` is
//! the only module that touches the filesystem.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod actor;
pub mod board;
pub mod identity;
pub mod persistence;
pub mod reaction;
pub mod room;
pub mod session;

/// Grepable error code and retryable flag for error messages sent to clients.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Current time as milliseconds since Unix epoch.
pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}
