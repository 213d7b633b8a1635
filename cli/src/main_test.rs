use super::*;

#[test]
fn lost_connection_keeps_session_open_for_retry() {
    assert!(session_open(ConnectionState::Disconnected, true));
    assert!(!session_open(ConnectionState::Disconnected, false));
}

#[test]
fn live_connection_outlasts_closed_stdin() {
    assert!(session_open(ConnectionState::Reconnecting, false));
    assert!(session_open(ConnectionState::Connected, false));
}
