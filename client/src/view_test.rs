use std::sync::{Arc, Mutex};

use frames::Status;

use super::*;

fn person(id: &str, name: &str) -> ParticipantView {
    ParticipantView {
        id: id.into(),
        name: name.into(),
        avatar: 1,
        vote: String::new(),
        voted: false,
        status: Status::Idle,
        disconnected_at: 0,
    }
}

fn snapshot(participants: Vec<ParticipantView>) -> RoomSnapshot {
    RoomSnapshot {
        room_id: "sprint-1".into(),
        kind: RoomKind::Scrum,
        revealed: false,
        participants,
        columns: Vec::new(),
    }
}

fn recorder(view: &mut RoomView) -> Arc<Mutex<Vec<ViewEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    view.subscribe(move |event| sink.lock().expect("lock").push(event.clone()));
    seen
}

fn drain(seen: &Arc<Mutex<Vec<ViewEvent>>>) -> Vec<ViewEvent> {
    std::mem::take(&mut *seen.lock().expect("lock"))
}

fn peer_joins(events: &[ViewEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ViewEvent::PeerJoined(p) => Some(p.name.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn initial_load_adds_everyone_without_join_notifications() {
    let mut view = RoomView::new();
    let seen = recorder(&mut view);

    view.apply_joined("a", snapshot(vec![person("b", "Bob"), person("c", "Cy"), person("a", "Ada")]));

    let events = drain(&seen);
    assert_eq!(events.iter().filter(|e| matches!(e, ViewEvent::Added(_))).count(), 3);
    assert!(peer_joins(&events).is_empty());
    assert_eq!(view.me().map(|p| p.name.as_str()), Some("Ada"));
    assert_eq!(view.kind(), Some(RoomKind::Scrum));
}

#[test]
fn later_arrival_is_announced_once() {
    let mut view = RoomView::new();
    view.apply_joined("a", snapshot(vec![person("a", "Ada")]));
    let seen = recorder(&mut view);

    view.apply_state(snapshot(vec![person("a", "Ada"), person("b", "Bob")]));
    view.apply_state(snapshot(vec![person("a", "Ada"), person("b", "Bob")]));

    assert_eq!(
        drain(&seen),
        vec![ViewEvent::Added(person("b", "Bob")), ViewEvent::PeerJoined(person("b", "Bob"))]
    );
}

#[test]
fn departure_emits_removed_and_peer_left() {
    let mut view = RoomView::new();
    view.apply_joined("a", snapshot(vec![person("a", "Ada"), person("b", "Bob")]));
    let seen = recorder(&mut view);

    view.apply_state(snapshot(vec![person("a", "Ada")]));

    assert_eq!(
        drain(&seen),
        vec![ViewEvent::Removed(person("b", "Bob")), ViewEvent::PeerLeft(person("b", "Bob"))]
    );
    assert!(view.participant("b").is_none());
}

#[test]
fn local_participant_never_triggers_notifications() {
    let mut view = RoomView::new();
    view.apply_joined("a", snapshot(vec![person("b", "Bob")]));
    let seen = recorder(&mut view);

    view.apply_state(snapshot(vec![person("b", "Bob"), person("a", "Ada")]));
    view.apply_state(snapshot(vec![person("b", "Bob")]));

    let events = drain(&seen);
    assert!(!events.iter().any(|e| matches!(e, ViewEvent::PeerJoined(_) | ViewEvent::PeerLeft(_))));
    assert_eq!(events.len(), 2);
}

#[test]
fn field_change_emits_changed_with_both_sides() {
    let mut view = RoomView::new();
    view.apply_joined("a", snapshot(vec![person("a", "Ada"), person("b", "Bob")]));
    let seen = recorder(&mut view);

    let mut voted = person("b", "Bob");
    voted.voted = true;
    voted.status = Status::Ready;
    view.apply_state(snapshot(vec![person("a", "Ada"), voted.clone()]));

    assert_eq!(drain(&seen), vec![ViewEvent::Changed { before: person("b", "Bob"), after: voted }]);
}

#[test]
fn join_order_is_preserved_across_updates() {
    let mut view = RoomView::new();
    view.apply_joined("a", snapshot(vec![person("a", "Ada"), person("b", "Bob"), person("c", "Cy")]));
    view.apply_state(snapshot(vec![person("a", "Ada"), person("c", "Cy"), person("d", "Dee")]));

    let names: Vec<&str> = view.participants().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Ada", "Cy", "Dee"]);
}

#[test]
fn reveal_and_board_changes_are_reported() {
    let mut view = RoomView::new();
    view.apply_joined("a", snapshot(vec![person("a", "Ada")]));
    let seen = recorder(&mut view);

    let mut next = snapshot(vec![person("a", "Ada")]);
    next.revealed = true;
    next.columns = vec![ColumnView { id: "went-well".into(), title: "What went well".into(), order: 0, items: vec![] }];
    view.apply_state(next);

    assert_eq!(drain(&seen), vec![ViewEvent::Revealed(true), ViewEvent::BoardChanged]);
    assert!(view.revealed());
    assert_eq!(view.columns().len(), 1);
}

#[test]
fn rejoin_snapshot_does_not_reannounce() {
    let mut view = RoomView::new();
    view.apply_joined("a", snapshot(vec![person("a", "Ada"), person("b", "Bob")]));
    let seen = recorder(&mut view);

    view.apply_joined("a", snapshot(vec![person("a", "Ada"), person("b", "Bob"), person("c", "Cy")]));

    let events = drain(&seen);
    assert_eq!(events, vec![ViewEvent::Added(person("c", "Cy"))]);
}

#[test]
fn unsubscribed_observer_hears_nothing() {
    let mut view = RoomView::new();
    let seen = Arc::new(Mutex::new(0_usize));
    let sink = Arc::clone(&seen);
    let id = view.subscribe(move |_| *sink.lock().expect("lock") += 1);

    assert!(view.unsubscribe(id));
    assert!(!view.unsubscribe(id));
    view.apply_joined("a", snapshot(vec![person("a", "Ada")]));
    assert_eq!(*seen.lock().expect("lock"), 0);
}

#[test]
fn clear_forgets_room_but_keeps_subscribers() {
    let mut view = RoomView::new();
    let seen = recorder(&mut view);
    view.apply_joined("a", snapshot(vec![person("a", "Ada")]));
    view.clear();
    drain(&seen);

    assert!(view.is_empty());
    assert!(view.local_id().is_none());
    view.apply_joined("a", snapshot(vec![person("a", "Ada")]));
    assert_eq!(drain(&seen), vec![ViewEvent::Added(person("a", "Ada"))]);
}

#[test]
fn find_by_name_matches_exactly() {
    let mut view = RoomView::new();
    view.apply_joined("a", snapshot(vec![person("a", "Ada"), person("b", "Bob")]));
    assert_eq!(view.find_by_name("Bob").map(|p| p.id.as_str()), Some("b"));
    assert!(view.find_by_name("bob").is_none());
}
