use super::*;
use uuid::Uuid;

const LIFETIME: Duration = Duration::from_secs(4);

fn participant(status: Status) -> Participant {
    let mut p = Participant::new(Uuid::new_v4(), "Ada".to_owned(), 1);
    p.status = status;
    p
}

fn revert_key(p: &Participant) -> TimerKey {
    TimerKey::participant(p.session_id, TimerKind::Revert)
}

#[tokio::test(start_paused = true)]
async fn apply_sets_status_and_schedules_revert() {
    let mut reactions = Reactions::new();
    let mut timers = Scheduler::new();
    let mut p = participant(Status::Idle);
    let now = Instant::now();

    assert!(reactions.apply(&mut p, Status::Loved, now, LIFETIME, &mut timers));
    assert_eq!(p.status, Status::Loved);
    assert_eq!(timers.deadline(&revert_key(&p)), Some(now + LIFETIME));
}

#[tokio::test(start_paused = true)]
async fn reaction_during_ready_reverts_to_ready() {
    let mut reactions = Reactions::new();
    let mut timers = Scheduler::new();
    let mut p = participant(Status::Ready);

    reactions.apply(&mut p, Status::Praised, Instant::now(), LIFETIME, &mut timers);
    assert!(reactions.revert(&mut p));
    assert_eq!(p.status, Status::Ready);
}

#[tokio::test(start_paused = true)]
async fn second_reaction_replaces_first_and_restarts_timer() {
    let mut reactions = Reactions::new();
    let mut timers = Scheduler::new();
    let mut p = participant(Status::Ready);
    let start = Instant::now();

    reactions.apply(&mut p, Status::Loved, start, LIFETIME, &mut timers);
    let later = start + Duration::from_secs(2);
    reactions.apply(&mut p, Status::Booed, later, LIFETIME, &mut timers);

    assert_eq!(p.status, Status::Booed);
    assert_eq!(timers.len(), 1);
    assert_eq!(timers.deadline(&revert_key(&p)), Some(later + LIFETIME));
    assert_eq!(reactions.underlying(&p), Status::Ready);
}

#[tokio::test(start_paused = true)]
async fn disconnected_participant_is_never_overridden() {
    let mut reactions = Reactions::new();
    let mut timers = Scheduler::new();
    let mut p = participant(Status::Disconnected);

    assert!(!reactions.apply(&mut p, Status::Fire, Instant::now(), LIFETIME, &mut timers));
    assert_eq!(p.status, Status::Disconnected);
    assert!(timers.is_empty());
}

#[test]
fn revert_leaves_status_changed_by_other_means() {
    let mut reactions = Reactions::new();
    let mut p = participant(Status::Deciding);

    assert!(!reactions.revert(&mut p));
    assert_eq!(p.status, Status::Deciding);
}

#[test]
fn underlying_defaults_to_idle_without_memory() {
    let reactions = Reactions::new();
    let p = participant(Status::Pooped);
    assert_eq!(reactions.underlying(&p), Status::Idle);
}

#[tokio::test(start_paused = true)]
async fn release_cancels_revert_and_forgets_previous() {
    let mut reactions = Reactions::new();
    let mut timers = Scheduler::new();
    let mut p = participant(Status::Ready);

    reactions.apply(&mut p, Status::Partying, Instant::now(), LIFETIME, &mut timers);
    reactions.release(p.session_id, &mut timers);

    assert!(timers.is_empty());
    assert_eq!(reactions.underlying(&p), Status::Idle);
}
