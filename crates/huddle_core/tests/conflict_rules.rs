use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use huddle_core::db::{open_db, open_db_in_memory};
use huddle_core::{
    has_conflict, Clock, CreateMeetingRequest, Meeting, MeetingService, MeetingUpdate,
    ScheduleError, SqliteMeetingRepository, UserId,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use uuid::Uuid;

/// Pinned "now" so the past/future boundary is deterministic.
struct FixedClock(NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, day).unwrap()
}

fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn now() -> NaiveDateTime {
    date(1).and_time(time(10, 0))
}

fn service(
    conn: &rusqlite::Connection,
) -> MeetingService<SqliteMeetingRepository<'_>, FixedClock> {
    let repo = SqliteMeetingRepository::try_new(conn).unwrap();
    MeetingService::with_clock(repo, FixedClock(now()))
}

fn request(
    organizer: UserId,
    participants: &[UserId],
    day: u32,
    start: (u32, u32),
    duration_minutes: i64,
) -> CreateMeetingRequest {
    CreateMeetingRequest {
        organizer,
        title: "sync".to_string(),
        description: None,
        date: date(day),
        start_time: time(start.0, start.1),
        duration_minutes,
        participants: participants.iter().copied().collect(),
    }
}

#[test]
fn overlapping_meeting_for_shared_participant_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let organizer = Uuid::new_v4();
    let busy = Uuid::new_v4();
    service
        .create_meeting(&request(organizer, &[busy], 2, (14, 0), 60))
        .unwrap();

    let other_organizer = Uuid::new_v4();
    let err = service
        .create_meeting(&request(other_organizer, &[busy], 2, (14, 30), 30))
        .unwrap_err();
    match err {
        ScheduleError::Conflict { participant, .. } => assert_eq!(participant, busy),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(format!("{}", ScheduleError::Conflict { participant: busy, meeting: Uuid::new_v4() }),
        format!("participant {busy} has a conflicting meeting"));
}

#[test]
fn back_to_back_meetings_are_allowed() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let organizer = Uuid::new_v4();
    let participant = Uuid::new_v4();
    service
        .create_meeting(&request(organizer, &[participant], 2, (14, 0), 60))
        .unwrap();

    service
        .create_meeting(&request(organizer, &[participant], 2, (15, 0), 30))
        .unwrap();
}

#[test]
fn organizer_schedule_is_checked_even_without_explicit_participants() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let organizer = Uuid::new_v4();
    service
        .create_meeting(&request(organizer, &[], 2, (9, 0), 60))
        .unwrap();

    let err = service
        .create_meeting(&request(organizer, &[], 2, (9, 30), 60))
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::Conflict { participant, .. } if participant == organizer
    ));
}

#[test]
fn conflict_rejection_leaves_no_partial_writes() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let organizer = Uuid::new_v4();
    let free = Uuid::new_v4();
    let busy = Uuid::new_v4();
    service
        .create_meeting(&request(Uuid::new_v4(), &[busy], 2, (11, 0), 60))
        .unwrap();

    service
        .create_meeting(&request(organizer, &[free, busy], 2, (11, 30), 30))
        .unwrap_err();

    assert!(service.meetings_for_user(free).unwrap().is_empty());
    assert!(service.meetings_for_user(organizer).unwrap().is_empty());
}

#[test]
fn editing_a_meeting_does_not_conflict_with_itself() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let organizer = Uuid::new_v4();
    let created = service
        .create_meeting(&request(organizer, &[Uuid::new_v4()], 2, (14, 0), 60))
        .unwrap();

    // Unchanged slot, new title: must not report a conflict against itself.
    let updated = service
        .update_meeting(
            huddle_core::Actor::member(organizer),
            created.uuid,
            &MeetingUpdate {
                title: Some("renamed sync".to_string()),
                ..MeetingUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.title, "renamed sync");
    assert_eq!(updated.date, created.date);
}

#[test]
fn meeting_crossing_midnight_conflicts_with_next_day_morning() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let participant = Uuid::new_v4();
    service
        .create_meeting(&request(Uuid::new_v4(), &[participant], 2, (23, 30), 120))
        .unwrap();

    let err = service
        .create_meeting(&request(Uuid::new_v4(), &[participant], 3, (0, 30), 30))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::Conflict { .. }));

    // After the spill-over ends the morning is free again.
    service
        .create_meeting(&request(Uuid::new_v4(), &[participant], 3, (1, 30), 30))
        .unwrap();
}

#[test]
fn creating_on_a_past_date_fails() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let mut yesterday = request(Uuid::new_v4(), &[], 1, (12, 0), 30);
    yesterday.date = date(1).pred_opt().unwrap();
    let err = service.create_meeting(&yesterday).unwrap_err();
    assert!(matches!(err, ScheduleError::PastDate(_)));
}

#[test]
fn creating_today_before_current_time_fails() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    // Clock is pinned at 10:00 on day 1.
    let err = service
        .create_meeting(&request(Uuid::new_v4(), &[], 1, (9, 0), 30))
        .unwrap_err();
    assert!(matches!(err, ScheduleError::PastStart(_)));

    service
        .create_meeting(&request(Uuid::new_v4(), &[], 1, (10, 0), 30))
        .unwrap();
}

#[test]
fn has_conflict_reports_overlap_and_honors_exclusion() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let participant = Uuid::new_v4();

    let created = service
        .create_meeting(&request(Uuid::new_v4(), &[participant], 2, (14, 0), 60))
        .unwrap();

    let repo = SqliteMeetingRepository::try_new(&conn).unwrap();
    assert!(has_conflict(&repo, participant, date(2), time(14, 30), 30, None).unwrap());
    assert!(!has_conflict(&repo, participant, date(2), time(15, 0), 30, None).unwrap());
    assert!(
        !has_conflict(&repo, participant, date(2), time(14, 30), 30, Some(created.uuid)).unwrap()
    );
}

#[test]
fn concurrent_overlapping_creates_cannot_both_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedule.db");
    // Migrate once up front so both writer threads start from a ready file.
    drop(open_db(&path).unwrap());

    for round in 0..8 {
        let participant = Uuid::new_v4();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [(14u32, 0u32), (14, 30)]
            .into_iter()
            .map(|start| {
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                std::thread::spawn(move || {
                    // Each writer gets its own connection to the shared file,
                    // so nothing in-process serializes the two creates.
                    let conn = open_db(&path).unwrap();
                    let repo = SqliteMeetingRepository::try_new(&conn).unwrap();
                    let service = MeetingService::with_clock(repo, FixedClock(now()));
                    let request = request(Uuid::new_v4(), &[participant], 2, start, 60);
                    barrier.wait();
                    service.create_meeting(&request).is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(
            successes, 1,
            "round {round}: exactly one of two overlapping creates may win"
        );
    }
}

#[test]
fn persisted_meetings_never_overlap_for_a_shared_participant() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let participant = Uuid::new_v4();

    // Deterministic pseudo-random slots; collisions are expected and must
    // all be rejected, leaving only pairwise disjoint intervals behind.
    let mut state: u64 = 0x5eed;
    let mut next = || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 33) as i64
    };

    let mut accepted: Vec<Meeting> = Vec::new();
    for _ in 0..120 {
        let day = 2 + (next().rem_euclid(3)) as u32;
        let start_minute = next().rem_euclid(24 * 60 - 1);
        let duration = 10 + next().rem_euclid(180);
        let request = CreateMeetingRequest {
            organizer: Uuid::new_v4(),
            title: "generated".to_string(),
            description: None,
            date: date(day),
            start_time: NaiveTime::from_num_seconds_from_midnight_opt(
                (start_minute * 60) as u32,
                0,
            )
            .unwrap(),
            duration_minutes: duration,
            participants: BTreeSet::from([participant]),
        };
        if let Ok(meeting) = service.create_meeting(&request) {
            accepted.push(meeting);
        }
    }

    assert!(accepted.len() > 1, "generator produced no accepted meetings");
    for (index, first) in accepted.iter().enumerate() {
        for second in &accepted[index + 1..] {
            let disjoint =
                first.end_at() <= second.start_at() || second.end_at() <= first.start_at();
            assert!(
                disjoint,
                "meetings {} and {} overlap: {}..{} vs {}..{}",
                first.uuid,
                second.uuid,
                first.start_at(),
                first.end_at(),
                second.start_at(),
                second.end_at()
            );
        }
    }
}
