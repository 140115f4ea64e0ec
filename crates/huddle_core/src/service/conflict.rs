//! Schedule conflict detection.
//!
//! # Responsibility
//! - Decide whether a candidate slot overlaps any existing meeting of a
//!   participant.
//!
//! # Invariants
//! - Slots are half-open `[start, end)` on the naive local timeline, so
//!   back-to-back meetings never conflict.
//! - Checking has no side effects.

use crate::model::actor::UserId;
use crate::model::meeting::{Meeting, MeetingId};
use crate::repo::meeting_repo::{MeetingRepository, RepoResult};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

/// Half-open time slot on the naive local timeline.
///
/// Built from `date + start_time`, so a slot may legitimately end on the
/// day after it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Slot {
    /// Builds a slot from the calendar parts a meeting is stored with.
    pub fn from_parts(date: NaiveDate, start_time: NaiveTime, duration_minutes: i64) -> Self {
        let start = date.and_time(start_time);
        Self {
            start,
            end: start + TimeDelta::minutes(duration_minutes),
        }
    }

    /// Half-open interval overlap: `[a, b)` and `[c, d)` overlap iff
    /// `a < d && c < b`.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Returns the slot occupied by an existing meeting.
pub fn meeting_slot(meeting: &Meeting) -> Slot {
    Slot {
        start: meeting.start_at(),
        end: meeting.end_at(),
    }
}

/// Finds the first meeting of `participant` overlapping `candidate`.
///
/// `exclude` skips one meeting id, used when re-validating an edited
/// meeting against its own stored slot.
///
/// The scan window covers the day before the candidate start through the
/// candidate end date: durations are capped at 24h, so no meeting outside
/// that window can reach into the candidate slot.
pub fn find_conflict<R: MeetingRepository>(
    repo: &R,
    participant: UserId,
    candidate: Slot,
    exclude: Option<MeetingId>,
) -> RepoResult<Option<MeetingId>> {
    let from = candidate
        .start
        .date()
        .checked_sub_days(Days::new(1))
        .unwrap_or_else(|| candidate.start.date());
    let to = candidate.end.date();

    let existing = repo.meetings_for_user_between(participant, from, to, exclude)?;
    Ok(existing
        .iter()
        .find(|meeting| candidate.overlaps(&meeting_slot(meeting)))
        .map(|meeting| meeting.uuid))
}

/// Boolean form of [`find_conflict`], taking the calendar parts a caller
/// holds before a meeting exists.
pub fn has_conflict<R: MeetingRepository>(
    repo: &R,
    participant: UserId,
    date: NaiveDate,
    start_time: NaiveTime,
    duration_minutes: i64,
    exclude: Option<MeetingId>,
) -> RepoResult<bool> {
    let candidate = Slot::from_parts(date, start_time, duration_minutes);
    Ok(find_conflict(repo, participant, candidate, exclude)?.is_some())
}
