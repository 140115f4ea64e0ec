//! Meeting domain model.
//!
//! # Responsibility
//! - Define the canonical meeting record shared by repository and service.
//! - Provide interval helpers used by conflict checking.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another meeting.
//! - `participants` always contains `organizer`.
//! - `duration_minutes` is positive and at most [`MAX_DURATION_MINUTES`].

use crate::model::actor::UserId;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a meeting.
pub type MeetingId = Uuid;

/// Upper bound on meeting length. Keeps the conflict scan window bounded:
/// a meeting can spill into at most the day after its start date.
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;

/// Validation failures for meeting records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingValidationError {
    /// Title is empty or whitespace-only.
    BlankTitle,
    /// Duration is zero or negative.
    NonPositiveDuration(i64),
    /// Duration exceeds [`MAX_DURATION_MINUTES`].
    DurationTooLong(i64),
}

impl Display for MeetingValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "meeting title must not be blank"),
            Self::NonPositiveDuration(minutes) => {
                write!(f, "meeting duration must be positive, got {minutes} minutes")
            }
            Self::DurationTooLong(minutes) => write!(
                f,
                "meeting duration must be at most {MAX_DURATION_MINUTES} minutes, got {minutes}"
            ),
        }
    }
}

impl Error for MeetingValidationError {}

/// Canonical meeting record.
///
/// `end` is always derived from `date + start_time + duration_minutes` and
/// never stored, so the two can not drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    /// Stable global id used for linking and auditing.
    pub uuid: MeetingId,
    /// Short human-facing title. Required, non-blank.
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Naive local calendar date the meeting starts on.
    pub date: NaiveDate,
    /// Time of day the meeting starts at.
    pub start_time: NaiveTime,
    /// Meeting length in whole minutes.
    pub duration_minutes: i64,
    /// User who created the meeting and owns edit/delete rights.
    pub organizer: UserId,
    /// Users attending the meeting. Always includes `organizer`.
    pub participants: BTreeSet<UserId>,
}

impl Meeting {
    /// Creates a new meeting with a generated stable id.
    ///
    /// The organizer is inserted into `participants` up front; every
    /// participant-set mutation elsewhere must keep that property.
    pub fn new(
        organizer: UserId,
        title: impl Into<String>,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i64,
    ) -> Self {
        Self::with_id(
            Uuid::new_v4(),
            organizer,
            title,
            date,
            start_time,
            duration_minutes,
        )
    }

    /// Creates a meeting with a caller-provided stable id.
    ///
    /// Used by persistence when rehydrating rows and by tests that need
    /// deterministic ids. Does not validate; callers go through
    /// [`Meeting::validate`] before persisting.
    pub fn with_id(
        uuid: MeetingId,
        organizer: UserId,
        title: impl Into<String>,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i64,
    ) -> Self {
        Self {
            uuid,
            title: title.into(),
            description: None,
            date,
            start_time,
            duration_minutes,
            organizer,
            participants: BTreeSet::from([organizer]),
        }
    }

    /// Checks record-local invariants.
    pub fn validate(&self) -> Result<(), MeetingValidationError> {
        if self.title.trim().is_empty() {
            return Err(MeetingValidationError::BlankTitle);
        }
        if self.duration_minutes <= 0 {
            return Err(MeetingValidationError::NonPositiveDuration(
                self.duration_minutes,
            ));
        }
        if self.duration_minutes > MAX_DURATION_MINUTES {
            return Err(MeetingValidationError::DurationTooLong(
                self.duration_minutes,
            ));
        }
        Ok(())
    }

    /// Start instant on the naive local timeline.
    pub fn start_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Derived end instant. May land on the day after `date`.
    pub fn end_at(&self) -> NaiveDateTime {
        self.start_at() + TimeDelta::minutes(self.duration_minutes)
    }

    /// Returns whether `user` is the organizer or a listed participant.
    pub fn involves(&self, user: UserId) -> bool {
        self.organizer == user || self.participants.contains(&user)
    }
}
