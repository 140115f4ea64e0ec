//! Meeting lifecycle use-case service.
//!
//! # Responsibility
//! - Orchestrate create/edit/delete/cancel operations with authorization
//!   and conflict checks before persistence.
//! - Keep callers (web/API layers) working with plain values and typed
//!   errors only.
//!
//! # Invariants
//! - No mutating operation persists anything after a validation, access,
//!   or conflict failure (all-or-nothing).
//! - Every write path re-asserts that the organizer is a participant.

use crate::model::actor::{Actor, UserId};
use crate::model::meeting::{Meeting, MeetingId, MeetingValidationError};
use crate::repo::meeting_repo::{MeetingRepository, RepoError};
use crate::service::conflict::{find_conflict, meeting_slot};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use log::info;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Errors surfaced by lifecycle operations.
///
/// All of these describe caller/input problems local to one operation;
/// none are retried automatically.
#[derive(Debug)]
pub enum ScheduleError {
    /// Record-local validation failed (blank title, bad duration).
    Validation(MeetingValidationError),
    /// Meeting date lies strictly before today.
    PastDate(NaiveDate),
    /// Meeting starts today but before the current time.
    PastStart(NaiveDateTime),
    /// A participant's schedule overlaps the requested slot.
    Conflict {
        participant: UserId,
        meeting: MeetingId,
    },
    /// Actor lacks permission for the requested action.
    AccessDenied(&'static str),
    /// Referenced meeting does not exist.
    NotFound(MeetingId),
    /// Storage-level failure.
    Repo(RepoError),
}

impl Display for ScheduleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::PastDate(date) => {
                write!(f, "cannot schedule a meeting on past date {date}")
            }
            Self::PastStart(start) => {
                write!(f, "cannot schedule a meeting at {start}, that time has passed")
            }
            Self::Conflict { participant, .. } => {
                write!(f, "participant {participant} has a conflicting meeting")
            }
            Self::AccessDenied(reason) => write!(f, "access denied: {reason}"),
            Self::NotFound(id) => write!(f, "meeting not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ScheduleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MeetingValidationError> for ScheduleError {
    fn from(value: MeetingValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for ScheduleError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

/// Source of "now" for past-date validation.
///
/// Production uses [`SystemClock`]; tests pin a fixed instant so the
/// past/future boundary is deterministic.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in naive local time, matching how meeting dates are stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Input for creating a meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMeetingRequest {
    pub organizer: UserId,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i64,
    /// Invited users. The organizer is added regardless of whether the
    /// caller listed them here.
    pub participants: BTreeSet<UserId>,
}

/// Typed partial update for editing a meeting.
///
/// Each field is independently optional; `None` leaves the stored value
/// unchanged. A provided participant set replaces the old set wholesale
/// (the organizer is re-asserted afterwards).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeetingUpdate {
    pub title: Option<String>,
    /// `Some(None)` clears the description, `Some(Some(_))` replaces it.
    pub description: Option<Option<String>>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub duration_minutes: Option<i64>,
    pub participants: Option<BTreeSet<UserId>>,
}

impl MeetingUpdate {
    fn apply_to(&self, meeting: &mut Meeting) {
        if let Some(title) = &self.title {
            meeting.title = title.clone();
        }
        if let Some(description) = &self.description {
            meeting.description = description.clone();
        }
        if let Some(date) = self.date {
            meeting.date = date;
        }
        if let Some(start_time) = self.start_time {
            meeting.start_time = start_time;
        }
        if let Some(duration_minutes) = self.duration_minutes {
            meeting.duration_minutes = duration_minutes;
        }
        if let Some(participants) = &self.participants {
            meeting.participants = participants.clone();
        }
        meeting.participants.insert(meeting.organizer);
    }
}

/// Lifecycle manager over a meeting repository.
pub struct MeetingService<R: MeetingRepository, C: Clock = SystemClock> {
    repo: R,
    clock: C,
}

impl<R: MeetingRepository> MeetingService<R> {
    /// Creates a service on the wall clock.
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, SystemClock)
    }
}

impl<R: MeetingRepository, C: Clock> MeetingService<R, C> {
    /// Creates a service with an explicit clock.
    pub fn with_clock(repo: R, clock: C) -> Self {
        Self { repo, clock }
    }

    /// Creates a meeting after validation and per-participant conflict
    /// checks. Returns the persisted meeting, organizer included in its
    /// participant set.
    pub fn create_meeting(&self, request: &CreateMeetingRequest) -> ScheduleResult<Meeting> {
        let mut meeting = Meeting::with_id(
            Uuid::new_v4(),
            request.organizer,
            request.title.clone(),
            request.date,
            request.start_time,
            request.duration_minutes,
        );
        meeting.description = request.description.clone();
        meeting.participants.extend(request.participants.iter().copied());

        meeting.validate()?;
        self.ensure_not_in_past(&meeting)?;

        // Conflict scan and insert share one write lock, so a competing
        // writer on another connection cannot slip an overlapping meeting
        // in between the two.
        self.repo.with_write_lock(|repo| {
            Self::ensure_schedule_free(repo, &meeting, None)?;
            repo.create_meeting(&meeting)?;
            Ok::<_, ScheduleError>(())
        })?;
        info!(
            "event=meeting_create module=service status=ok meeting={} organizer={} participants={}",
            meeting.uuid,
            meeting.organizer,
            meeting.participants.len()
        );
        Ok(meeting)
    }

    /// Applies a typed partial update to an existing meeting.
    ///
    /// Organizer-only. Validation matches create; the meeting's own id is
    /// excluded from conflict checks so an unchanged slot never conflicts
    /// with itself.
    pub fn update_meeting(
        &self,
        actor: Actor,
        id: MeetingId,
        update: &MeetingUpdate,
    ) -> ScheduleResult<Meeting> {
        let mut meeting = self.load(id)?;
        if meeting.organizer != actor.user {
            return Err(ScheduleError::AccessDenied(
                "only the organizer may edit a meeting",
            ));
        }

        update.apply_to(&mut meeting);
        meeting.validate()?;
        self.ensure_not_in_past(&meeting)?;

        self.repo.with_write_lock(|repo| {
            Self::ensure_schedule_free(repo, &meeting, Some(id))?;
            repo.update_meeting(&meeting)?;
            Ok::<_, ScheduleError>(())
        })?;
        info!(
            "event=meeting_update module=service status=ok meeting={} participants={}",
            meeting.uuid,
            meeting.participants.len()
        );
        Ok(meeting)
    }

    /// Deletes a meeting and all participant associations.
    ///
    /// Allowed for the organizer or an administrative actor.
    pub fn delete_meeting(&self, actor: Actor, id: MeetingId) -> ScheduleResult<()> {
        let meeting = self.load(id)?;
        if meeting.organizer != actor.user && !actor.role.can_moderate() {
            return Err(ScheduleError::AccessDenied(
                "only the organizer may delete a meeting",
            ));
        }

        self.repo.delete_meeting(id)?;
        info!(
            "event=meeting_delete module=service status=ok meeting={} actor={}",
            id, actor.user
        );
        Ok(())
    }

    /// Removes the acting user from a meeting's participant set.
    ///
    /// The meeting itself survives. The organizer cannot cancel (deleting
    /// is their way out), and users not on the meeting are rejected.
    pub fn cancel_participation(&self, actor: Actor, id: MeetingId) -> ScheduleResult<Meeting> {
        let meeting = self.load(id)?;
        if meeting.organizer == actor.user {
            return Err(ScheduleError::AccessDenied(
                "the organizer cannot cancel participation; delete the meeting instead",
            ));
        }
        if !meeting.participants.contains(&actor.user) {
            return Err(ScheduleError::AccessDenied(
                "only participants may cancel their participation",
            ));
        }

        self.repo.remove_participant(id, actor.user)?;
        info!(
            "event=participation_cancel module=service status=ok meeting={} user={}",
            id, actor.user
        );

        let mut updated = meeting;
        updated.participants.remove(&actor.user);
        Ok(updated)
    }

    /// Loads one meeting for display.
    ///
    /// Visible to the organizer and current participants only.
    pub fn meeting_detail(&self, actor: Actor, id: MeetingId) -> ScheduleResult<Meeting> {
        let meeting = self.load(id)?;
        if !meeting.involves(actor.user) {
            return Err(ScheduleError::AccessDenied(
                "meeting is visible to its organizer and participants only",
            ));
        }
        Ok(meeting)
    }

    /// Lists all meetings `user` organizes or participates in, ordered by
    /// date then start time.
    pub fn meetings_for_user(&self, user: UserId) -> ScheduleResult<Vec<Meeting>> {
        Ok(self.repo.list_meetings_for_user(user)?)
    }

    fn load(&self, id: MeetingId) -> ScheduleResult<Meeting> {
        self.repo
            .get_meeting(id)?
            .ok_or(ScheduleError::NotFound(id))
    }

    fn ensure_not_in_past(&self, meeting: &Meeting) -> ScheduleResult<()> {
        let now = self.clock.now();
        if meeting.date < now.date() {
            return Err(ScheduleError::PastDate(meeting.date));
        }
        if meeting.date == now.date() && meeting.start_time < now.time() {
            return Err(ScheduleError::PastStart(meeting.start_at()));
        }
        Ok(())
    }

    /// Rejects the whole operation on the first conflicting participant
    /// (all-or-nothing, no partial scheduling). The organizer is in
    /// `participants`, so their schedule is checked too.
    ///
    /// Runs on the repository handle passed by `with_write_lock`, so the
    /// scan reads the same snapshot the subsequent write commits against.
    fn ensure_schedule_free(
        repo: &R,
        meeting: &Meeting,
        exclude: Option<MeetingId>,
    ) -> ScheduleResult<()> {
        let candidate = meeting_slot(meeting);
        for participant in &meeting.participants {
            if let Some(existing) = find_conflict(repo, *participant, candidate, exclude)? {
                return Err(ScheduleError::Conflict {
                    participant: *participant,
                    meeting: existing,
                });
            }
        }
        Ok(())
    }
}
