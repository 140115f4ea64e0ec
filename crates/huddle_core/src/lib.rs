//! Meeting scheduler core for the Huddle team workspace.
//! This crate is the single source of truth for scheduling invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging};
pub use model::actor::{Actor, Role, UserId};
pub use model::meeting::{
    Meeting, MeetingId, MeetingValidationError, MAX_DURATION_MINUTES,
};
pub use repo::meeting_repo::{
    MeetingRepository, RepoError, RepoResult, SqliteMeetingRepository,
};
pub use service::conflict::{has_conflict, Slot};
pub use service::meeting_service::{
    Clock, CreateMeetingRequest, MeetingService, MeetingUpdate, ScheduleError, ScheduleResult,
    SystemClock,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
