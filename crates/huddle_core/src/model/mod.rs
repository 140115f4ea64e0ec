//! Domain model for the meeting scheduler core.
//!
//! # Responsibility
//! - Define canonical data structures used by scheduling business logic.
//! - Keep validation rules next to the data they constrain.
//!
//! # Invariants
//! - Every meeting is identified by a stable `MeetingId`.
//! - A meeting's organizer is always a member of its participant set.

pub mod actor;
pub mod meeting;
