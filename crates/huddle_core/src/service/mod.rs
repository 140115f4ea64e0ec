//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into lifecycle-level APIs.
//! - Keep web/API layers decoupled from storage details.

pub mod conflict;
pub mod meeting_service;
