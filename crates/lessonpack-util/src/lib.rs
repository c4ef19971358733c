//! Shared utilities for lessonpack
//!
//! This crate provides:
//! - ID types (InstanceId, PaymentId, TemplateId, StudentId, TutorId, AdminId)
//! - Clock (`now()` with mock time support, day arithmetic)
//! - Default paths for config and data directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
