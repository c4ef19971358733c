//! Package lifecycle and hour-accounting engine for lessonpack
//!
//! This crate contains:
//! - The hour ledger (allocated vs. consumed hours, never negative)
//! - The lifecycle state machine (Pending -> Active -> Completed/Expired, with Suspended)
//! - Package instances tying a template, a student, a tutor and a ledger together
//! - The assignment registry the booking flow, admin screens and dashboards talk to

mod error;
mod instance;
mod ledger;
pub mod lifecycle;
mod registry;

pub use error::*;
pub use instance::*;
pub use ledger::*;
pub use registry::*;
