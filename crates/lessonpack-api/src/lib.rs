//! Shared types for lessonpack
//!
//! This crate defines the data exchanged between the engine and its
//! consumers (booking flow, admin screens, dashboard widgets):
//! - Hour quantities and template allotments
//! - Lifecycle status
//! - Persisted package and assignment records
//! - Dashboard views and expiry warnings
//! - Lifecycle events
//! - Offline payment records

mod events;
mod hours;
mod payments;
mod types;

pub use events::*;
pub use hours::*;
pub use payments::*;
pub use types::*;

/// Current record schema version
pub const RECORD_VERSION: u32 = 1;
