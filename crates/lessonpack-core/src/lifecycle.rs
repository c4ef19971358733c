//! Package lifecycle state machine
//!
//! ```text
//!   pending ──(student & tutor bound)──> active ──(suspend)──> suspended
//!      │                                │  ▲                      │
//!      │                                │  └──────(resume)────────┤
//!      │                     (depleted) │                         │
//!      │                                ▼                         │
//!      ├──────(force)─────────────> completed <──────(force)──────┤
//!      │                                                          │
//!      └──────(past expiry)───────> expired  <──(past expiry)─────┘
//! ```
//!
//! `active` also expires once its expiry date passes. Nothing leaves
//! `completed` or `expired`.

use lessonpack_api::{Hours, PackageStatus};

use crate::{PackageError, PackageResult};

/// Facts about an instance that automatic transitions depend on
#[derive(Debug, Clone, Copy)]
pub struct LifecycleGuards {
    pub student_bound: bool,
    pub tutor_bound: bool,
    pub remaining: Hours,
    /// `now` is strictly past the expiry date
    pub past_expiry: bool,
}

/// Operations whose availability depends on status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    RecordLesson,
    CancelLesson,
    BindParty,
    Suspend,
    Resume,
    ForceComplete,
}

/// Automatic transition due at this point, if any.
///
/// Depletion wins over expiry, and expiry is checked before activation.
pub fn evaluate(status: PackageStatus, guards: &LifecycleGuards) -> Option<PackageStatus> {
    if status.is_terminal() {
        return None;
    }

    if status == PackageStatus::Active && guards.remaining.is_zero() {
        return Some(PackageStatus::Completed);
    }

    if guards.past_expiry {
        return Some(PackageStatus::Expired);
    }

    if status == PackageStatus::Pending
        && guards.student_bound
        && guards.tutor_bound
        && !guards.remaining.is_zero()
    {
        return Some(PackageStatus::Active);
    }

    None
}

/// Whether `from -> to` is an edge of the state machine
pub fn can_transition(from: PackageStatus, to: PackageStatus) -> bool {
    use PackageStatus::*;

    matches!(
        (from, to),
        (Pending, Active)
            | (Pending, Expired)
            | (Pending, Completed)
            | (Active, Completed)
            | (Active, Expired)
            | (Active, Suspended)
            | (Suspended, Active)
            | (Suspended, Expired)
            | (Suspended, Completed)
    )
}

pub fn transition(from: PackageStatus, to: PackageStatus) -> PackageResult<PackageStatus> {
    if can_transition(from, to) {
        Ok(to)
    } else {
        Err(PackageError::InvalidTransition { from, to })
    }
}

/// Check that `operation` is allowed while in `status`
pub fn check_operation(status: PackageStatus, operation: Operation) -> PackageResult<()> {
    use PackageStatus::*;

    match operation {
        Operation::RecordLesson => match status {
            Active => Ok(()),
            Completed | Expired => Err(PackageError::LedgerClosed),
            Pending | Suspended => Err(PackageError::NotActive { status }),
        },
        Operation::CancelLesson => match status {
            Active | Suspended => Ok(()),
            Completed | Expired => Err(PackageError::LedgerClosed),
            Pending => Err(PackageError::NotActive { status }),
        },
        Operation::BindParty => {
            if status.is_terminal() {
                Err(PackageError::LedgerClosed)
            } else {
                Ok(())
            }
        }
        Operation::Suspend => transition(status, Suspended).map(|_| ()),
        Operation::Resume => match status {
            Suspended => Ok(()),
            Completed | Expired => Err(PackageError::InvalidTransition { from: status, to: Active }),
            Pending | Active => Err(PackageError::NotSuspended { status }),
        },
        Operation::ForceComplete => transition(status, Completed).map(|_| ()),
    }
}
