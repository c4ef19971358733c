//! Domain errors

use lessonpack_api::{Hours, PackageStatus};
use lessonpack_util::{InstanceId, PaymentId, StudentId, TemplateId};
use thiserror::Error;

/// Errors returned by ledger, instance and registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient hours: requested {requested}, remaining {remaining}")]
    InsufficientHours { requested: Hours, remaining: Hours },

    #[error("Ledger is closed")]
    LedgerClosed,

    #[error("Already assigned: {0}")]
    AlreadyAssigned(String),

    #[error("Package is not active (status: {status})")]
    NotActive { status: PackageStatus },

    #[error("Package is not suspended (status: {status})")]
    NotSuspended { status: PackageStatus },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: PackageStatus,
        to: PackageStatus,
    },

    #[error("Unknown template: {0}")]
    UnknownTemplate(TemplateId),

    #[error("Unknown {role}: {id}")]
    UnknownUser { role: &'static str, id: String },

    #[error("Template is inactive: {0}")]
    TemplateInactive(TemplateId),

    #[error("Unknown package: {0}")]
    UnknownPackage(InstanceId),

    #[error("Unknown payment: {0}")]
    UnknownPayment(PaymentId),
}

impl PackageError {
    pub(crate) fn unknown_student(id: &StudentId) -> Self {
        PackageError::UnknownUser {
            role: "student",
            id: id.to_string(),
        }
    }

    pub(crate) fn unknown_tutor(id: &lessonpack_util::TutorId) -> Self {
        PackageError::UnknownUser {
            role: "tutor",
            id: id.to_string(),
        }
    }
}

pub type PackageResult<T> = Result<T, PackageError>;
