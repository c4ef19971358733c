//! Audit event types

use chrono::{DateTime, Utc};
use lessonpack_api::{Hours, PackageEvent};
use lessonpack_util::{AdminId, InstanceId, PaymentId, StudentId, TemplateId, TutorId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// CLI or service process started
    ServiceStarted,

    /// Configuration loaded
    ConfigLoaded { template_count: usize },

    /// Package instance created
    PackageCreated {
        instance_id: InstanceId,
        template_id: TemplateId,
        student_id: StudentId,
        total_hours: Hours,
        expiry_date: DateTime<Utc>,
    },

    /// Student or tutor bound to an instance
    AssignmentRecorded {
        instance_id: InstanceId,
        student_id: StudentId,
        tutor_id: Option<TutorId>,
        assigned_by: AdminId,
    },

    /// Lesson hours consumed
    LessonRecorded {
        instance_id: InstanceId,
        hours: Hours,
        remaining: Hours,
    },

    /// Lesson hours given back
    LessonRefunded {
        instance_id: InstanceId,
        hours: Hours,
        remaining: Hours,
    },

    /// Lifecycle transition
    StatusChanged { event: PackageEvent },

    /// Offline payment recorded, awaiting confirmation
    PaymentRecorded {
        payment_id: PaymentId,
        instance_id: InstanceId,
        amount_cents: u64,
        recorded_by: AdminId,
    },

    /// Offline payment confirmed by an admin
    PaymentConfirmed {
        payment_id: PaymentId,
        instance_id: InstanceId,
        confirmed_by: AdminId,
    },

    /// Template withdrawn from sale
    TemplateDeactivated { template_id: TemplateId },

    /// Expiry sweep finished
    SweepCompleted { evaluated: usize, changed: usize },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: lessonpack_util::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessonpack_api::CompletionReason;

    #[test]
    fn status_change_nests_event() {
        let event = AuditEventType::StatusChanged {
            event: PackageEvent::Completed {
                instance_id: InstanceId::new(),
                reason: CompletionReason::Forced,
                at: Utc::now(),
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "status_changed");
        assert_eq!(value["event"]["type"], "completed");

        let parsed: AuditEventType = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }
}
