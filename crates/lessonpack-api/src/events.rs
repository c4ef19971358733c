//! Lifecycle events emitted when a package instance changes status

use chrono::{DateTime, Utc};
use lessonpack_util::{InstanceId, StudentId, TutorId};
use serde::{Deserialize, Serialize};

use crate::{Hours, PackageStatus};

/// Why a package reached `completed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Every allocated hour was consumed
    Depleted,
    /// An admin closed the package explicitly
    Forced,
}

/// Status-change notifications for dashboards and notification senders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PackageEvent {
    Activated {
        instance_id: InstanceId,
        student_id: StudentId,
        tutor_id: TutorId,
        at: DateTime<Utc>,
    },

    Completed {
        instance_id: InstanceId,
        reason: CompletionReason,
        at: DateTime<Utc>,
    },

    Expired {
        instance_id: InstanceId,
        remaining_hours: Hours,
        at: DateTime<Utc>,
    },

    Suspended {
        instance_id: InstanceId,
        reason: Option<String>,
        at: DateTime<Utc>,
    },

    Resumed {
        instance_id: InstanceId,
        at: DateTime<Utc>,
    },
}

impl PackageEvent {
    pub fn instance_id(&self) -> InstanceId {
        match self {
            PackageEvent::Activated { instance_id, .. }
            | PackageEvent::Completed { instance_id, .. }
            | PackageEvent::Expired { instance_id, .. }
            | PackageEvent::Suspended { instance_id, .. }
            | PackageEvent::Resumed { instance_id, .. } => *instance_id,
        }
    }

    /// Status the instance holds after this event
    pub fn new_status(&self) -> PackageStatus {
        match self {
            PackageEvent::Activated { .. } | PackageEvent::Resumed { .. } => PackageStatus::Active,
            PackageEvent::Completed { .. } => PackageStatus::Completed,
            PackageEvent::Expired { .. } => PackageStatus::Expired,
            PackageEvent::Suspended { .. } => PackageStatus::Suspended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_is_tagged() {
        let event = PackageEvent::Completed {
            instance_id: InstanceId::new(),
            reason: CompletionReason::Depleted,
            at: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"completed\""));
        assert!(json.contains("\"reason\":\"depleted\""));

        let parsed: PackageEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn new_status_matches_event_kind() {
        let id = InstanceId::new();
        let now = Utc::now();

        let resumed = PackageEvent::Resumed { instance_id: id, at: now };
        assert_eq!(resumed.new_status(), PackageStatus::Active);
        assert_eq!(resumed.instance_id(), id);

        let expired = PackageEvent::Expired {
            instance_id: id,
            remaining_hours: Hours::whole(2),
            at: now,
        };
        assert_eq!(expired.new_status(), PackageStatus::Expired);
    }
}
