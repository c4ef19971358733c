//! Package instances

use chrono::{DateTime, Utc};
use lessonpack_api::{
    CompletionReason, ExpiryThreshold, ExpiryWarning, Hours, PackageEvent, PackageRecord,
    PackageStatus, PackageTemplate, PackageView,
};
use lessonpack_util::{InstanceId, StudentId, TemplateId, TutorId, days_until};

use crate::lifecycle::{self, LifecycleGuards, Operation};
use crate::{HourLedger, PackageError, PackageResult};

/// One purchased or assigned occurrence of a template
#[derive(Debug, Clone)]
pub struct PackageInstance {
    id: InstanceId,
    template_id: TemplateId,
    template_name: String,
    subjects: Vec<String>,
    student_id: Option<StudentId>,
    tutor_id: Option<TutorId>,
    ledger: HourLedger,
    status: PackageStatus,
    created_at: DateTime<Utc>,
    activated_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    expiry_date: DateTime<Utc>,
    notes: Option<String>,
}

impl PackageInstance {
    /// Create a pending instance of `template` holding `total` hours
    pub fn new(
        template: &PackageTemplate,
        total: Hours,
        created_at: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
        notes: Option<String>,
    ) -> PackageResult<Self> {
        Ok(Self {
            id: InstanceId::new(),
            template_id: template.id.clone(),
            template_name: template.name.clone(),
            subjects: template.subjects.clone(),
            student_id: None,
            tutor_id: None,
            ledger: HourLedger::create(total)?,
            status: PackageStatus::Pending,
            created_at,
            activated_at: None,
            completed_at: None,
            expiry_date,
            notes,
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    pub fn student_id(&self) -> Option<&StudentId> {
        self.student_id.as_ref()
    }

    pub fn tutor_id(&self) -> Option<&TutorId> {
        self.tutor_id.as_ref()
    }

    pub fn ledger(&self) -> &HourLedger {
        &self.ledger
    }

    pub fn status(&self) -> PackageStatus {
        self.status
    }

    pub fn expiry_date(&self) -> DateTime<Utc> {
        self.expiry_date
    }

    pub fn covers_subject(&self, subject: &str) -> bool {
        self.subjects.iter().any(|s| s.eq_ignore_ascii_case(subject))
    }

    /// Bind the student and, optionally, the tutor.
    ///
    /// Status is not re-evaluated here; call [`refresh`](Self::refresh).
    pub fn assign(&mut self, student: StudentId, tutor: Option<TutorId>) -> PackageResult<()> {
        lifecycle::check_operation(self.status, Operation::BindParty)?;
        if let Some(existing) = &self.student_id {
            return Err(PackageError::AlreadyAssigned(format!(
                "instance {} already belongs to student {}",
                self.id, existing
            )));
        }
        if let Some(tutor) = &tutor
            && let Some(existing) = &self.tutor_id
            && existing != tutor
        {
            return Err(PackageError::AlreadyAssigned(format!(
                "instance {} already bound to tutor {}",
                self.id, existing
            )));
        }

        self.student_id = Some(student);
        if tutor.is_some() {
            self.tutor_id = tutor;
        }
        Ok(())
    }

    pub fn bind_tutor(&mut self, tutor: TutorId) -> PackageResult<()> {
        lifecycle::check_operation(self.status, Operation::BindParty)?;
        if let Some(existing) = &self.tutor_id {
            return Err(PackageError::AlreadyAssigned(format!(
                "instance {} already bound to tutor {}",
                self.id, existing
            )));
        }
        self.tutor_id = Some(tutor);
        Ok(())
    }

    pub fn record_lesson_completion(
        &mut self,
        hours: Hours,
        now: DateTime<Utc>,
    ) -> PackageResult<Vec<PackageEvent>> {
        let mut events = self.refresh(now);
        lifecycle::check_operation(self.status, Operation::RecordLesson)?;

        let consumption = self.ledger.consume(hours)?;
        if consumption.depleted {
            events.push(self.complete(CompletionReason::Depleted, now)?);
        }
        Ok(events)
    }

    /// Give back hours of a cancelled lesson
    pub fn cancel_lesson(
        &mut self,
        hours: Hours,
        now: DateTime<Utc>,
    ) -> PackageResult<Vec<PackageEvent>> {
        let events = self.refresh(now);
        lifecycle::check_operation(self.status, Operation::CancelLesson)?;
        self.ledger.refund(hours)?;
        Ok(events)
    }

    pub fn check_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_date
    }

    pub fn suspend(
        &mut self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> PackageResult<Vec<PackageEvent>> {
        let mut events = self.refresh(now);
        lifecycle::check_operation(self.status, Operation::Suspend)?;

        self.status = PackageStatus::Suspended;
        events.push(PackageEvent::Suspended {
            instance_id: self.id,
            reason,
            at: now,
        });
        Ok(events)
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> PackageResult<Vec<PackageEvent>> {
        let mut events = self.refresh(now);
        lifecycle::check_operation(self.status, Operation::Resume)?;

        if self.check_expiry(now) || self.ledger.is_depleted() {
            return Err(PackageError::InvalidTransition {
                from: self.status,
                to: PackageStatus::Active,
            });
        }

        self.status = lifecycle::transition(self.status, PackageStatus::Active)?;
        events.push(PackageEvent::Resumed {
            instance_id: self.id,
            at: now,
        });
        Ok(events)
    }

    pub fn force_complete(&mut self, now: DateTime<Utc>) -> PackageResult<Vec<PackageEvent>> {
        let mut events = self.refresh(now);
        lifecycle::check_operation(self.status, Operation::ForceComplete)?;
        events.push(self.complete(CompletionReason::Forced, now)?);
        Ok(events)
    }

    /// Apply any automatic transition due at `now`
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Vec<PackageEvent> {
        let guards = LifecycleGuards {
            student_bound: self.student_id.is_some(),
            tutor_bound: self.tutor_id.is_some(),
            remaining: self.ledger.remaining(),
            past_expiry: self.check_expiry(now),
        };

        let event = match lifecycle::evaluate(self.status, &guards) {
            Some(PackageStatus::Active) => self.activate(now),
            Some(PackageStatus::Completed) => self.complete(CompletionReason::Depleted, now).ok(),
            Some(PackageStatus::Expired) => self.expire(now),
            _ => None,
        };

        event.into_iter().collect()
    }

    fn activate(&mut self, now: DateTime<Utc>) -> Option<PackageEvent> {
        let (Some(student_id), Some(tutor_id)) = (&self.student_id, &self.tutor_id) else {
            return None;
        };
        let status = lifecycle::transition(self.status, PackageStatus::Active).ok()?;

        self.status = status;
        self.activated_at = Some(now);
        Some(PackageEvent::Activated {
            instance_id: self.id,
            student_id: student_id.clone(),
            tutor_id: tutor_id.clone(),
            at: now,
        })
    }

    fn complete(
        &mut self,
        reason: CompletionReason,
        now: DateTime<Utc>,
    ) -> PackageResult<PackageEvent> {
        self.status = lifecycle::transition(self.status, PackageStatus::Completed)?;
        self.completed_at = Some(now);
        self.ledger.close();
        Ok(PackageEvent::Completed {
            instance_id: self.id,
            reason,
            at: now,
        })
    }

    fn expire(&mut self, now: DateTime<Utc>) -> Option<PackageEvent> {
        self.status = lifecycle::transition(self.status, PackageStatus::Expired).ok()?;
        self.ledger.close();
        Some(PackageEvent::Expired {
            instance_id: self.id,
            remaining_hours: self.ledger.remaining(),
            at: now,
        })
    }

    /// Dashboard projection at `now`
    pub fn view(&self, now: DateTime<Utc>, thresholds: &[ExpiryThreshold]) -> PackageView {
        let days_until_expiry = days_until(self.expiry_date, now);
        let expiry_warning = if self.status.is_terminal() {
            None
        } else {
            ExpiryWarning::select(thresholds, days_until_expiry)
        };

        PackageView {
            instance_id: self.id,
            template_id: self.template_id.clone(),
            template_name: self.template_name.clone(),
            subjects: self.subjects.clone(),
            student_id: self.student_id.clone(),
            tutor_id: self.tutor_id.clone(),
            status: self.status,
            total_hours: self.ledger.total(),
            used_hours: self.ledger.used(),
            remaining_hours: self.ledger.remaining(),
            percent_used: self.ledger.percent_used(),
            created_at: self.created_at,
            activated_at: self.activated_at,
            completed_at: self.completed_at,
            expiry_date: self.expiry_date,
            days_until_expiry,
            expiry_warning,
            notes: self.notes.clone(),
        }
    }

    pub fn to_record(&self) -> PackageRecord {
        PackageRecord {
            id: self.id,
            template_id: self.template_id.clone(),
            subjects: self.subjects.clone(),
            student_id: self.student_id.clone(),
            tutor_id: self.tutor_id.clone(),
            total_hours: self.ledger.total(),
            used_hours: self.ledger.used(),
            status: self.status,
            created_at: self.created_at,
            activated_at: self.activated_at,
            completed_at: self.completed_at,
            expiry_date: self.expiry_date,
            notes: self.notes.clone(),
        }
    }

    /// Rebuild an instance from its persisted record.
    ///
    /// `template` supplies the display name, and the subjects for records
    /// written before they were persisted. Without it the template id stands
    /// in for the name.
    pub fn from_record(
        record: PackageRecord,
        template: Option<&PackageTemplate>,
    ) -> PackageResult<Self> {
        let ledger = HourLedger::restore(
            record.total_hours,
            record.used_hours,
            record.status.is_terminal(),
        )?;

        let template_name = match template {
            Some(t) => t.name.clone(),
            None => record.template_id.to_string(),
        };
        let subjects = match (record.subjects.is_empty(), template) {
            (true, Some(t)) => t.subjects.clone(),
            _ => record.subjects,
        };

        Ok(Self {
            id: record.id,
            template_id: record.template_id,
            template_name,
            subjects,
            student_id: record.student_id,
            tutor_id: record.tutor_id,
            ledger,
            status: record.status,
            created_at: record.created_at,
            activated_at: record.activated_at,
            completed_at: record.completed_at,
            expiry_date: record.expiry_date,
            notes: record.notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use lessonpack_api::{HourAllotment, WarningSeverity};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn template() -> PackageTemplate {
        PackageTemplate {
            id: TemplateId::new("math-10h"),
            name: "Math 10h".into(),
            description: None,
            subjects: vec!["math".into()],
            total_hours: HourAllotment::Specified(Hours::whole(10)),
            price_cents: 25_000,
            validity_days: None,
            tutor_id: None,
            is_active: true,
        }
    }

    fn instance(total: u32, expiry_in_days: i64) -> PackageInstance {
        PackageInstance::new(
            &template(),
            Hours::whole(total),
            t0(),
            t0() + Duration::days(expiry_in_days),
            None,
        )
        .unwrap()
    }

    fn active(total: u32) -> PackageInstance {
        let mut inst = instance(total, 31);
        inst.assign(StudentId::new("s1"), Some(TutorId::new("t1"))).unwrap();
        let events = inst.refresh(t0());
        assert_eq!(events.len(), 1);
        inst
    }

    #[test]
    fn test_full_lifecycle() {
        let mut inst = active(10);
        assert_eq!(inst.status(), PackageStatus::Active);

        let events = inst
            .record_lesson_completion(Hours::whole(6), t0() + Duration::days(1))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(inst.ledger().remaining(), Hours::whole(4));
        assert_eq!(inst.status(), PackageStatus::Active);

        let events = inst
            .record_lesson_completion(Hours::whole(4), t0() + Duration::days(2))
            .unwrap();
        assert_eq!(inst.status(), PackageStatus::Completed);
        assert!(matches!(
            events[0],
            PackageEvent::Completed {
                reason: CompletionReason::Depleted,
                ..
            }
        ));
        assert!(inst.ledger().is_closed());
    }

    #[test]
    fn test_partial_assignment_stays_pending() {
        let mut inst = instance(5, 31);
        inst.assign(StudentId::new("s1"), None).unwrap();
        assert!(inst.refresh(t0()).is_empty());
        assert_eq!(inst.status(), PackageStatus::Pending);

        inst.bind_tutor(TutorId::new("t1")).unwrap();
        let events = inst.refresh(t0());
        assert!(matches!(events[0], PackageEvent::Activated { .. }));
    }

    #[test]
    fn test_double_assignment_rejected() {
        let mut inst = instance(5, 31);
        inst.assign(StudentId::new("s1"), Some(TutorId::new("t1"))).unwrap();
        assert!(matches!(
            inst.assign(StudentId::new("s2"), None),
            Err(PackageError::AlreadyAssigned(_))
        ));
        assert!(matches!(
            inst.bind_tutor(TutorId::new("t2")),
            Err(PackageError::AlreadyAssigned(_))
        ));
    }

    #[test]
    fn test_past_expiry_never_activates() {
        let mut inst = instance(5, -1);
        inst.assign(StudentId::new("s1"), Some(TutorId::new("t1"))).unwrap();

        let events = inst.refresh(t0());
        assert_eq!(inst.status(), PackageStatus::Expired);
        assert!(matches!(
            events[0],
            PackageEvent::Expired { remaining_hours, .. } if remaining_hours == Hours::whole(5)
        ));
        assert!(inst.refresh(t0()).is_empty());
    }

    #[test]
    fn test_lesson_after_expiry_is_rejected() {
        let mut inst = active(5);
        let late = t0() + Duration::days(40);

        assert_eq!(
            inst.record_lesson_completion(Hours::whole(1), late),
            Err(PackageError::LedgerClosed)
        );
        assert_eq!(inst.status(), PackageStatus::Expired);
        assert_eq!(inst.ledger().used(), Hours::ZERO);
    }

    #[test]
    fn test_refund_after_consume() {
        let mut inst = active(10);
        inst.record_lesson_completion(Hours::whole(3), t0()).unwrap();

        assert!(matches!(
            inst.cancel_lesson(Hours::whole(5), t0()),
            Err(PackageError::InvalidAmount(_))
        ));
        assert_eq!(inst.ledger().used(), Hours::whole(3));

        inst.cancel_lesson(Hours::whole(2), t0()).unwrap();
        assert_eq!(inst.ledger().used(), Hours::whole(1));
    }

    #[test]
    fn test_pending_rejects_lessons() {
        let mut inst = instance(5, 31);
        assert_eq!(
            inst.record_lesson_completion(Hours::whole(1), t0()),
            Err(PackageError::NotActive {
                status: PackageStatus::Pending
            })
        );
        assert_eq!(
            inst.cancel_lesson(Hours::whole(1), t0()),
            Err(PackageError::NotActive {
                status: PackageStatus::Pending
            })
        );
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut inst = active(5);

        let events = inst.suspend(Some("unpaid".into()), t0()).unwrap();
        assert!(matches!(&events[0], PackageEvent::Suspended { reason: Some(r), .. } if r == "unpaid"));
        assert_eq!(
            inst.record_lesson_completion(Hours::whole(1), t0()),
            Err(PackageError::NotActive {
                status: PackageStatus::Suspended
            })
        );

        let events = inst.resume(t0()).unwrap();
        assert!(matches!(events[0], PackageEvent::Resumed { .. }));
        assert_eq!(
            inst.resume(t0()),
            Err(PackageError::NotSuspended {
                status: PackageStatus::Active
            })
        );
    }

    #[test]
    fn test_resume_after_expiry_fails() {
        let mut inst = active(5);
        inst.suspend(None, t0()).unwrap();

        let late = t0() + Duration::days(32);
        assert_eq!(
            inst.resume(late),
            Err(PackageError::InvalidTransition {
                from: PackageStatus::Expired,
                to: PackageStatus::Active
            })
        );
        assert_eq!(inst.status(), PackageStatus::Expired);
    }

    #[test]
    fn test_force_complete() {
        let mut inst = instance(5, 31);
        let events = inst.force_complete(t0()).unwrap();
        assert!(matches!(
            events[0],
            PackageEvent::Completed {
                reason: CompletionReason::Forced,
                ..
            }
        ));
        assert!(matches!(
            inst.force_complete(t0()),
            Err(PackageError::InvalidTransition { .. })
        ));
        assert_eq!(
            inst.cancel_lesson(Hours::whole(1), t0()),
            Err(PackageError::LedgerClosed)
        );
    }

    #[test]
    fn test_view_with_warning() {
        let mut inst = active(10);
        inst.record_lesson_completion(Hours::from_minutes(150), t0()).unwrap();

        let thresholds = vec![ExpiryThreshold {
            days_before: 3,
            severity: WarningSeverity::Warn,
            message_template: Some("{days} days left".into()),
        }];

        let view = inst.view(t0() + Duration::days(29), &thresholds);
        assert_eq!(view.days_until_expiry, 2);
        assert_eq!(view.percent_used, 25.0);
        assert_eq!(view.remaining_hours, Hours::from_minutes(450));
        let warning = view.expiry_warning.unwrap();
        assert_eq!(warning.message.as_deref(), Some("2 days left"));

        let early = inst.view(t0(), &thresholds);
        assert!(early.expiry_warning.is_none());
    }

    #[test]
    fn test_record_round_trip() {
        let mut inst = active(10);
        inst.record_lesson_completion(Hours::whole(2), t0()).unwrap();

        let record = inst.to_record();
        let restored = PackageInstance::from_record(record.clone(), Some(&template())).unwrap();
        assert_eq!(restored.to_record(), record);
        assert_eq!(restored.subjects(), &["math".to_string()]);

        // Subjects survive the template leaving the catalog
        let orphan = PackageInstance::from_record(record.clone(), None).unwrap();
        assert_eq!(orphan.subjects(), &["math".to_string()]);
        assert_eq!(orphan.view(t0(), &[]).template_name, "math-10h");

        // Older records without subjects fall back to the template
        let legacy = PackageRecord {
            subjects: Vec::new(),
            ..record
        };
        let restored = PackageInstance::from_record(legacy.clone(), Some(&template())).unwrap();
        assert_eq!(restored.subjects(), &["math".to_string()]);
        assert!(PackageInstance::from_record(legacy, None).unwrap().subjects().is_empty());
    }
}
