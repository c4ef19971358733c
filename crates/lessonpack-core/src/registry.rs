//! Assignment registry
//!
//! Owns every package instance and the student/tutor/template catalog. Each
//! instance sits behind its own mutex so lessons on one package serialize
//! while different packages proceed in parallel. The instance map lock is
//! never acquired while an instance lock is held.

use chrono::{DateTime, Duration, Utc};
use lessonpack_api::{
    AssignmentRecord, Hours, PackageEvent, PackageStatus, PackageTemplate, PackageView,
    PaymentMethod, PaymentRecord, PaymentStatus,
};
use lessonpack_config::{EngineSettings, Policy, RefundPolicy};
use lessonpack_store::{AuditEvent, AuditEventType, Store, StoreResult};
use lessonpack_util::{AdminId, InstanceId, PaymentId, StudentId, TemplateId, TutorId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::lifecycle::{self, Operation};
use crate::{PackageError, PackageInstance, PackageResult};

/// Admin who stands behind self-service purchases
pub const SELF_SERVICE_ADMIN: &str = "self-service";

/// Request to open a package instance for a student
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub student_id: StudentId,
    /// Falls back to the template's tutor when unset
    pub tutor_id: Option<TutorId>,
    pub template_id: TemplateId,
    pub assigned_by: AdminId,
    /// Overrides the template's hours
    pub total_hours: Option<Hours>,
    /// Overrides the validity computed from the template
    pub expiry_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Let the student hold another open package for the same subject
    pub allow_concurrent: bool,
}

impl AssignmentRequest {
    pub fn new(student_id: StudentId, template_id: TemplateId, assigned_by: AdminId) -> Self {
        Self {
            student_id,
            tutor_id: None,
            template_id,
            assigned_by,
            total_hours: None,
            expiry_date: None,
            notes: None,
            allow_concurrent: false,
        }
    }

    pub fn with_tutor(mut self, tutor_id: TutorId) -> Self {
        self.tutor_id = Some(tutor_id);
        self
    }

    pub fn with_hours(mut self, hours: Hours) -> Self {
        self.total_hours = Some(hours);
        self
    }

    pub fn with_expiry(mut self, expiry_date: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Offline payment to record against an instance
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub instance_id: InstanceId,
    pub amount_cents: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub recorded_by: AdminId,
}

impl PaymentRequest {
    pub fn new(
        instance_id: InstanceId,
        amount_cents: u64,
        method: PaymentMethod,
        recorded_by: AdminId,
    ) -> Self {
        Self {
            instance_id,
            amount_cents,
            method,
            reference: None,
            recorded_by,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// A confirmed payment and the state of the instance it pays for
#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub payment: PaymentRecord,
    pub update: PackageUpdate,
}

/// State of an instance after an operation, plus the transitions it caused
#[derive(Debug, Clone, Serialize)]
pub struct PackageUpdate {
    pub view: PackageView,
    pub events: Vec<PackageEvent>,
}

/// Result of cancelling a booked lesson under the refund policy
#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub percent: u8,
    pub refunded: Hours,
    pub update: PackageUpdate,
}

#[derive(Default)]
struct Instances {
    by_id: HashMap<InstanceId, Arc<Mutex<PackageInstance>>>,
    /// Creation order
    order: Vec<InstanceId>,
}

/// Student/tutor/package associations and the operations on them
pub struct AssignmentRegistry {
    store: Arc<dyn Store>,
    settings: EngineSettings,
    refund: RefundPolicy,
    templates: RwLock<HashMap<TemplateId, PackageTemplate>>,
    students: RwLock<HashSet<StudentId>>,
    tutors: RwLock<HashSet<TutorId>>,
    instances: RwLock<Instances>,
    assignments: RwLock<HashMap<InstanceId, Vec<AssignmentRecord>>>,
    /// Recording order
    payments: Mutex<Vec<PaymentRecord>>,
}

impl AssignmentRegistry {
    /// Create a registry from a validated policy
    pub fn new(policy: Policy, store: Arc<dyn Store>) -> Self {
        info!(
            templates = policy.templates.len(),
            students = policy.students.len(),
            tutors = policy.tutors.len(),
            "Assignment registry initialized"
        );

        let registry = Self {
            store,
            settings: policy.engine,
            refund: policy.refund,
            templates: RwLock::new(
                policy
                    .templates
                    .into_iter()
                    .map(|t| (t.id.clone(), t))
                    .collect(),
            ),
            students: RwLock::new(policy.students.into_iter().map(|s| s.id).collect()),
            tutors: RwLock::new(policy.tutors.into_iter().map(|t| t.id).collect()),
            instances: RwLock::new(Instances::default()),
            assignments: RwLock::new(HashMap::new()),
            payments: Mutex::new(Vec::new()),
        };

        let template_count = read(&registry.templates).len();
        registry.audit(AuditEventType::ConfigLoaded { template_count });
        registry
    }

    /// Rebuild instances and template activation state from the store.
    ///
    /// Returns the number of instances loaded.
    pub fn restore(&self) -> StoreResult<usize> {
        let states = self.store.load_template_states()?;
        {
            let mut templates = write(&self.templates);
            for (id, active) in states {
                match templates.get_mut(&id) {
                    Some(t) => t.is_active = active,
                    None => debug!(template_id = %id, "Stored state for unknown template"),
                }
            }
        }

        let records = self.store.load_packages()?;
        let mut loaded = 0;
        for record in records {
            let id = record.id;
            let template = read(&self.templates).get(&record.template_id).cloned();
            if template.is_none() {
                warn!(instance_id = %id, template_id = %record.template_id, "Restoring package of unknown template");
            }

            let instance = match PackageInstance::from_record(record, template.as_ref()) {
                Ok(instance) => instance,
                Err(e) => {
                    warn!(instance_id = %id, error = %e, "Skipping corrupt package record");
                    continue;
                }
            };

            let assignments = self.store.get_assignments(&id)?;
            write(&self.assignments).insert(id, assignments);

            let mut instances = write(&self.instances);
            if instances
                .by_id
                .insert(id, Arc::new(Mutex::new(instance)))
                .is_none()
            {
                instances.order.push(id);
            }
            loaded += 1;
        }

        *lock(&self.payments) = self.store.load_payments()?;

        info!(loaded, "Registry restored from store");
        Ok(loaded)
    }

    // Catalog

    /// Add a template. An existing template with the same id is kept.
    pub fn add_template(&self, template: PackageTemplate) -> bool {
        let mut templates = write(&self.templates);
        if templates.contains_key(&template.id) {
            warn!(template_id = %template.id, "Template already registered");
            return false;
        }
        info!(template_id = %template.id, "Template added");
        templates.insert(template.id.clone(), template);
        true
    }

    pub fn template(&self, id: &TemplateId) -> Option<PackageTemplate> {
        read(&self.templates).get(id).cloned()
    }

    pub fn register_student(&self, id: StudentId) -> bool {
        debug!(student_id = %id, "Student registered");
        write(&self.students).insert(id)
    }

    pub fn register_tutor(&self, id: TutorId) -> bool {
        debug!(tutor_id = %id, "Tutor registered");
        write(&self.tutors).insert(id)
    }

    /// Withdraw a template from sale. Existing instances are unaffected.
    pub fn deactivate_template(&self, id: &TemplateId) -> PackageResult<()> {
        {
            let mut templates = write(&self.templates);
            let template = templates
                .get_mut(id)
                .ok_or_else(|| PackageError::UnknownTemplate(id.clone()))?;
            template.is_active = false;
        }

        if let Err(e) = self.store.set_template_active(id, false) {
            warn!(template_id = %id, error = %e, "Failed to persist template state");
        }
        self.audit(AuditEventType::TemplateDeactivated {
            template_id: id.clone(),
        });

        info!(template_id = %id, "Template deactivated");
        Ok(())
    }

    // Assignment

    pub fn create_assignment(
        &self,
        request: AssignmentRequest,
        now: DateTime<Utc>,
    ) -> PackageResult<PackageUpdate> {
        let template = self
            .template(&request.template_id)
            .ok_or_else(|| PackageError::UnknownTemplate(request.template_id.clone()))?;

        if !read(&self.students).contains(&request.student_id) {
            return Err(PackageError::unknown_student(&request.student_id));
        }
        let tutor_id = request.tutor_id.clone().or_else(|| template.tutor_id.clone());
        if let Some(tutor) = &tutor_id
            && !read(&self.tutors).contains(tutor)
        {
            return Err(PackageError::unknown_tutor(tutor));
        }

        if !template.is_active {
            return Err(PackageError::TemplateInactive(template.id.clone()));
        }

        let total = template.total_hours.resolve(request.total_hours).ok_or_else(|| {
            PackageError::InvalidAmount(format!(
                "template {} has no hour allotment; an override is required",
                template.id
            ))
        })?;

        let expiry_date = match request.expiry_date {
            Some(date) => date,
            None => {
                let days = template
                    .validity_days
                    .unwrap_or(self.settings.default_validity_days);
                Duration::try_days(i64::from(days))
                    .and_then(|validity| now.checked_add_signed(validity))
                    .ok_or_else(|| {
                        PackageError::InvalidAmount(format!(
                            "validity of {} days is out of range",
                            days
                        ))
                    })?
            }
        };

        let mut instance =
            PackageInstance::new(&template, total, now, expiry_date, request.notes.clone())?;

        // Hold the map lock across the subject check and the insert
        let mut instances = write(&self.instances);

        let allow_concurrent = request.allow_concurrent || self.settings.allow_concurrent_per_subject;
        if !allow_concurrent {
            self.check_open_subjects(&instances, &request.student_id, &template, now)?;
        }

        instance.assign(request.student_id.clone(), tutor_id.clone())?;
        let events = instance.refresh(now);
        let id = instance.id();

        let record = AssignmentRecord {
            instance_id: id,
            template_id: template.id.clone(),
            student_id: request.student_id.clone(),
            tutor_id: tutor_id.clone(),
            assigned_by: request.assigned_by.clone(),
            assigned_at: now,
            notes: request.notes,
        };

        self.persist(&instance);
        self.audit(AuditEventType::PackageCreated {
            instance_id: id,
            template_id: template.id.clone(),
            student_id: request.student_id.clone(),
            total_hours: total,
            expiry_date,
        });
        self.record_assignment(record);
        self.publish(&events);

        let view = instance.view(now, &self.settings.expiry_warnings);
        instances.by_id.insert(id, Arc::new(Mutex::new(instance)));
        instances.order.push(id);

        info!(
            instance_id = %id,
            template_id = %template.id,
            student_id = %request.student_id,
            status = %view.status,
            "Package assigned"
        );

        Ok(PackageUpdate { view, events })
    }

    /// Student self-purchase: an assignment without an explicit tutor
    pub fn purchase(
        &self,
        student_id: StudentId,
        template_id: TemplateId,
        now: DateTime<Utc>,
    ) -> PackageResult<PackageUpdate> {
        let request =
            AssignmentRequest::new(student_id, template_id, AdminId::new(SELF_SERVICE_ADMIN));
        self.create_assignment(request, now)
    }

    pub fn bind_tutor(
        &self,
        id: &InstanceId,
        tutor_id: TutorId,
        assigned_by: AdminId,
        now: DateTime<Utc>,
    ) -> PackageResult<PackageUpdate> {
        if !read(&self.tutors).contains(&tutor_id) {
            return Err(PackageError::unknown_tutor(&tutor_id));
        }

        self.mutate(id, now, |instance| {
            instance.bind_tutor(tutor_id.clone())?;

            if let Some(student_id) = instance.student_id() {
                self.record_assignment(AssignmentRecord {
                    instance_id: instance.id(),
                    template_id: instance.template_id().clone(),
                    student_id: student_id.clone(),
                    tutor_id: Some(tutor_id.clone()),
                    assigned_by: assigned_by.clone(),
                    assigned_at: now,
                    notes: None,
                });
            }

            info!(instance_id = %instance.id(), tutor_id = %tutor_id, "Tutor bound");
            Ok(instance.refresh(now))
        })
    }

    // Lessons

    pub fn record_lesson_completion(
        &self,
        id: &InstanceId,
        hours: Hours,
        now: DateTime<Utc>,
    ) -> PackageResult<PackageUpdate> {
        self.mutate(id, now, |instance| {
            let events = instance.record_lesson_completion(hours, now)?;
            let remaining = instance.ledger().remaining();

            self.audit(AuditEventType::LessonRecorded {
                instance_id: instance.id(),
                hours,
                remaining,
            });
            info!(instance_id = %instance.id(), %hours, %remaining, "Lesson recorded");
            Ok(events)
        })
    }

    /// Refund `hours` of a cancelled lesson in full
    pub fn cancel_lesson(
        &self,
        id: &InstanceId,
        hours: Hours,
        now: DateTime<Utc>,
    ) -> PackageResult<PackageUpdate> {
        self.mutate(id, now, |instance| {
            let events = instance.cancel_lesson(hours, now)?;
            let remaining = instance.ledger().remaining();

            self.audit(AuditEventType::LessonRefunded {
                instance_id: instance.id(),
                hours,
                remaining,
            });
            info!(instance_id = %instance.id(), %hours, %remaining, "Lesson refunded");
            Ok(events)
        })
    }

    /// Cancel a booked lesson, refunding according to the notice given
    pub fn cancel_booking(
        &self,
        id: &InstanceId,
        lesson_hours: Hours,
        lesson_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PackageResult<RefundOutcome> {
        let percent = self.refund.refund_percent(lesson_start, now);
        let refunded = self.refund.refundable(lesson_hours, lesson_start, now);

        let update = if refunded.is_zero() {
            debug!(instance_id = %id, percent, "Cancellation without refund");
            self.mutate(id, now, |instance| {
                lifecycle::check_operation(instance.status(), Operation::CancelLesson)?;
                Ok(Vec::new())
            })?
        } else {
            self.cancel_lesson(id, refunded, now)?
        };

        Ok(RefundOutcome {
            percent,
            refunded,
            update,
        })
    }

    // Explicit transitions

    pub fn suspend(
        &self,
        id: &InstanceId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> PackageResult<PackageUpdate> {
        self.mutate(id, now, |instance| instance.suspend(reason.clone(), now))
    }

    pub fn resume(&self, id: &InstanceId, now: DateTime<Utc>) -> PackageResult<PackageUpdate> {
        self.mutate(id, now, |instance| instance.resume(now))
    }

    pub fn force_complete(
        &self,
        id: &InstanceId,
        now: DateTime<Utc>,
    ) -> PackageResult<PackageUpdate> {
        self.mutate(id, now, |instance| instance.force_complete(now))
    }

    // Offline payments

    /// Record a payment received outside any gateway, pending confirmation.
    ///
    /// A reference already settled by a completed payment returns that payment.
    pub fn record_payment(
        &self,
        request: PaymentRequest,
        now: DateTime<Utc>,
    ) -> PackageResult<PaymentRecord> {
        if request.amount_cents == 0 {
            return Err(PackageError::InvalidAmount(
                "payment amount must be positive".into(),
            ));
        }
        let student_id = lock(&*self.handle(&request.instance_id)?)
            .student_id()
            .cloned();
        let reference = request
            .reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let mut payments = lock(&self.payments);
        if let Some(reference) = &reference
            && let Some(settled) = payments.iter().find(|p| p.settles_reference(reference))
        {
            debug!(payment_id = %settled.id, %reference, "Reference already settled");
            return Ok(settled.clone());
        }

        let payment = PaymentRecord {
            id: PaymentId::new(),
            instance_id: request.instance_id,
            student_id,
            amount_cents: request.amount_cents,
            method: request.method,
            reference,
            status: PaymentStatus::Pending,
            recorded_by: request.recorded_by,
            recorded_at: now,
            confirmed_by: None,
            confirmed_at: None,
        };
        self.persist_payment(&payment);
        payments.push(payment.clone());
        drop(payments);

        self.audit(AuditEventType::PaymentRecorded {
            payment_id: payment.id,
            instance_id: payment.instance_id,
            amount_cents: payment.amount_cents,
            recorded_by: payment.recorded_by.clone(),
        });
        info!(
            payment_id = %payment.id,
            instance_id = %payment.instance_id,
            amount_cents = payment.amount_cents,
            method = %payment.method,
            "Payment recorded"
        );
        Ok(payment)
    }

    /// Confirm receipt of a recorded payment.
    ///
    /// Confirming twice, or confirming a reference another payment already
    /// settled, returns the completed payment unchanged. With
    /// `resume_on_payment`, a suspended instance is resumed.
    pub fn confirm_payment(
        &self,
        payment_id: &PaymentId,
        confirmed_by: AdminId,
        now: DateTime<Utc>,
    ) -> PackageResult<PaymentConfirmation> {
        let payment = {
            let mut payments = lock(&self.payments);
            let index = payments
                .iter()
                .position(|p| &p.id == payment_id)
                .ok_or(PackageError::UnknownPayment(*payment_id))?;

            let settled = payments[index].reference.as_deref().and_then(|reference| {
                payments
                    .iter()
                    .find(|p| &p.id != payment_id && p.settles_reference(reference))
                    .cloned()
            });

            if payments[index].is_completed() {
                payments[index].clone()
            } else if let Some(other) = settled {
                debug!(payment_id = %payment_id, settled_by = %other.id, "Reference already settled");
                other
            } else {
                let payment = &mut payments[index];
                payment.status = PaymentStatus::Completed;
                payment.confirmed_by = Some(confirmed_by.clone());
                payment.confirmed_at = Some(now);
                self.persist_payment(payment);

                self.audit(AuditEventType::PaymentConfirmed {
                    payment_id: payment.id,
                    instance_id: payment.instance_id,
                    confirmed_by,
                });
                info!(payment_id = %payment.id, instance_id = %payment.instance_id, "Payment confirmed");
                payment.clone()
            }
        };

        let resume = self.settings.resume_on_payment;
        let update = self.mutate(&payment.instance_id, now, |instance| {
            if !resume || instance.status() != PackageStatus::Suspended {
                return Ok(Vec::new());
            }
            match instance.resume(now) {
                Ok(events) => Ok(events),
                Err(e) => {
                    warn!(instance_id = %instance.id(), error = %e, "Paid package stays suspended");
                    Ok(Vec::new())
                }
            }
        })?;

        Ok(PaymentConfirmation { payment, update })
    }

    /// Payments recorded against an instance, oldest first
    pub fn payments_for(&self, id: &InstanceId) -> PackageResult<Vec<PaymentRecord>> {
        if !read(&self.instances).by_id.contains_key(id) {
            return Err(PackageError::UnknownPackage(*id));
        }
        Ok(lock(&self.payments)
            .iter()
            .filter(|p| &p.instance_id == id)
            .cloned()
            .collect())
    }

    // Queries

    pub fn view(&self, id: &InstanceId, now: DateTime<Utc>) -> PackageResult<PackageView> {
        self.mutate(id, now, |_| Ok(Vec::new())).map(|u| u.view)
    }

    pub fn list_by_student(&self, student_id: &StudentId, now: DateTime<Utc>) -> Vec<PackageView> {
        self.collect_views(now, |instance| instance.student_id() == Some(student_id))
    }

    pub fn list_by_tutor(&self, tutor_id: &TutorId, now: DateTime<Utc>) -> Vec<PackageView> {
        self.collect_views(now, |instance| instance.tutor_id() == Some(tutor_id))
    }

    /// Tutors bound to any of the student's packages, first binding first
    pub fn tutors_for_student(&self, student_id: &StudentId) -> Vec<TutorId> {
        let mut tutors = Vec::new();
        for handle in self.handles() {
            let instance = lock(&handle);
            if instance.student_id() == Some(student_id)
                && let Some(tutor) = instance.tutor_id()
                && !tutors.contains(tutor)
            {
                tutors.push(tutor.clone());
            }
        }
        tutors
    }

    /// Students holding any package bound to the tutor, first binding first
    pub fn students_for_tutor(&self, tutor_id: &TutorId) -> Vec<StudentId> {
        let mut students = Vec::new();
        for handle in self.handles() {
            let instance = lock(&handle);
            if instance.tutor_id() == Some(tutor_id)
                && let Some(student) = instance.student_id()
                && !students.contains(student)
            {
                students.push(student.clone());
            }
        }
        students
    }

    pub fn assignments_for(&self, id: &InstanceId) -> PackageResult<Vec<AssignmentRecord>> {
        if !read(&self.instances).by_id.contains_key(id) {
            return Err(PackageError::UnknownPackage(*id));
        }
        Ok(read(&self.assignments).get(id).cloned().unwrap_or_default())
    }

    /// Every instance, in creation order
    pub fn list_all(&self, now: DateTime<Utc>) -> Vec<PackageView> {
        self.collect_views(now, |_| true)
    }

    /// Evaluate automatic transitions on every instance
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<PackageEvent> {
        let handles = self.handles();
        let evaluated = handles.len();
        let mut events = Vec::new();

        for handle in handles {
            let mut instance = lock(&handle);
            let changed = instance.refresh(now);
            if !changed.is_empty() {
                self.persist(&instance);
                self.publish(&changed);
                events.extend(changed);
            }
        }

        self.audit(AuditEventType::SweepCompleted {
            evaluated,
            changed: events.len(),
        });
        info!(evaluated, changed = events.len(), "Sweep completed");
        events
    }

    // Internals

    fn handles(&self) -> Vec<Arc<Mutex<PackageInstance>>> {
        let instances = read(&self.instances);
        instances
            .order
            .iter()
            .filter_map(|id| instances.by_id.get(id).cloned())
            .collect()
    }

    fn handle(&self, id: &InstanceId) -> PackageResult<Arc<Mutex<PackageInstance>>> {
        read(&self.instances)
            .by_id
            .get(id)
            .cloned()
            .ok_or(PackageError::UnknownPackage(*id))
    }

    /// Refresh, apply `op`, then persist and publish whatever changed.
    ///
    /// Transitions triggered by the refresh are kept even when `op` fails.
    fn mutate<F>(&self, id: &InstanceId, now: DateTime<Utc>, op: F) -> PackageResult<PackageUpdate>
    where
        F: FnOnce(&mut PackageInstance) -> PackageResult<Vec<PackageEvent>>,
    {
        let handle = self.handle(id)?;
        let mut instance = lock(&handle);
        let before = instance.to_record();

        let mut events = instance.refresh(now);
        let result = op(&mut instance);

        if let Ok(more) = &result {
            events.extend(more.iter().cloned());
        }
        if instance.to_record() != before {
            self.persist(&instance);
        }
        self.publish(&events);

        result.map(|_| PackageUpdate {
            view: instance.view(now, &self.settings.expiry_warnings),
            events,
        })
    }

    fn collect_views<P>(&self, now: DateTime<Utc>, predicate: P) -> Vec<PackageView>
    where
        P: Fn(&PackageInstance) -> bool,
    {
        let mut views = Vec::new();
        for handle in self.handles() {
            let mut instance = lock(&handle);
            if !predicate(&instance) {
                continue;
            }
            let events = instance.refresh(now);
            if !events.is_empty() {
                self.persist(&instance);
                self.publish(&events);
            }
            views.push(instance.view(now, &self.settings.expiry_warnings));
        }
        views
    }

    fn check_open_subjects(
        &self,
        instances: &Instances,
        student_id: &StudentId,
        template: &PackageTemplate,
        now: DateTime<Utc>,
    ) -> PackageResult<()> {
        for id in &instances.order {
            let Some(handle) = instances.by_id.get(id) else {
                continue;
            };
            let mut instance = lock(handle);
            if instance.student_id() != Some(student_id) {
                continue;
            }

            let events = instance.refresh(now);
            if !events.is_empty() {
                self.persist(&instance);
                self.publish(&events);
            }

            if instance.status().is_terminal() {
                continue;
            }
            if let Some(subject) = template
                .subjects
                .iter()
                .find(|s| instance.covers_subject(s))
            {
                return Err(PackageError::AlreadyAssigned(format!(
                    "student {} already holds open package {} for {}",
                    student_id,
                    instance.id(),
                    subject
                )));
            }
        }
        Ok(())
    }

    fn record_assignment(&self, record: AssignmentRecord) {
        if let Err(e) = self.store.append_assignment(&record) {
            warn!(instance_id = %record.instance_id, error = %e, "Failed to persist assignment");
        }
        self.audit(AuditEventType::AssignmentRecorded {
            instance_id: record.instance_id,
            student_id: record.student_id.clone(),
            tutor_id: record.tutor_id.clone(),
            assigned_by: record.assigned_by.clone(),
        });
        write(&self.assignments)
            .entry(record.instance_id)
            .or_default()
            .push(record);
    }

    fn persist(&self, instance: &PackageInstance) {
        if let Err(e) = self.store.save_package(&instance.to_record()) {
            warn!(instance_id = %instance.id(), error = %e, "Failed to persist package");
        }
    }

    fn persist_payment(&self, payment: &PaymentRecord) {
        if let Err(e) = self.store.save_payment(payment) {
            warn!(payment_id = %payment.id, error = %e, "Failed to persist payment");
        }
    }

    fn publish(&self, events: &[PackageEvent]) {
        for event in events {
            info!(
                instance_id = %event.instance_id(),
                status = %event.new_status(),
                "Package status changed"
            );
            self.audit(AuditEventType::StatusChanged {
                event: event.clone(),
            });
        }
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}

// A panic while holding a lock leaves the data consistent: every mutation
// completes before the guard drops, so poisoned locks are recovered.

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
