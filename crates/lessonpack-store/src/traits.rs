//! Store trait definitions

use lessonpack_api::{AssignmentRecord, PackageRecord, PaymentRecord};
use lessonpack_util::{InstanceId, TemplateId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Package records

    /// Insert or replace a package record. Replacing keeps its original position.
    fn save_package(&self, record: &PackageRecord) -> StoreResult<()>;

    /// Get a single package record
    fn get_package(&self, id: &InstanceId) -> StoreResult<Option<PackageRecord>>;

    /// Load every package record in insertion order
    fn load_packages(&self) -> StoreResult<Vec<PackageRecord>>;

    // Assignments

    /// Append an assignment record
    fn append_assignment(&self, record: &AssignmentRecord) -> StoreResult<()>;

    /// Assignment records for one instance, oldest first
    fn get_assignments(&self, instance_id: &InstanceId) -> StoreResult<Vec<AssignmentRecord>>;

    // Payments

    /// Insert or replace a payment record
    fn save_payment(&self, record: &PaymentRecord) -> StoreResult<()>;

    /// Load every payment record in insertion order
    fn load_payments(&self) -> StoreResult<Vec<PaymentRecord>>;

    // Template state

    /// Persist a template's activation flag
    fn set_template_active(&self, template_id: &TemplateId, active: bool) -> StoreResult<()>;

    /// Load every persisted activation flag
    fn load_template_states(&self) -> StoreResult<Vec<(TemplateId, bool)>>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
