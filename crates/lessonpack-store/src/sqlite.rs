//! SQLite-based store implementation

use chrono::DateTime;
use lessonpack_api::{AssignmentRecord, PackageRecord, PaymentRecord};
use lessonpack_util::{InstanceId, TemplateId};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, AuditEventType, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Package instances; seq keeps creation order across upserts
            CREATE TABLE IF NOT EXISTS packages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                student_id TEXT,
                tutor_id TEXT,
                status TEXT NOT NULL,
                record_json TEXT NOT NULL
            );

            -- Assignment records (append-only)
            CREATE TABLE IF NOT EXISTS assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id TEXT NOT NULL,
                record_json TEXT NOT NULL
            );

            -- Offline payments; seq keeps recording order across upserts
            CREATE TABLE IF NOT EXISTS payments (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                instance_id TEXT NOT NULL,
                reference TEXT,
                record_json TEXT NOT NULL
            );

            -- Template activation overrides
            CREATE TABLE IF NOT EXISTS template_state (
                template_id TEXT PRIMARY KEY,
                active INTEGER NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_packages_student ON packages(student_id);
            CREATE INDEX IF NOT EXISTS idx_packages_tutor ON packages(tutor_id);
            CREATE INDEX IF NOT EXISTS idx_assignments_instance ON assignments(instance_id);
            CREATE INDEX IF NOT EXISTS idx_payments_instance ON payments(instance_id);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn save_package(&self, record: &PackageRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        let record_json = serde_json::to_string(record)?;

        conn.execute(
            r#"
            INSERT INTO packages (id, student_id, tutor_id, status, record_json)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET
                student_id = excluded.student_id,
                tutor_id = excluded.tutor_id,
                status = excluded.status,
                record_json = excluded.record_json
            "#,
            params![
                record.id.to_string(),
                record.student_id.as_ref().map(|s| s.as_str()),
                record.tutor_id.as_ref().map(|t| t.as_str()),
                record.status.as_str(),
                record_json
            ],
        )?;

        debug!(instance_id = %record.id, status = %record.status, "Package saved");
        Ok(())
    }

    fn get_package(&self, id: &InstanceId) -> StoreResult<Option<PackageRecord>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM packages WHERE id = ?",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn load_packages(&self) -> StoreResult<Vec<PackageRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT record_json FROM packages ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }

        Ok(records)
    }

    fn append_assignment(&self, record: &AssignmentRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        let record_json = serde_json::to_string(record)?;

        conn.execute(
            "INSERT INTO assignments (instance_id, record_json) VALUES (?, ?)",
            params![record.instance_id.to_string(), record_json],
        )?;

        debug!(instance_id = %record.instance_id, "Assignment appended");
        Ok(())
    }

    fn get_assignments(&self, instance_id: &InstanceId) -> StoreResult<Vec<AssignmentRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT record_json FROM assignments WHERE instance_id = ? ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([instance_id.to_string()], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }

        Ok(records)
    }

    fn save_payment(&self, record: &PaymentRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        let record_json = serde_json::to_string(record)?;

        conn.execute(
            r#"
            INSERT INTO payments (id, instance_id, reference, record_json)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET
                reference = excluded.reference,
                record_json = excluded.record_json
            "#,
            params![
                record.id.to_string(),
                record.instance_id.to_string(),
                record.reference.as_deref(),
                record_json
            ],
        )?;

        debug!(payment_id = %record.id, instance_id = %record.instance_id, "Payment saved");
        Ok(())
    }

    fn load_payments(&self) -> StoreResult<Vec<PaymentRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT record_json FROM payments ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }

        Ok(records)
    }

    fn set_template_active(&self, template_id: &TemplateId, active: bool) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO template_state (template_id, active)
            VALUES (?, ?)
            ON CONFLICT(template_id)
            DO UPDATE SET active = excluded.active
            "#,
            params![template_id.as_str(), active],
        )?;

        debug!(template_id = %template_id, active, "Template state set");
        Ok(())
    }

    fn load_template_states(&self) -> StoreResult<Vec<(TemplateId, bool)>> {
        let conn = self.conn()?;

        let mut stmt =
            conn.prepare("SELECT template_id, active FROM template_state ORDER BY template_id")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let active: bool = row.get(1)?;
            Ok((TemplateId::new(id), active))
        })?;

        let mut states = Vec::new();
        for row in rows {
            states.push(row?);
        }

        Ok(states)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.to_utc())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lessonpack_api::{Hours, PackageStatus, PaymentMethod, PaymentStatus};
    use lessonpack_util::{AdminId, PaymentId, StudentId, TutorId};

    fn record(student: &str) -> PackageRecord {
        let now = Utc::now();
        PackageRecord {
            id: InstanceId::new(),
            template_id: TemplateId::new("math-10h"),
            subjects: vec!["math".into()],
            student_id: Some(StudentId::new(student)),
            tutor_id: None,
            total_hours: Hours::whole(10),
            used_hours: Hours::ZERO,
            status: PackageStatus::Pending,
            created_at: now,
            activated_at: None,
            completed_at: None,
            expiry_date: now + chrono::Duration::days(31),
            notes: None,
        }
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
            .unwrap();
        store
            .append_audit(AuditEvent::new(AuditEventType::ConfigLoaded {
                template_count: 3,
            }))
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        // newest first
        assert!(matches!(
            events[0].event,
            AuditEventType::ConfigLoaded { template_count: 3 }
        ));
        assert!(matches!(events[1].event, AuditEventType::ServiceStarted));

        assert_eq!(store.get_recent_audits(1).unwrap().len(), 1);
    }

    #[test]
    fn test_package_upsert_keeps_insertion_order() {
        let store = SqliteStore::in_memory().unwrap();

        let mut first = record("s1");
        let second = record("s2");
        store.save_package(&first).unwrap();
        store.save_package(&second).unwrap();

        // Update the first one after the second was written
        first.tutor_id = Some(TutorId::new("t1"));
        first.status = PackageStatus::Active;
        first.used_hours = Hours::whole(2);
        store.save_package(&first).unwrap();

        let loaded = store.load_packages().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], first);
        assert_eq!(loaded[1], second);

        let fetched = store.get_package(&first.id).unwrap().unwrap();
        assert_eq!(fetched.status, PackageStatus::Active);
        assert!(store.get_package(&InstanceId::new()).unwrap().is_none());
    }

    #[test]
    fn test_assignments() {
        let store = SqliteStore::in_memory().unwrap();
        let pkg = record("s1");

        let assignment = AssignmentRecord {
            instance_id: pkg.id,
            template_id: pkg.template_id.clone(),
            student_id: StudentId::new("s1"),
            tutor_id: None,
            assigned_by: AdminId::new("admin"),
            assigned_at: Utc::now(),
            notes: Some("trial".into()),
        };
        store.append_assignment(&assignment).unwrap();

        let tutor_binding = AssignmentRecord {
            tutor_id: Some(TutorId::new("t1")),
            notes: None,
            ..assignment.clone()
        };
        store.append_assignment(&tutor_binding).unwrap();

        let records = store.get_assignments(&pkg.id).unwrap();
        assert_eq!(records, vec![assignment, tutor_binding]);
        assert!(store.get_assignments(&InstanceId::new()).unwrap().is_empty());
    }

    #[test]
    fn test_payment_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        let pkg = record("s1");

        let mut payment = PaymentRecord {
            id: PaymentId::new(),
            instance_id: pkg.id,
            student_id: pkg.student_id.clone(),
            amount_cents: 25_000,
            method: PaymentMethod::Cash,
            reference: None,
            status: PaymentStatus::Pending,
            recorded_by: AdminId::new("admin"),
            recorded_at: Utc::now(),
            confirmed_by: None,
            confirmed_at: None,
        };
        let other = PaymentRecord {
            id: PaymentId::new(),
            reference: Some("TRX-9".into()),
            ..payment.clone()
        };
        store.save_payment(&payment).unwrap();
        store.save_payment(&other).unwrap();

        payment.status = PaymentStatus::Completed;
        payment.confirmed_by = Some(AdminId::new("admin"));
        payment.confirmed_at = Some(Utc::now());
        store.save_payment(&payment).unwrap();

        assert_eq!(store.load_payments().unwrap(), vec![payment, other]);
    }

    #[test]
    fn test_template_state() {
        let store = SqliteStore::in_memory().unwrap();
        let id = TemplateId::new("math-10h");

        assert!(store.load_template_states().unwrap().is_empty());

        store.set_template_active(&id, false).unwrap();
        assert_eq!(store.load_template_states().unwrap(), vec![(id.clone(), false)]);

        store.set_template_active(&id, true).unwrap();
        assert_eq!(store.load_template_states().unwrap(), vec![(id, true)]);
    }

    #[test]
    fn test_reopen_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lessonpack.db");
        let pkg = record("s1");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_package(&pkg).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load_packages().unwrap(), vec![pkg]);
    }
}
