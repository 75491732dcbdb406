//! SQLite appointment store.
//!
//! Query helpers take a plain `&Connection` so the lifecycle manager can run
//! several of them inside one transaction; [`SqliteStore`] owns the tenant's
//! connection behind a mutex and exposes the same operations.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{
    params, params_from_iter, types::Value, Connection, OptionalExtension, Row,
    TransactionBehavior,
};
use slotwise_core::{AppointmentId, TenantId};
use tracing::{debug, info, warn};

use crate::{
    db::init_db,
    error::Result,
    policy::AvailabilityPolicy,
    types::{Appointment, AppointmentFilter, AppointmentStatus, Page},
};

/// The store operations the validator and the reminder sweep depend on.
pub trait AppointmentStore {
    /// Pending or confirmed appointments of `tenant` overlapping `[start, end)`.
    ///
    /// Implementations may over-return rows that start before `end` but end
    /// before `start`; callers finish the overlap test in memory.
    fn find_overlapping(
        &self,
        tenant: &TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<&AppointmentId>,
    ) -> Result<Vec<Appointment>>;

    /// Pending or confirmed appointments starting in `[now, until]`, or just
    /// `only` (when still active) regardless of the window.
    fn find_due_candidates(
        &self,
        tenant: &TenantId,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        only: Option<&AppointmentId>,
    ) -> Result<Vec<Appointment>>;

    /// Add `offset` to the appointment's delivered set. Returns `true` when
    /// the offset was not recorded before.
    fn add_sent_offset(
        &self,
        tenant: &TenantId,
        id: &AppointmentId,
        offset: i64,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    fn find_by_id(&self, tenant: &TenantId, id: &AppointmentId) -> Result<Option<Appointment>>;
}

/// Audit timestamp format. Fixed width so stored values sort as text.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

const APPOINTMENT_COLUMNS: &str = "id, tenant_id, subject_id, service_ids, start_at, \
     duration_minutes, total_price_cents, status, notes, reminder_offsets, created_at, updated_at";

const ACTIVE_STATUSES: &str = "status IN ('pending', 'confirmed')";

/// Raw column values, decoded in a second step so a corrupt row can be
/// skipped without failing the whole query.
struct RawAppointment {
    id: String,
    tenant_id: String,
    subject_id: String,
    service_ids: String,
    start_at: i64,
    duration_minutes: u32,
    total_price_cents: i64,
    status: String,
    notes: String,
    reminder_offsets: String,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawAppointment> {
    Ok(RawAppointment {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        subject_id: row.get(2)?,
        service_ids: row.get(3)?,
        start_at: row.get(4)?,
        duration_minutes: row.get(5)?,
        total_price_cents: row.get(6)?,
        status: row.get(7)?,
        notes: row.get(8)?,
        reminder_offsets: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn decode(conn: &Connection, raw: RawAppointment) -> Result<Option<Appointment>> {
    let Some(start) = DateTime::from_timestamp(raw.start_at, 0) else {
        warn!(appointment_id = %raw.id, start_at = raw.start_at, "start out of range; row skipped");
        return Ok(None);
    };
    let status: AppointmentStatus = match raw.status.parse() {
        Ok(s) => s,
        Err(e) => {
            warn!(appointment_id = %raw.id, "{e}; row skipped");
            return Ok(None);
        }
    };
    let (service_ids, reminder_offsets) = match (
        serde_json::from_str(&raw.service_ids),
        serde_json::from_str(&raw.reminder_offsets),
    ) {
        (Ok(s), Ok(r)) => (s, r),
        _ => {
            warn!(appointment_id = %raw.id, "bad JSON list column; row skipped");
            return Ok(None);
        }
    };
    let sent_offsets = sent_offsets(conn, &raw.id)?;
    Ok(Some(Appointment {
        id: raw.id.into(),
        tenant_id: raw.tenant_id.into(),
        subject_id: raw.subject_id.into(),
        service_ids,
        start,
        duration_minutes: raw.duration_minutes,
        total_price_cents: raw.total_price_cents,
        status,
        notes: raw.notes,
        reminder_offsets,
        sent_offsets,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    }))
}

fn sent_offsets(conn: &Connection, appointment_id: &str) -> Result<BTreeSet<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT offset_minutes FROM reminder_deliveries WHERE appointment_id = ?1",
    )?;
    let offsets = stmt
        .query_map([appointment_id], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<BTreeSet<i64>>>()?;
    Ok(offsets)
}

fn query_appointments(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Appointment>> {
    let raws: Vec<RawAppointment> = {
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(args, read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };
    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
        if let Some(a) = decode(conn, raw)? {
            out.push(a);
        }
    }
    Ok(out)
}

pub fn insert_appointment(conn: &Connection, a: &Appointment) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO appointments ({APPOINTMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ),
        params![
            a.id.as_str(),
            a.tenant_id.as_str(),
            a.subject_id.as_str(),
            serde_json::to_string(&a.service_ids)?,
            a.start.timestamp(),
            a.duration_minutes,
            a.total_price_cents,
            a.status.to_string(),
            a.notes,
            serde_json::to_string(&a.reminder_offsets)?,
            a.created_at,
            a.updated_at,
        ],
    )?;
    debug!(tenant = %a.tenant_id, appointment_id = %a.id, "appointment inserted");
    Ok(())
}

/// Overwrite the mutable columns of an existing appointment.
/// Delivered offsets live in their own table and are never touched here.
pub fn update_appointment(conn: &Connection, a: &Appointment) -> Result<bool> {
    let n = conn.execute(
        "UPDATE appointments
         SET service_ids = ?3, start_at = ?4, duration_minutes = ?5,
             total_price_cents = ?6, status = ?7, notes = ?8,
             reminder_offsets = ?9, updated_at = ?10
         WHERE tenant_id = ?1 AND id = ?2",
        params![
            a.tenant_id.as_str(),
            a.id.as_str(),
            serde_json::to_string(&a.service_ids)?,
            a.start.timestamp(),
            a.duration_minutes,
            a.total_price_cents,
            a.status.to_string(),
            a.notes,
            serde_json::to_string(&a.reminder_offsets)?,
            a.updated_at,
        ],
    )?;
    Ok(n > 0)
}

pub fn set_status(
    conn: &Connection,
    tenant: &TenantId,
    id: &AppointmentId,
    status: AppointmentStatus,
    at: DateTime<Utc>,
) -> Result<bool> {
    let n = conn.execute(
        "UPDATE appointments SET status = ?3, updated_at = ?4
         WHERE tenant_id = ?1 AND id = ?2",
        params![tenant.as_str(), id.as_str(), status.to_string(), timestamp(at)],
    )?;
    Ok(n > 0)
}

pub fn delete_appointment(
    conn: &Connection,
    tenant: &TenantId,
    id: &AppointmentId,
) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM appointments WHERE tenant_id = ?1 AND id = ?2",
        params![tenant.as_str(), id.as_str()],
    )?;
    if n > 0 {
        conn.execute(
            "DELETE FROM reminder_deliveries WHERE appointment_id = ?1",
            [id.as_str()],
        )?;
    }
    Ok(n > 0)
}

pub fn get_appointment(
    conn: &Connection,
    tenant: &TenantId,
    id: &AppointmentId,
) -> Result<Option<Appointment>> {
    let raw = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE tenant_id = ?1 AND id = ?2"),
            params![tenant.as_str(), id.as_str()],
            read_row,
        )
        .optional()?;
    match raw {
        Some(raw) => decode(conn, raw),
        None => Ok(None),
    }
}

/// Filtered, paged listing ordered by start.
pub fn list_appointments(
    conn: &Connection,
    tenant: &TenantId,
    filter: &AppointmentFilter,
) -> Result<Page<Appointment>> {
    let mut clauses = vec!["tenant_id = ?"];
    let mut args: Vec<Value> = vec![Value::Text(tenant.to_string())];
    if let Some(from) = filter.from {
        clauses.push("start_at >= ?");
        args.push(Value::Integer(from.timestamp()));
    }
    if let Some(to) = filter.to {
        clauses.push("start_at < ?");
        args.push(Value::Integer(to.timestamp()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        args.push(Value::Text(status.to_string()));
    }
    if let Some(subject) = &filter.subject_id {
        clauses.push("subject_id = ?");
        args.push(Value::Text(subject.to_string()));
    }
    let where_sql = clauses.join(" AND ");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM appointments WHERE {where_sql}"),
        params_from_iter(args.iter()),
        |r| r.get(0),
    )?;

    let (page, limit) = filter.paging();
    let offset = i64::from(page - 1) * i64::from(limit);
    args.push(Value::Integer(i64::from(limit)));
    args.push(Value::Integer(offset));
    let items = query_appointments(
        conn,
        &format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE {where_sql}
             ORDER BY start_at, id LIMIT ? OFFSET ?"
        ),
        params_from_iter(args.iter()),
    )?;

    Ok(Page {
        items,
        total: total.max(0) as u64,
        page,
        limit,
    })
}

/// Hard-delete cancelled appointments last touched before `older_than`.
pub fn purge_cancelled(
    conn: &Connection,
    tenant: &TenantId,
    older_than: DateTime<Utc>,
) -> Result<usize> {
    let cutoff = timestamp(older_than);
    conn.execute(
        "DELETE FROM reminder_deliveries WHERE appointment_id IN (
             SELECT id FROM appointments
             WHERE tenant_id = ?1 AND status = 'cancelled' AND updated_at < ?2)",
        params![tenant.as_str(), cutoff],
    )?;
    let n = conn.execute(
        "DELETE FROM appointments
         WHERE tenant_id = ?1 AND status = 'cancelled' AND updated_at < ?2",
        params![tenant.as_str(), cutoff],
    )?;
    if n > 0 {
        info!(%tenant, purged = n, "stale cancelled appointments purged");
    }
    Ok(n)
}

pub fn load_policy(conn: &Connection, tenant: &TenantId) -> Result<Option<AvailabilityPolicy>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM policies WHERE tenant_id = ?1",
            [tenant.as_str()],
            |r| r.get(0),
        )
        .optional()?;
    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

pub fn save_policy(
    conn: &Connection,
    tenant: &TenantId,
    policy: &AvailabilityPolicy,
    at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO policies (tenant_id, body, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(tenant_id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        params![tenant.as_str(), serde_json::to_string(policy)?, timestamp(at)],
    )?;
    info!(%tenant, timezone = %policy.timezone, "availability policy saved");
    Ok(())
}

impl AppointmentStore for Connection {
    fn find_overlapping(
        &self,
        tenant: &TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<&AppointmentId>,
    ) -> Result<Vec<Appointment>> {
        let mut found = query_appointments(
            self,
            &format!(
                "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                 WHERE tenant_id = ?1 AND {ACTIVE_STATUSES} AND start_at < ?2"
            ),
            params![tenant.as_str(), end.timestamp()],
        )?;
        found.retain(|a| a.end() > start && Some(&a.id) != exclude);
        Ok(found)
    }

    fn find_due_candidates(
        &self,
        tenant: &TenantId,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        only: Option<&AppointmentId>,
    ) -> Result<Vec<Appointment>> {
        match only {
            Some(id) => query_appointments(
                self,
                &format!(
                    "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                     WHERE tenant_id = ?1 AND id = ?2 AND {ACTIVE_STATUSES}"
                ),
                params![tenant.as_str(), id.as_str()],
            ),
            None => query_appointments(
                self,
                &format!(
                    "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                     WHERE tenant_id = ?1 AND {ACTIVE_STATUSES}
                       AND start_at >= ?2 AND start_at <= ?3
                     ORDER BY start_at"
                ),
                params![tenant.as_str(), now.timestamp(), until.timestamp()],
            ),
        }
    }

    fn add_sent_offset(
        &self,
        tenant: &TenantId,
        id: &AppointmentId,
        offset: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let n = self.execute(
            "INSERT OR IGNORE INTO reminder_deliveries (appointment_id, offset_minutes, sent_at)
             SELECT id, ?3, ?4 FROM appointments WHERE tenant_id = ?1 AND id = ?2",
            params![tenant.as_str(), id.as_str(), offset, timestamp(at)],
        )?;
        Ok(n > 0)
    }

    fn find_by_id(&self, tenant: &TenantId, id: &AppointmentId) -> Result<Option<Appointment>> {
        get_appointment(self, tenant, id)
    }
}

/// One tenant's database behind a mutex.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Run `f` with the connection locked.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }

    /// Run `f` inside an immediate transaction with the connection locked.
    /// Commits when `f` returns `Ok`, rolls back otherwise.
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn load_policy(&self, tenant: &TenantId) -> Result<Option<AvailabilityPolicy>> {
        self.with_conn(|c| load_policy(c, tenant))
    }

    pub fn save_policy(&self, tenant: &TenantId, policy: &AvailabilityPolicy) -> Result<()> {
        self.with_conn(|c| save_policy(c, tenant, policy, Utc::now()))
    }

    pub fn list(&self, tenant: &TenantId, filter: &AppointmentFilter) -> Result<Page<Appointment>> {
        self.with_conn(|c| list_appointments(c, tenant, filter))
    }

    pub fn purge_cancelled(&self, tenant: &TenantId, older_than: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|c| purge_cancelled(c, tenant, older_than))
    }
}

impl AppointmentStore for SqliteStore {
    fn find_overlapping(
        &self,
        tenant: &TenantId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<&AppointmentId>,
    ) -> Result<Vec<Appointment>> {
        self.with_conn(|c| c.find_overlapping(tenant, start, end, exclude))
    }

    fn find_due_candidates(
        &self,
        tenant: &TenantId,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        only: Option<&AppointmentId>,
    ) -> Result<Vec<Appointment>> {
        self.with_conn(|c| c.find_due_candidates(tenant, now, until, only))
    }

    fn add_sent_offset(
        &self,
        tenant: &TenantId,
        id: &AppointmentId,
        offset: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|c| c.add_sent_offset(tenant, id, offset, at))
    }

    fn find_by_id(&self, tenant: &TenantId, id: &AppointmentId) -> Result<Option<Appointment>> {
        self.with_conn(|c| get_appointment(c, tenant, id))
    }
}
