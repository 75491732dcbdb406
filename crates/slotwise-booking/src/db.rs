use rusqlite::Connection;

use crate::error::Result;

/// Initialise the booking schema in `conn`. Idempotent.
///
/// Every table carries `tenant_id` and every query filters on it, even though
/// the registry gives each tenant its own database file.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS appointments (
            id                TEXT    NOT NULL PRIMARY KEY,
            tenant_id         TEXT    NOT NULL,
            subject_id        TEXT    NOT NULL,
            service_ids       TEXT    NOT NULL DEFAULT '[]',   -- JSON array
            start_at          INTEGER NOT NULL,                -- epoch seconds, UTC
            duration_minutes  INTEGER NOT NULL,
            total_price_cents INTEGER NOT NULL DEFAULT 0,
            status            TEXT    NOT NULL DEFAULT 'pending',
            notes             TEXT    NOT NULL DEFAULT '',
            reminder_offsets  TEXT    NOT NULL DEFAULT '[]',   -- JSON array
            created_at        TEXT    NOT NULL,
            updated_at        TEXT    NOT NULL
        ) STRICT;

        -- Overlap and due-window queries: WHERE tenant_id = ? AND status IN (..) AND start_at ..
        CREATE INDEX IF NOT EXISTS idx_appointments_tenant_start
            ON appointments (tenant_id, start_at);
        CREATE INDEX IF NOT EXISTS idx_appointments_subject
            ON appointments (tenant_id, subject_id);

        -- One row per delivered reminder offset. The primary key makes
        -- recording a delivery a set-union.
        CREATE TABLE IF NOT EXISTS reminder_deliveries (
            appointment_id  TEXT    NOT NULL,
            offset_minutes  INTEGER NOT NULL,
            sent_at         TEXT    NOT NULL,
            PRIMARY KEY (appointment_id, offset_minutes)
        ) STRICT;

        CREATE TABLE IF NOT EXISTS policies (
            tenant_id   TEXT NOT NULL PRIMARY KEY,
            body        TEXT NOT NULL,   -- JSON AvailabilityPolicy
            updated_at  TEXT NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS services (
            tenant_id      TEXT    NOT NULL,
            id             TEXT    NOT NULL,
            name           TEXT    NOT NULL,
            price_cents    INTEGER NOT NULL,
            duration       INTEGER NOT NULL,
            duration_unit  TEXT    NOT NULL,
            active         INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (tenant_id, id)
        ) STRICT;

        CREATE TABLE IF NOT EXISTS clients (
            tenant_id   TEXT NOT NULL,
            subject_id  TEXT NOT NULL,
            name        TEXT NOT NULL,
            email       TEXT,
            PRIMARY KEY (tenant_id, subject_id)
        ) STRICT;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 5);
    }
}
