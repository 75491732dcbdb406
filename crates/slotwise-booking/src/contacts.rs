use rusqlite::{params, Connection, OptionalExtension};
use slotwise_core::{SubjectId, TenantId};

use crate::{error::Result, store::SqliteStore, types::Contact};

pub fn get_contact(
    conn: &Connection,
    tenant: &TenantId,
    subject: &SubjectId,
) -> Result<Option<Contact>> {
    let contact = conn
        .query_row(
            "SELECT subject_id, name, email FROM clients WHERE tenant_id = ?1 AND subject_id = ?2",
            params![tenant.as_str(), subject.as_str()],
            |row| {
                Ok(Contact {
                    subject_id: row.get::<_, String>(0)?.into(),
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(contact)
}

/// Insert or replace a client's contact row. Blank emails are stored as NULL.
pub fn upsert_contact(conn: &Connection, tenant: &TenantId, contact: &Contact) -> Result<()> {
    let email = contact
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    conn.execute(
        "INSERT INTO clients (tenant_id, subject_id, name, email) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(tenant_id, subject_id) DO UPDATE SET name = excluded.name, email = excluded.email",
        params![tenant.as_str(), contact.subject_id.as_str(), contact.name, email],
    )?;
    Ok(())
}

impl SqliteStore {
    pub fn get_contact(&self, tenant: &TenantId, subject: &SubjectId) -> Result<Option<Contact>> {
        self.with_conn(|c| get_contact(c, tenant, subject))
    }

    pub fn upsert_contact(&self, tenant: &TenantId, contact: &Contact) -> Result<()> {
        self.with_conn(|c| upsert_contact(c, tenant, contact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_email_is_stored_as_missing() {
        let s = SqliteStore::in_memory().unwrap();
        let t: TenantId = "acme".into();
        let mut c = Contact {
            subject_id: "client-1".into(),
            name: "Ana".into(),
            email: Some("  ".into()),
        };
        s.upsert_contact(&t, &c).unwrap();
        assert_eq!(s.get_contact(&t, &c.subject_id).unwrap().unwrap().email, None);

        c.email = Some("ana@example.com".into());
        s.upsert_contact(&t, &c).unwrap();
        assert_eq!(s.get_contact(&t, &c.subject_id).unwrap(), Some(c.clone()));
        assert!(s.get_contact(&"globex".into(), &c.subject_id).unwrap().is_none());
    }
}
