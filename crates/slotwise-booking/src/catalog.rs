//! Service catalog: the only source of durations and prices for bookings.

use rusqlite::{params, Connection, OptionalExtension};
use slotwise_core::{ServiceId, TenantId};
use tracing::{info, warn};

use crate::{
    error::{BookingError, Result},
    store::SqliteStore,
    types::{DurationUnit, Service, ServiceQuote},
};

pub trait ServiceCatalog {
    /// Quote each id in order. Any unknown or inactive id rejects the whole
    /// request with `UnknownServices`.
    fn quote(&self, tenant: &TenantId, ids: &[ServiceId]) -> Result<Vec<ServiceQuote>>;
}

type ServiceRow = (String, String, i64, u32, String, bool);

fn read_service(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn to_service(raw: ServiceRow) -> Option<Service> {
    let (id, name, price_cents, duration, unit, active) = raw;
    let duration_unit: DurationUnit = match unit.parse() {
        Ok(u) => u,
        Err(e) => {
            warn!(service_id = %id, "{e}; service skipped");
            return None;
        }
    };
    Some(Service {
        id: id.into(),
        name,
        price_cents,
        duration,
        duration_unit,
        active,
    })
}

pub fn get_service(
    conn: &Connection,
    tenant: &TenantId,
    id: &ServiceId,
) -> Result<Option<Service>> {
    let raw = conn
        .query_row(
            "SELECT id, name, price_cents, duration, duration_unit, active
             FROM services WHERE tenant_id = ?1 AND id = ?2",
            params![tenant.as_str(), id.as_str()],
            read_service,
        )
        .optional()?;
    Ok(raw.and_then(to_service))
}

pub fn list_services(conn: &Connection, tenant: &TenantId) -> Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, price_cents, duration, duration_unit, active
         FROM services WHERE tenant_id = ?1 ORDER BY name",
    )?;
    let services = stmt
        .query_map([tenant.as_str()], read_service)?
        .filter_map(|r| r.ok())
        .filter_map(to_service)
        .collect();
    Ok(services)
}

pub fn upsert_service(conn: &Connection, tenant: &TenantId, service: &Service) -> Result<()> {
    service.validate().map_err(BookingError::InvalidRequest)?;
    conn.execute(
        "INSERT INTO services (tenant_id, id, name, price_cents, duration, duration_unit, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(tenant_id, id) DO UPDATE SET
             name = excluded.name, price_cents = excluded.price_cents,
             duration = excluded.duration, duration_unit = excluded.duration_unit,
             active = excluded.active",
        params![
            tenant.as_str(),
            service.id.as_str(),
            service.name,
            service.price_cents,
            service.duration,
            service.duration_unit.to_string(),
            service.active,
        ],
    )?;
    info!(%tenant, service_id = %service.id, "service saved");
    Ok(())
}

impl ServiceCatalog for Connection {
    fn quote(&self, tenant: &TenantId, ids: &[ServiceId]) -> Result<Vec<ServiceQuote>> {
        if ids.is_empty() {
            return Err(BookingError::InvalidRequest(
                "at least one service is required".to_string(),
            ));
        }
        let mut quotes = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match get_service(self, tenant, id)? {
                Some(s) if s.active => quotes.push(ServiceQuote {
                    duration_minutes: s.duration_minutes(),
                    price_cents: s.price_cents,
                }),
                _ => missing.push(id.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(BookingError::UnknownServices(missing));
        }
        Ok(quotes)
    }
}

impl ServiceCatalog for SqliteStore {
    fn quote(&self, tenant: &TenantId, ids: &[ServiceId]) -> Result<Vec<ServiceQuote>> {
        self.with_conn(|c| c.quote(tenant, ids))
    }
}

impl SqliteStore {
    pub fn upsert_service(&self, tenant: &TenantId, service: &Service) -> Result<()> {
        self.with_conn(|c| upsert_service(c, tenant, service))
    }

    pub fn list_services(&self, tenant: &TenantId) -> Result<Vec<Service>> {
        self.with_conn(|c| list_services(c, tenant))
    }
}
