use std::path::PathBuf;
use std::sync::Arc;

use chrono_tz::Tz;
use dashmap::DashMap;
use slotwise_core::clock::{parse_timezone, DEFAULT_TIMEZONE};
use slotwise_core::TenantId;
use tracing::{info, warn};

use crate::{
    error::{BookingError, Result},
    policy::AvailabilityPolicy,
    store::SqliteStore,
};

pub const MAX_TENANT_NAME_LEN: usize = 64;

/// Everything a booking or sweep needs to know about one tenant, resolved
/// once per request and passed explicitly.
#[derive(Clone)]
pub struct TenantContext {
    pub tenant: TenantId,
    pub store: Arc<SqliteStore>,
    /// `None` until the tenant saves a policy.
    pub policy: Option<AvailabilityPolicy>,
    /// Registry default zone, used while no policy is stored.
    pub default_tz: Tz,
}

impl TenantContext {
    /// Zone for local rendering: the policy's, else the registry default.
    pub fn tz(&self) -> Tz {
        self.policy.as_ref().map(|p| p.tz()).unwrap_or(self.default_tz)
    }
}

/// Maps tenant names to their own SQLite store, opened lazily.
pub struct TenantRegistry {
    stores: DashMap<TenantId, Arc<SqliteStore>>,
    /// `None` keeps every tenant in memory.
    data_dir: Option<PathBuf>,
    max_tenants: usize,
    default_timezone: String,
}

impl TenantRegistry {
    pub fn new(data_dir: Option<PathBuf>, max_tenants: usize, default_timezone: &str) -> Self {
        Self {
            stores: DashMap::new(),
            data_dir,
            max_tenants,
            default_timezone: default_timezone.to_string(),
        }
    }

    pub fn in_memory(max_tenants: usize, default_timezone: &str) -> Self {
        Self::new(None, max_tenants, default_timezone)
    }

    pub fn default_timezone(&self) -> &str {
        &self.default_timezone
    }

    /// The configured default zone, or the built-in one when it is unknown.
    pub fn default_tz(&self) -> Tz {
        parse_timezone(&self.default_timezone)
            .or_else(|_| parse_timezone(DEFAULT_TIMEZONE))
            .unwrap_or(chrono_tz::Europe::Madrid)
    }

    /// Validate a raw tenant name. Names become file names, so anything
    /// beyond `[A-Za-z0-9_-]` is refused rather than rewritten.
    pub fn check_name(raw: &str) -> Result<TenantId> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(BookingError::InvalidTenant("empty tenant name".to_string()));
        }
        if name.len() > MAX_TENANT_NAME_LEN {
            return Err(BookingError::InvalidTenant(format!(
                "tenant name longer than {MAX_TENANT_NAME_LEN} characters"
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(BookingError::InvalidTenant(format!(
                "tenant name {name:?} may only contain letters, digits, '_' and '-'"
            )));
        }
        Ok(TenantId::from(name))
    }

    /// Get or lazily open the store of `tenant`.
    pub fn store(&self, tenant: &TenantId) -> Result<Arc<SqliteStore>> {
        if let Some(store) = self.stores.get(tenant) {
            return Ok(store.value().clone());
        }
        if self.stores.len() >= self.max_tenants {
            return Err(BookingError::InvalidTenant(format!(
                "tenant limit of {} reached",
                self.max_tenants
            )));
        }
        let entry = self.stores.entry(tenant.clone()).or_try_insert_with(|| {
            let store = match &self.data_dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir)?;
                    SqliteStore::open(&dir.join(format!("{tenant}.db")))?
                }
                None => SqliteStore::in_memory()?,
            };
            info!(%tenant, "tenant store opened");
            Ok::<_, BookingError>(Arc::new(store))
        })?;
        Ok(entry.value().clone())
    }

    /// Resolve a raw tenant name into a context with its current policy.
    pub fn resolve(&self, raw: &str) -> Result<TenantContext> {
        let tenant = Self::check_name(raw)?;
        let store = self.store(&tenant)?;
        let policy = store
            .load_policy(&tenant)?
            .map(|p| p.sanitize(&self.default_timezone));
        Ok(TenantContext {
            tenant,
            store,
            policy,
            default_tz: self.default_tz(),
        })
    }

    /// Open every `{tenant}.db` already present in the data directory.
    /// Returns how many tenants are known afterwards.
    pub fn discover(&self) -> Result<usize> {
        let Some(dir) = &self.data_dir else {
            return Ok(self.stores.len());
        };
        if !dir.exists() {
            return Ok(self.stores.len());
        }
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("db") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Self::check_name(stem) {
                Ok(tenant) => {
                    self.store(&tenant)?;
                }
                Err(e) => warn!(file = %path.display(), "ignoring database file: {e}"),
            }
        }
        info!(tenants = self.stores.len(), dir = %dir.display(), "tenant discovery complete");
        Ok(self.stores.len())
    }

    /// Known tenants, sorted by name.
    pub fn tenants(&self) -> Vec<TenantId> {
        let mut names: Vec<TenantId> = self.stores.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
