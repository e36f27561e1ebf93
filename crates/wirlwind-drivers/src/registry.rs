//! The vendor driver registry.
//!
//! An explicit registration table: each built-in driver is constructed and
//! registered at startup, before any lookup. Registering the same vendor id
//! twice is a fatal startup error. Lookup falls back one `_segment`
//! (`cisco_ios_xe` → `cisco_ios`) and finally to a transform-only default
//! driver, so a session never starts without a driver.

use crate::error::{DriverError, Result};
use crate::transforms::common_post_process;
use crate::vendors;
use crate::VendorDriver;
use std::collections::HashMap;
use std::sync::Arc;
use wirlwind_common::vendor::lookup_order;
use wirlwind_common::{Envelope, StateReader};

pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn VendorDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registry with every built-in driver.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(vendors::cisco_ios::CiscoIosDriver))?;
        registry.register(Arc::new(vendors::cisco_nxos::CiscoNxosDriver))?;
        registry.register(Arc::new(vendors::arista_eos::AristaEosDriver))?;
        registry.register(Arc::new(vendors::juniper_junos::JuniperJunosDriver))?;
        Ok(registry)
    }

    /// Register a driver under its vendor id and aliases.
    pub fn register(&mut self, driver: Arc<dyn VendorDriver>) -> Result<()> {
        let mut ids = vec![driver.vendor_id().to_string()];
        ids.extend(driver.aliases().iter().map(|s| s.to_string()));
        for id in ids {
            if self.drivers.contains_key(&id) {
                return Err(DriverError::DuplicateVendor(id));
            }
            tracing::debug!(vendor = %id, "Registered vendor driver");
            self.drivers.insert(id, Arc::clone(&driver));
        }
        Ok(())
    }

    /// Driver for a vendor id. Never fails: exact match, then the one-step
    /// fallback, then the default driver.
    pub fn get(&self, vendor: &str) -> Arc<dyn VendorDriver> {
        for candidate in lookup_order(vendor) {
            if let Some(driver) = self.drivers.get(candidate) {
                return Arc::clone(driver);
            }
        }
        tracing::info!(vendor, "No driver registered, using default driver");
        Arc::new(DefaultDriver {
            vendor: vendor.to_string(),
        })
    }

    pub fn vendor_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fallback for unknown vendors: no pagination command, common transforms
/// only.
pub struct DefaultDriver {
    vendor: String,
}

impl DefaultDriver {
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
        }
    }
}

impl VendorDriver for DefaultDriver {
    fn vendor_id(&self) -> &str {
        &self.vendor
    }

    fn pagination_command(&self) -> &str {
        ""
    }

    fn post_process(
        &self,
        collection: &str,
        envelope: Envelope,
        _store: &dyn StateReader,
    ) -> Result<Envelope> {
        Ok(common_post_process(collection, envelope))
    }
}
