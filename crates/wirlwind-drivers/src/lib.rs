//! Vendor drivers.
//!
//! Everything vendor-specific sits behind the [`VendorDriver`] trait: the
//! pagination-disabling command and per-collection post-processing of the
//! shaped envelope. Drivers register in an explicit [`registry::DriverRegistry`]
//! table; duplicate vendor ids are a fatal startup error.
//!
//! Adding a vendor:
//! 1. Create `vendors/my_vendor.rs` implementing [`VendorDriver`].
//! 2. Add it to [`registry::DriverRegistry::with_builtins`].
//! 3. Override only what differs; the shared transforms in [`transforms`]
//!    cover the cross-vendor cases (memory percent, BGP peers, syslog).

pub mod error;
pub mod registry;
pub mod shaper;
pub mod transforms;
pub mod vendors;

#[cfg(test)]
mod tests;

use wirlwind_common::{Envelope, StateReader};

pub use error::{DriverError, Result};
pub use registry::DriverRegistry;
pub use shaper::shape_rows;

/// Per-vendor strategy: pagination and post-processing.
///
/// `post_process` is a pure transform over the shaped envelope. It may read
/// prior state (rate deltas, cross-collection joins) through the
/// [`StateReader`] but never writes to the store. Errors are contained to
/// the collection and cycle by the engine.
pub trait VendorDriver: Send + Sync {
    /// Primary registration key, e.g. `"cisco_ios"`.
    fn vendor_id(&self) -> &str;

    /// Additional vendor ids served by this driver, e.g. `"cisco_ios_xe"`.
    fn aliases(&self) -> &[&str] {
        &[]
    }

    /// Command issued once at connect to disable CLI paging. Empty means
    /// the vendor needs none.
    fn pagination_command(&self) -> &str;

    fn post_process(
        &self,
        collection: &str,
        envelope: Envelope,
        store: &dyn StateReader,
    ) -> Result<Envelope>;
}
