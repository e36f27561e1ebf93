//! Vendor identifier handling.
//!
//! Vendor ids are stable lowercase strings (`cisco_ios_xe`, `arista_eos`).
//! When a per-vendor resource is missing, one trailing `_segment` may be
//! stripped and the lookup retried, so `cisco_ios_xe` falls back to
//! `cisco_ios`. The strip happens at most once per lookup.

/// The fallback vendor id, if one exists.
///
/// Returns `None` when the id has no separator left to strip.
pub fn base_vendor(vendor: &str) -> Option<&str> {
    vendor.rsplit_once('_').map(|(base, _)| base)
}

/// The lookup order for a vendor id: itself, then at most one fallback.
pub fn lookup_order(vendor: &str) -> impl Iterator<Item = &str> {
    std::iter::once(vendor).chain(base_vendor(vendor))
}
