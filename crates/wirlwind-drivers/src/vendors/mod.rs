//! Built-in vendor drivers.

pub mod arista_eos;
pub mod cisco_ios;
pub mod cisco_nxos;
pub mod juniper_junos;
