//! Device identification module
//!
//! Resolves MAC addresses through the local ARP table and keeps the
//! in-memory registry of devices that have visited the server.

mod error;
pub mod mac;
pub mod registry;

pub use mac::resolve_or_fallback;
pub use registry::{DeviceRecord, DeviceRegistry};
