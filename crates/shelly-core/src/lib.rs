//! Shelly Core - Device records and the device registry
//!
//! This crate provides the foundational types for Shelly Manager:
//! - Device records as persisted in the registry file
//! - The YAML-backed device registry, deduplicated by hardware address

pub mod device;
pub mod registry;

pub use device::{Device, DeviceAuth};
pub use registry::{DeviceRegistry, Registration, RegistryError};
