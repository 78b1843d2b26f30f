//! Persistent device registry
//!
//! The registry is a flat, ordered list of [`Device`] records stored as YAML
//! under a single `devices` key. Records are keyed by hardware address:
//! the first registration of an address wins and later registrations of the
//! same address are no-ops.
//!
//! Every successful registration rewrites the whole file, so the file on disk
//! is always a complete snapshot of the in-memory registry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::device::Device;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Corrupt registry file {}: {reason}", .path.display())]
    CorruptConfig { path: PathBuf, reason: String },
    #[error("Registry file {} lists device {mac} more than once", .path.display())]
    DuplicateDevice { path: PathBuf, mac: String },
    #[error("Failed to persist registry at {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize registry: {0}")]
    Serialize(#[from] serde_yml::Error),
}

/// Outcome of [`DeviceRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration<'a> {
    /// The device was new and has been persisted
    Added(&'a Device),
    /// A device with this hardware address was already registered; the
    /// stored record is returned unchanged
    AlreadyKnown(&'a Device),
}

impl<'a> Registration<'a> {
    pub fn device(&self) -> &'a Device {
        match self {
            Registration::Added(device) | Registration::AlreadyKnown(device) => device,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Registration::Added(_))
    }
}

/// On-disk layout of the registry file
#[derive(Deserialize)]
struct RegistryFile {
    devices: Vec<Device>,
}

#[derive(Serialize)]
struct RegistryFileRef<'a> {
    devices: &'a [Device],
}

/// Device registry backed by a YAML file
#[derive(Debug)]
pub struct DeviceRegistry {
    /// Path of the registry file
    path: PathBuf,
    /// Devices in registration order
    devices: Vec<Device>,
    /// Hardware address -> position in `devices`
    by_mac: HashMap<String, usize>,
}

impl DeviceRegistry {
    /// Load the registry at `path`, or start empty if the file does not exist
    ///
    /// Nothing is written until the first device is registered.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();

        let devices = match std::fs::read_to_string(&path) {
            Ok(content) => parse_devices(&path, &content)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Registry file not found, starting empty");
                Vec::new()
            }
            Err(source) => return Err(RegistryError::Persistence { path, source }),
        };

        let mut by_mac = HashMap::with_capacity(devices.len());
        for (idx, device) in devices.iter().enumerate() {
            if by_mac.insert(device.mac.clone(), idx).is_some() {
                return Err(RegistryError::DuplicateDevice {
                    path,
                    mac: device.mac.clone(),
                });
            }
        }

        info!(path = %path.display(), devices = devices.len(), "Loaded device registry");

        Ok(Self {
            path,
            devices,
            by_mac,
        })
    }

    /// Register a device unless its hardware address is already known
    ///
    /// New devices are appended and the registry is flushed before this
    /// returns. If the flush fails the device is removed again, so memory and
    /// disk never disagree about what was registered.
    pub fn register(
        &mut self,
        mac: &str,
        device_type: &str,
        name: &str,
        address: &str,
        requires_auth: bool,
    ) -> Result<Registration<'_>, RegistryError> {
        if let Some(&idx) = self.by_mac.get(mac) {
            debug!(mac = %mac, "Device already registered");
            return Ok(Registration::AlreadyKnown(&self.devices[idx]));
        }

        let idx = self.devices.len();
        self.devices
            .push(Device::new(mac, device_type, name, address, requires_auth));
        self.by_mac.insert(mac.to_string(), idx);

        if let Err(e) = self.flush() {
            self.devices.pop();
            self.by_mac.remove(mac);
            return Err(e);
        }

        info!(mac = %mac, device_type = %device_type, address = %address, "Registered new device");
        Ok(Registration::Added(&self.devices[idx]))
    }

    /// Write the full registry to its file, replacing the previous contents
    pub fn flush(&self) -> Result<(), RegistryError> {
        let content = serde_yml::to_string(&RegistryFileRef {
            devices: &self.devices,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| RegistryError::Persistence {
                path: self.path.clone(),
                source,
            })?;
        }

        std::fs::write(&self.path, content).map_err(|source| RegistryError::Persistence {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), devices = self.devices.len(), "Flushed device registry");
        Ok(())
    }

    /// Look up a device by hardware address
    pub fn get(&self, mac: &str) -> Option<&Device> {
        self.by_mac.get(mac).map(|&idx| &self.devices[idx])
    }

    pub fn contains(&self, mac: &str) -> bool {
        self.by_mac.contains_key(mac)
    }

    /// All devices, in registration order
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_devices(path: &Path, content: &str) -> Result<Vec<Device>, RegistryError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let file: RegistryFile =
        serde_yml::from_str(content).map_err(|e| RegistryError::CorruptConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(file.devices)
}
