//! Handling of resolved service announcements

use shelly_core::{Device, DeviceRegistry, Registration, RegistryError};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, warn};

use crate::probe::DeviceProber;

/// A resolved service instance announced over mDNS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Service type, e.g. `_http._tcp.local.`
    pub service_type: String,
    /// Full service instance name
    pub fullname: String,
    /// Resolved IPv4 address
    pub address: Ipv4Addr,
    /// Resolved TCP port
    pub port: u16,
}

/// Probes announced hosts and records identified devices
pub struct DiscoveryListener {
    prober: DeviceProber,
    registry: DeviceRegistry,
}

impl DiscoveryListener {
    pub fn new(prober: DeviceProber, registry: DeviceRegistry) -> Self {
        Self { prober, registry }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> DeviceRegistry {
        self.registry
    }

    /// Handle one announcement
    ///
    /// Returns the registry record for the announced device, or `None` when
    /// the host did not identify as a Shelly device. Only registry
    /// persistence failures are returned as errors.
    pub async fn on_service_announced(
        &mut self,
        announcement: &Announcement,
    ) -> Result<Option<Device>, RegistryError> {
        let address = announcement.address;

        let result = match self
            .prober
            .probe(IpAddr::V4(address), announcement.port)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                debug!(
                    service = %announcement.fullname,
                    address = %address,
                    port = announcement.port,
                    error = %e,
                    "Ignoring announcement, probe failed"
                );
                return Ok(None);
            }
        };

        println!("Found device: {} at {}", result.name, address);

        let address = address.to_string();
        let registration = self.registry.register(
            &result.mac,
            &result.device_type,
            &result.name,
            &address,
            result.requires_auth,
        )?;

        // Known devices keep their first-seen address
        if let Registration::AlreadyKnown(existing) = registration {
            if existing.address != address {
                warn!(
                    mac = %existing.mac,
                    recorded = %existing.address,
                    current = %address,
                    "Known device seen at a new address, registry entry left unchanged"
                );
            }
        }

        Ok(Some(registration.device().clone()))
    }
}
