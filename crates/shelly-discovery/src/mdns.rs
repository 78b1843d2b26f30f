//! mDNS browsing via `mdns-sd`
//!
//! The `mdns-sd` daemon runs on its own thread and reports events on a
//! blocking channel. A blocking task drains that channel and forwards each
//! resolved service as an [`Announcement`] onto a tokio channel, so the rest
//! of the pipeline never touches the daemon directly.

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::net::{IpAddr, Ipv4Addr};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::listener::Announcement;

/// Shelly devices advertise their web interface as a plain HTTP service
pub const SHELLY_SERVICE_TYPE: &str = "_http._tcp.local.";

/// A running browse for one service type
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
    service_type: String,
    forwarder: JoinHandle<()>,
}

impl MdnsBrowser {
    /// Start the mDNS daemon and browse `service_type`, sending resolved
    /// services to `tx`
    pub fn start(
        service_type: &str,
        tx: mpsc::Sender<Announcement>,
    ) -> Result<Self, mdns_sd::Error> {
        let daemon = ServiceDaemon::new()?;
        let receiver = daemon.browse(service_type)?;
        info!(service_type = %service_type, "Browsing for services");

        let forwarder = tokio::task::spawn_blocking(move || {
            while let Ok(event) = receiver.recv() {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let Some(announcement) = announcement_from_info(&info) else {
                            debug!(service = %info.get_fullname(), "Resolved service has no IPv4 address");
                            continue;
                        };
                        trace!(
                            service = %announcement.fullname,
                            address = %announcement.address,
                            port = announcement.port,
                            "Service resolved"
                        );
                        if tx.blocking_send(announcement).is_err() {
                            debug!("Announcement receiver dropped, stopping forwarder");
                            break;
                        }
                    }
                    ServiceEvent::SearchStopped(service_type) => {
                        debug!(service_type = %service_type, "Browse stopped");
                        break;
                    }
                    other => trace!(event = ?other, "mDNS event"),
                }
            }
        });

        Ok(Self {
            daemon,
            service_type: service_type.to_string(),
            forwarder,
        })
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Stop browsing and shut the daemon down
    pub async fn shutdown(self) -> Result<(), mdns_sd::Error> {
        if let Err(e) = self.daemon.stop_browse(&self.service_type) {
            warn!(error = %e, "Failed to stop browse");
        }
        self.daemon.shutdown()?;

        if let Err(e) = self.forwarder.await {
            warn!(error = %e, "mDNS forwarder task failed");
        }

        info!(service_type = %self.service_type, "mDNS browser stopped");
        Ok(())
    }
}

/// Build an announcement from a resolved service, using its lowest IPv4 address
fn announcement_from_info(info: &ServiceInfo) -> Option<Announcement> {
    let address = first_ipv4(info.get_addresses().iter().copied())?;

    Some(Announcement {
        service_type: info.get_type().to_string(),
        fullname: info.get_fullname().to_string(),
        address,
        port: info.get_port(),
    })
}

fn first_ipv4(addresses: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addresses
        .into_iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn service(ips: &str) -> ServiceInfo {
        let properties = [("id", "shellyplug-AABBCC")];
        ServiceInfo::new(
            SHELLY_SERVICE_TYPE,
            "shellyplug-AABBCC",
            "shellyplug-AABBCC.local.",
            ips,
            80,
            &properties[..],
        )
        .unwrap()
    }

    #[test]
    fn test_first_ipv4_prefers_lowest() {
        let addrs = [
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 40)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
        ];
        assert_eq!(first_ipv4(addrs), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(first_ipv4([IpAddr::V6(Ipv6Addr::LOCALHOST)]), None);
    }

    #[test]
    fn test_announcement_from_resolved_service() {
        let announcement = announcement_from_info(&service("10.0.0.9,10.0.0.5")).unwrap();
        assert_eq!(announcement.address, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(announcement.port, 80);
        assert_eq!(announcement.service_type, SHELLY_SERVICE_TYPE);
        assert_eq!(announcement.fullname, "shellyplug-AABBCC._http._tcp.local.");
    }

    #[test]
    fn test_ipv6_only_service_skipped() {
        assert!(announcement_from_info(&service("fe80::1")).is_none());
    }
}
