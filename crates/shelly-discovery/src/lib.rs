//! Shelly Discovery - Finding and identifying Shelly devices on the LAN
//!
//! This crate provides the discovery-to-registry pipeline:
//! - mDNS browsing for HTTP service announcements
//! - HTTP probing of announced hosts (`/shelly`, then `/settings`)
//! - A listener that records identified devices in the registry
//! - A session that runs the pipeline until interrupted

pub mod listener;
pub mod mdns;
pub mod probe;
pub mod session;

#[cfg(test)]
mod testing;

pub use listener::{Announcement, DiscoveryListener};
pub use mdns::{MdnsBrowser, SHELLY_SERVICE_TYPE};
pub use probe::{DeviceProber, ProbeError, ProbeResult, UNNAMED_DEVICE};
pub use session::{
    discover, process_announcements, DiscoverySession, SessionConfig, SessionError, SessionState,
};
