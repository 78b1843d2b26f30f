//! HTTP identification probe for announced hosts
//!
//! Every Shelly device answers `GET /shelly` without credentials with its
//! hardware address, model and whether authentication is enabled. The
//! friendly name lives in `GET /settings`, which is only queried when the
//! device is open; with authentication enabled that endpoint would reject us.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Name used when the device settings could not be read
pub const UNNAMED_DEVICE: &str = "no name";

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("Invalid response from {url}: {source}")]
    InvalidResponse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Body of `GET /shelly`
#[derive(Debug, Deserialize)]
struct ShellyInfo {
    mac: String,
    #[serde(rename = "type")]
    device_type: String,
    auth: bool,
}

/// The subset of `GET /settings` we care about
#[derive(Debug, Default, Deserialize)]
struct DeviceSettings {
    #[serde(default)]
    name: Option<String>,
}

/// Identity of a probed device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Hardware (MAC) address
    pub mac: String,
    /// Model/class reported by the device
    pub device_type: String,
    /// Friendly name, or [`UNNAMED_DEVICE`]
    pub name: String,
    /// Whether the device has authentication enabled
    pub requires_auth: bool,
}

/// Issues the identification requests against a single host
#[derive(Debug, Clone)]
pub struct DeviceProber {
    client: reqwest::Client,
}

impl DeviceProber {
    /// Create a prober; `timeout` of `None` leaves requests unbounded
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Identify the device at `ip:port`
    pub async fn probe(&self, ip: IpAddr, port: u16) -> Result<ProbeResult, ProbeError> {
        let base = base_url(ip, port);

        let info: ShellyInfo = self.get_json(&format!("{}/shelly", base)).await?;
        trace!(ip = %ip, mac = %info.mac, device_type = %info.device_type, auth = info.auth, "Identified device");

        let settings = if info.auth {
            DeviceSettings::default()
        } else {
            self.get_json(&format!("{}/settings", base))
                .await
                .unwrap_or_else(|e| {
                    debug!(ip = %ip, error = %e, "Could not read device settings");
                    DeviceSettings::default()
                })
        };

        Ok(ProbeResult {
            mac: info.mac,
            device_type: info.device_type,
            name: settings
                .name
                .unwrap_or_else(|| UNNAMED_DEVICE.to_string()),
            requires_auth: info.auth,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProbeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ProbeError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|source| ProbeError::Request {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_slice(&body).map_err(|source| ProbeError::InvalidResponse {
            url: url.to_string(),
            source,
        })
    }
}

/// `http://ip:port`, with IPv6 addresses bracketed
fn base_url(ip: IpAddr, port: u16) -> String {
    format!("http://{}", SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_port, MockDevice};
    use std::net::{Ipv4Addr, Ipv6Addr};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn prober() -> DeviceProber {
        DeviceProber::new(Some(Duration::from_secs(5))).unwrap()
    }

    #[test]
    fn test_base_url() {
        assert_eq!(
            base_url(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), 80),
            "http://10.0.0.5:80"
        );
        assert_eq!(
            base_url(IpAddr::V6(Ipv6Addr::LOCALHOST), 8080),
            "http://[::1]:8080"
        );
    }

    #[tokio::test]
    async fn test_open_device_reads_settings_once() {
        let device = MockDevice::spawn(
            (StatusCode::OK, r#"{"mac":"AA:BB:CC:DD:EE:FF","type":"SHPLG-1","auth":false}"#),
            (StatusCode::OK, r#"{"name":"Kitchen Plug","fw":"20230913-114244"}"#),
        )
        .await;

        let result = prober().probe(LOCALHOST, device.port()).await.unwrap();
        assert_eq!(
            result,
            ProbeResult {
                mac: "AA:BB:CC:DD:EE:FF".to_string(),
                device_type: "SHPLG-1".to_string(),
                name: "Kitchen Plug".to_string(),
                requires_auth: false,
            }
        );
        assert_eq!(device.shelly_calls(), 1);
        assert_eq!(device.settings_calls(), 1);
    }

    #[tokio::test]
    async fn test_auth_device_skips_settings() {
        let device = MockDevice::spawn(
            (StatusCode::OK, r#"{"mac":"AA:BB:CC:DD:EE:01","type":"SHSW-1","auth":true}"#),
            (StatusCode::OK, r#"{"name":"Should not be read"}"#),
        )
        .await;

        let result = prober().probe(LOCALHOST, device.port()).await.unwrap();
        assert!(result.requires_auth);
        assert_eq!(result.name, UNNAMED_DEVICE);
        assert_eq!(device.settings_calls(), 0);
    }

    #[tokio::test]
    async fn test_settings_failure_is_not_fatal() {
        let device = MockDevice::spawn(
            (StatusCode::OK, r#"{"mac":"AA:BB:CC:DD:EE:02","type":"SHDM-1","auth":false}"#),
            (StatusCode::UNAUTHORIZED, "401 Unauthorized"),
        )
        .await;

        let result = prober().probe(LOCALHOST, device.port()).await.unwrap();
        assert_eq!(result.mac, "AA:BB:CC:DD:EE:02");
        assert_eq!(result.name, UNNAMED_DEVICE);
        assert_eq!(device.settings_calls(), 1);
    }

    #[tokio::test]
    async fn test_settings_without_name() {
        let device = MockDevice::spawn(
            (StatusCode::OK, r#"{"mac":"AA:BB:CC:DD:EE:03","type":"SHSW-25","auth":false}"#),
            (StatusCode::OK, r#"{"device":{"hostname":"shellyswitch25-AABBCC"},"name":null}"#),
        )
        .await;

        let result = prober().probe(LOCALHOST, device.port()).await.unwrap();
        assert_eq!(result.name, UNNAMED_DEVICE);
        assert_eq!(device.settings_calls(), 1);
    }

    #[tokio::test]
    async fn test_identification_error_status() {
        let device = MockDevice::spawn(
            (StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            (StatusCode::OK, r#"{"name":"Kitchen Plug"}"#),
        )
        .await;

        let err = prober().probe(LOCALHOST, device.port()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(device.settings_calls(), 0);
    }

    #[tokio::test]
    async fn test_identification_schema_mismatch() {
        let device = MockDevice::spawn(
            (StatusCode::OK, r#"{"name":"some other http service"}"#),
            (StatusCode::OK, "{}"),
        )
        .await;

        let err = prober().probe(LOCALHOST, device.port()).await.unwrap_err();
        assert!(matches!(err, ProbeError::InvalidResponse { .. }));
        assert_eq!(device.settings_calls(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let port = closed_port().await;
        let err = prober().probe(LOCALHOST, port).await.unwrap_err();
        assert!(matches!(err, ProbeError::Request { .. }));
    }
}
