//! Device records as stored in the registry file

use serde::{Deserialize, Deserializer, Serialize};

/// Credential placeholders for a device that requires authentication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuth {
    pub username: String,
    pub password: String,
}

impl DeviceAuth {
    /// Empty placeholders, to be filled in by hand in the registry file
    pub fn placeholder() -> Self {
        Self::default()
    }
}

/// A known device in the registry
///
/// Field order matches the on-disk layout: `mac`, `type`, `auth`, `name`, `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Hardware (MAC) address, the registry key
    pub mac: String,
    /// Model/class reported by the device (e.g. "SHPLG-1")
    #[serde(rename = "type")]
    pub device_type: String,
    /// Present when the device reported that authentication is enabled
    #[serde(default)]
    pub auth: Option<DeviceAuth>,
    /// Friendly name from the device settings
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    /// Network address the device was first discovered at
    pub address: String,
}

impl Device {
    /// Create a new device record
    pub fn new(
        mac: impl Into<String>,
        device_type: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        requires_auth: bool,
    ) -> Self {
        Self {
            mac: mac.into(),
            device_type: device_type.into(),
            auth: requires_auth.then(DeviceAuth::placeholder),
            name: name.into(),
            address: address.into(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.auth.is_some()
    }
}

// Hand-edited files may carry `name: null` (or `name: ~`)
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
