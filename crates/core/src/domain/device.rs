// Device handle resolved from inventory at run time

use serde::{Deserialize, Serialize};

/// Region used when a device carries none
pub const DEFAULT_REGION: &str = "default";

/// Connectable device record (address, credentials, protocol family).
///
/// Produced by the inventory for the duration of one run. Never persisted
/// inside a Job.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub name: String,
    pub hostname: String,
    pub port: Option<u16>,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    /// Driver platform, e.g. `ios`, `huawei_vrp`, `eos`
    pub platform: String,
    #[serde(default)]
    pub connection_type: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DeviceHandle {
    pub fn new(
        name: impl Into<String>,
        hostname: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            port: None,
            username: String::new(),
            password: String::new(),
            secret: None,
            platform: platform.into(),
            connection_type: None,
            region: None,
            group: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn region_or_default(&self) -> &str {
        self.region
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(DEFAULT_REGION)
    }

    /// Huawei VRP family (needs the CLI memory scrape fallback)
    pub fn is_huawei(&self) -> bool {
        let p = self.platform.to_ascii_lowercase();
        p.contains("huawei") || p.contains("vrp")
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("platform", &self.platform)
            .field("region", &self.region)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_credentials() {
        let mut dev = DeviceHandle::new("core-sw1", "10.0.0.1", "huawei_vrp");
        dev.password = "hunter2".to_string();
        let rendered = format!("{:?}", dev);
        assert!(!rendered.contains("hunter2"));
        assert!(dev.is_huawei());
    }

    #[test]
    fn test_region_default() {
        let mut dev = DeviceHandle::new("r1", "10.0.0.2", "ios");
        assert_eq!(dev.region_or_default(), "default");
        dev.region = Some("east".to_string());
        assert_eq!(dev.region_or_default(), "east");
    }
}
