// Device Inventory Port

use crate::domain::{is_reserved_host_name, DeviceHandle};
use crate::error::Result;
use async_trait::async_trait;
use tracing::warn;

/// Source of connectable device records
#[async_trait]
pub trait DeviceInventory: Send + Sync {
    /// Full reload of every usable device
    async fn load_all(&self) -> Result<Vec<DeviceHandle>>;

    /// Resolve device names; an empty filter means the whole inventory.
    ///
    /// Filtering is order-independent and unknown names are dropped. A
    /// device named like a reserved `results` key is never resolved.
    async fn resolve(&self, names: &[String]) -> Result<Vec<DeviceHandle>> {
        let all = self.load_all().await?;
        Ok(all
            .into_iter()
            .filter(|d| {
                if is_reserved_host_name(&d.name) {
                    warn!(device = %d.name, "Skipping device with a reserved name");
                    return false;
                }
                names.is_empty() || names.iter().any(|n| n == &d.name)
            })
            .collect())
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Fixed in-memory inventory
    #[derive(Default)]
    pub struct StaticInventory {
        devices: Mutex<Vec<DeviceHandle>>,
        fail_with: Mutex<Option<String>>,
    }

    impl StaticInventory {
        pub fn new(devices: Vec<DeviceHandle>) -> Self {
            Self {
                devices: Mutex::new(devices),
                fail_with: Mutex::new(None),
            }
        }

        /// Inventory of `names`, all on the `ios` platform
        pub fn with_names(names: &[&str]) -> Self {
            Self::new(
                names
                    .iter()
                    .enumerate()
                    .map(|(i, n)| DeviceHandle::new(*n, format!("10.0.0.{}", i + 1), "ios"))
                    .collect(),
            )
        }

        /// Make the next reloads fail (engine-fatal path)
        pub fn fail_reload(&self, message: impl Into<String>) {
            *self.fail_with.lock().unwrap() = Some(message.into());
        }
    }

    #[async_trait]
    impl DeviceInventory for StaticInventory {
        async fn load_all(&self) -> Result<Vec<DeviceHandle>> {
            if let Some(msg) = self.fail_with.lock().unwrap().clone() {
                return Err(AppError::Database(msg));
            }
            Ok(self.devices.lock().unwrap().clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::StaticInventory;
    use super::*;

    #[tokio::test]
    async fn test_resolve_filters_and_drops_unknown() {
        let inv = StaticInventory::with_names(&["sw1", "sw2", "sw3"]);

        let all = inv.resolve(&[]).await.unwrap();
        assert_eq!(all.len(), 3);

        let picked = inv
            .resolve(&["sw3".to_string(), "ghost".to_string(), "sw1".to_string()])
            .await
            .unwrap();
        let names: Vec<_> = picked.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sw1", "sw3"]);
    }

    #[tokio::test]
    async fn test_reserved_name_never_resolves() {
        let inv = StaticInventory::with_names(&["sw1", "system_error"]);

        let all = inv.resolve(&[]).await.unwrap();
        let names: Vec<_> = all.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sw1"]);

        let picked = inv.resolve(&["system_error".to_string()]).await.unwrap();
        assert!(picked.is_empty());
    }
}
