// SQLite DeviceInventory Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use netops_core::domain::{is_reserved_host_name, DeviceHandle};
use netops_core::error::{AppError, Result};
use netops_core::port::DeviceInventory;
use sqlx::SqlitePool;
use tracing::{debug, warn};

/// Inventory over the `devices` table; every `load_all` is a full reload.
#[derive(Clone)]
pub struct SqliteDeviceInventory {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct DeviceRow {
    name: String,
    hostname: Option<String>,
    port: Option<i64>,
    username: String,
    password: String,
    secret: Option<String>,
    platform: Option<String>,
    connection_type: Option<String>,
    region: Option<String>,
    device_group: Option<String>,
    metadata: String,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl DeviceRow {
    /// None when the record cannot be connected to (no address or platform)
    fn into_handle(self) -> Option<DeviceHandle> {
        let hostname = present(self.hostname)?;
        let platform = present(self.platform)?;
        Some(DeviceHandle {
            name: self.name,
            hostname,
            port: self.port.and_then(|p| u16::try_from(p).ok()),
            username: self.username,
            password: self.password,
            secret: present(self.secret),
            platform,
            connection_type: present(self.connection_type),
            region: present(self.region),
            group: present(self.device_group),
            metadata: serde_json::from_str(&self.metadata).unwrap_or(serde_json::Value::Null),
        })
    }
}

impl SqliteDeviceInventory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a device by name; returns its row id
    pub async fn upsert_device(&self, device: &DeviceHandle) -> Result<i64> {
        if is_reserved_host_name(&device.name) {
            return Err(AppError::Validation(format!(
                "'{}' is reserved and cannot be a device name",
                device.name
            )));
        }
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO devices (
                name, hostname, port, username, password, secret,
                platform, connection_type, region, device_group, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                hostname = excluded.hostname,
                port = excluded.port,
                username = excluded.username,
                password = excluded.password,
                secret = excluded.secret,
                platform = excluded.platform,
                connection_type = excluded.connection_type,
                region = excluded.region,
                device_group = excluded.device_group,
                metadata = excluded.metadata
            RETURNING id
            "#,
        )
        .bind(&device.name)
        .bind(&device.hostname)
        .bind(device.port.map(i64::from))
        .bind(&device.username)
        .bind(&device.password)
        .bind(&device.secret)
        .bind(&device.platform)
        .bind(&device.connection_type)
        .bind(&device.region)
        .bind(&device.group)
        .bind(device.metadata.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    pub async fn remove_device(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DeviceInventory for SqliteDeviceInventory {
    async fn load_all(&self) -> Result<Vec<DeviceHandle>> {
        let rows: Vec<DeviceRow> = sqlx::query_as(
            r#"
            SELECT name, hostname, port, username, password, secret, platform,
                   connection_type, region, device_group, metadata
            FROM devices
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let total = rows.len();
        let devices: Vec<DeviceHandle> = rows
            .into_iter()
            .filter_map(|row| {
                let name = row.name.clone();
                let handle = row.into_handle();
                if handle.is_none() {
                    warn!(device = %name, "Skipping device without address or platform");
                }
                handle
            })
            .collect();

        debug!(total, usable = devices.len(), "Inventory loaded");
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup_inventory() -> SqliteDeviceInventory {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteDeviceInventory::new(pool)
    }

    fn device(name: &str, platform: &str) -> DeviceHandle {
        let mut d = DeviceHandle::new(name, format!("10.1.0.{}", name.len()), platform);
        d.username = "netops".to_string();
        d.password = "secret".to_string();
        d.region = Some("east".to_string());
        d
    }

    #[tokio::test]
    async fn test_upsert_and_load() {
        let inventory = setup_inventory().await;
        let first = inventory.upsert_device(&device("sw1", "ios")).await.unwrap();

        let mut moved = device("sw1", "ios");
        moved.hostname = "10.9.9.9".to_string();
        moved.port = Some(2222);
        let again = inventory.upsert_device(&moved).await.unwrap();
        assert_eq!(first, again);

        let all = inventory.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].hostname, "10.9.9.9");
        assert_eq!(all[0].port, Some(2222));
        assert_eq!(all[0].password, "secret");
        assert_eq!(all[0].region_or_default(), "east");
    }

    #[tokio::test]
    async fn test_reserved_device_name_rejected() {
        let inventory = setup_inventory().await;
        let err = inventory
            .upsert_device(&device("system_error", "ios"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(inventory.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_records_skipped() {
        let inventory = setup_inventory().await;
        inventory.upsert_device(&device("sw1", "ios")).await.unwrap();
        inventory.upsert_device(&device("sw2", "")).await.unwrap();
        sqlx::query("INSERT INTO devices (name, platform) VALUES ('bare', 'eos')")
            .execute(&inventory.pool)
            .await
            .unwrap();

        let names: Vec<String> = inventory
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["sw1"]);
    }

    #[tokio::test]
    async fn test_resolve_filters_by_name() {
        let inventory = setup_inventory().await;
        for name in ["sw1", "sw2", "sw3"] {
            inventory.upsert_device(&device(name, "eos")).await.unwrap();
        }

        let picked = inventory
            .resolve(&["sw3".to_string(), "ghost".to_string(), "sw1".to_string()])
            .await
            .unwrap();
        let names: Vec<&str> = picked.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sw1", "sw3"]);

        assert!(inventory.remove_device("sw2").await.unwrap());
        assert_eq!(inventory.resolve(&[]).await.unwrap().len(), 2);
    }
}
