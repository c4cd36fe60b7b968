// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed descriptor store.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::debug;

use super::DescriptorStore;
use crate::error::{Error, Result};
use crate::model::{InstanceDescriptor, InstanceSubmodel};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

type DescriptorRow = (String, String, Option<String>, String);
type SubmodelRow = (String, String, Option<String>);

/// Descriptor store persisting to SQLite.
#[derive(Clone)]
pub struct SqliteDescriptorStore {
    pool: SqlitePool,
}

impl SqliteDescriptorStore {
    /// Create a store from an existing pool. The schema must already be applied.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url` (e.g. `sqlite:.mdt/descriptors.db?mode=rwc`) and apply the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        MIGRATOR.run(&pool).await?;
        debug!(url, "Descriptor database ready");
        Ok(Self { pool })
    }

    /// Apply the schema to `pool`.
    pub async fn migrate(pool: &SqlitePool) -> Result<()> {
        MIGRATOR.run(pool).await?;
        Ok(())
    }

    async fn load(&self, rows: Vec<DescriptorRow>) -> Result<Vec<InstanceDescriptor>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let submodel_rows = sqlx::query_as::<_, SubmodelRow>(
            r#"
            SELECT instance_id, submodel_id, submodel_id_short
            FROM instance_submodels
            ORDER BY instance_id, position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut submodels: HashMap<String, Vec<InstanceSubmodel>> = HashMap::new();
        for (instance_id, submodel_id, submodel_id_short) in submodel_rows {
            submodels
                .entry(instance_id)
                .or_default()
                .push(InstanceSubmodel {
                    submodel_id,
                    submodel_id_short,
                });
        }

        rows.into_iter()
            .map(|(id, aas_id, aas_id_short, arguments)| -> Result<InstanceDescriptor> {
                Ok(InstanceDescriptor {
                    submodels: submodels.remove(&id).unwrap_or_default(),
                    arguments: serde_json::from_str(&arguments)?,
                    id,
                    aas_id,
                    aas_id_short,
                })
            })
            .collect()
    }

    async fn fetch_one_where(&self, sql: &str, key: &str, what: &str) -> Result<InstanceDescriptor> {
        let row = sqlx::query_as::<_, DescriptorRow>(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{what} {key}")))?;
        self.load(vec![row])
            .await?
            .pop()
            .ok_or_else(|| Error::NotFound(format!("{what} {key}")))
    }
}

fn unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl DescriptorStore for SqliteDescriptorStore {
    fn store_type(&self) -> &'static str {
        "sqlite"
    }

    async fn add(&self, descriptor: &InstanceDescriptor) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO instance_descriptors (id, aas_id, aas_id_short, arguments)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&descriptor.id)
        .bind(&descriptor.aas_id)
        .bind(&descriptor.aas_id_short)
        .bind(serde_json::to_string(&descriptor.arguments)?)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if unique_violation(&e) => {
                return Err(Error::AlreadyExists(format!(
                    "instance {} (aas {})",
                    descriptor.id, descriptor.aas_id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        for (position, sm) in descriptor.submodels.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO instance_submodels (instance_id, position, submodel_id, submodel_id_short)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&descriptor.id)
            .bind(position as i64)
            .bind(&sm.submodel_id)
            .bind(&sm.submodel_id_short)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, descriptor: &InstanceDescriptor) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE instance_descriptors
            SET aas_id_short = ?, arguments = ?
            WHERE id = ?
            "#,
        )
        .bind(&descriptor.aas_id_short)
        .bind(serde_json::to_string(&descriptor.arguments)?)
        .bind(&descriptor.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("instance {}", descriptor.id)));
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM instance_submodels WHERE instance_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM instance_descriptors WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("instance {id}")));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<InstanceDescriptor> {
        self.fetch_one_where(
            "SELECT id, aas_id, aas_id_short, arguments FROM instance_descriptors WHERE id = ?",
            id,
            "instance",
        )
        .await
    }

    async fn get_by_aas_id(&self, aas_id: &str) -> Result<InstanceDescriptor> {
        self.fetch_one_where(
            "SELECT id, aas_id, aas_id_short, arguments FROM instance_descriptors WHERE aas_id = ?",
            aas_id,
            "instance for aas",
        )
        .await
    }

    async fn get_by_submodel_id(&self, submodel_id: &str) -> Result<InstanceDescriptor> {
        self.fetch_one_where(
            r#"
            SELECT d.id, d.aas_id, d.aas_id_short, d.arguments
            FROM instance_descriptors d
            JOIN instance_submodels s ON s.instance_id = d.id
            WHERE s.submodel_id = ?
            LIMIT 1
            "#,
            submodel_id,
            "instance for submodel",
        )
        .await
    }

    async fn get_all(&self) -> Result<Vec<InstanceDescriptor>> {
        let rows = sqlx::query_as::<_, DescriptorRow>(
            "SELECT id, aas_id, aas_id_short, arguments FROM instance_descriptors ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        self.load(rows).await
    }

    async fn get_all_by_id_short(&self, aas_id_short: &str) -> Result<Vec<InstanceDescriptor>> {
        let rows = sqlx::query_as::<_, DescriptorRow>(
            r#"
            SELECT id, aas_id, aas_id_short, arguments
            FROM instance_descriptors
            WHERE aas_id_short = ?
            ORDER BY id
            "#,
        )
        .bind(aas_id_short)
        .fetch_all(&self.pool)
        .await?;
        self.load(rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Create an in-memory store for testing.
    async fn test_store() -> SqliteDescriptorStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        SqliteDescriptorStore::migrate(&pool)
            .await
            .expect("Failed to run migrations");
        SqliteDescriptorStore::new(pool)
    }

    fn descriptor(id: &str, aas_id: &str, short: Option<&str>) -> InstanceDescriptor {
        InstanceDescriptor {
            id: id.into(),
            aas_id: aas_id.into(),
            aas_id_short: short.map(str::to_string),
            submodels: vec![
                InstanceSubmodel {
                    submodel_id: format!("{aas_id}/sm/2"),
                    submodel_id_short: Some("Second".into()),
                },
                InstanceSubmodel {
                    submodel_id: format!("{aas_id}/sm/1"),
                    submodel_id_short: None,
                },
            ],
            arguments: json!({"jarFile": "a.jar", "modelFile": "m.json", "configFile": "c.json"}),
        }
    }

    #[tokio::test]
    async fn test_add_and_get_preserves_submodel_order() {
        let store = test_store().await;
        let desc = descriptor("vacuum", "urn:aas:vacuum", Some("Vacuum"));
        store.add(&desc).await.unwrap();

        let loaded = store.get("vacuum").await.unwrap();
        assert_eq!(loaded, desc);
        assert_eq!(loaded.submodels[0].submodel_id, "urn:aas:vacuum/sm/2");
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = test_store().await;
        store
            .add(&descriptor("a", "urn:aas:1", None))
            .await
            .unwrap();

        let same_id = store.add(&descriptor("a", "urn:aas:2", None)).await;
        assert!(matches!(same_id, Err(Error::AlreadyExists(_))));

        let same_aas = store.add(&descriptor("b", "urn:aas:1", None)).await;
        assert!(matches!(same_aas, Err(Error::AlreadyExists(_))));

        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lookups() {
        let store = test_store().await;
        store
            .add(&descriptor("a", "urn:aas:a", Some("Pump")))
            .await
            .unwrap();
        store
            .add(&descriptor("b", "urn:aas:b", Some("Pump")))
            .await
            .unwrap();
        store
            .add(&descriptor("c", "urn:aas:c", None))
            .await
            .unwrap();

        assert_eq!(store.get_by_aas_id("urn:aas:b").await.unwrap().id, "b");
        assert_eq!(
            store.get_by_submodel_id("urn:aas:c/sm/1").await.unwrap().id,
            "c"
        );
        assert_eq!(store.get_all_by_id_short("Pump").await.unwrap().len(), 2);
        assert!(store.get("zzz").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let store = test_store().await;
        let mut desc = descriptor("a", "urn:aas:a", None);
        store.add(&desc).await.unwrap();

        desc.arguments = json!({"imageId": "rewritten"});
        store.update(&desc).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().arguments["imageId"], "rewritten");

        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap_err().is_not_found());
        assert!(store.remove("a").await.unwrap_err().is_not_found());
        assert!(
            store
                .get_by_submodel_id("urn:aas:a/sm/1")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }
}
