//! A store backed by SQLite. Every record is a row of the `objects` table keyed by kind, owning
//! cluster and name.

use crate::error::{self, Result};
use crate::object::{Key, Kind, RawStore, Store};
use async_trait::async_trait;
use log::{debug, info};
use snafu::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;

pub type DbStore = Store<Sqlite>;

/// Opens (and creates if needed) the database file at `path`.
pub async fn open(path: &Path) -> Result<DbStore> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .context(error::IoSnafu {
                operation: "create directory",
                path: dir,
            })?;
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .context(error::DatabaseConnectSnafu {
            url: path.display().to_string(),
        })?;
    from_pool(pool).await
}

/// A private in-memory database. The pool is limited to one connection since every SQLite memory
/// connection is its own database.
pub async fn in_memory() -> Result<DbStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context(error::DatabaseConnectSnafu {
            url: "sqlite::memory:",
        })?;
    from_pool(pool).await
}

/// Uses an existing pool, creating the schema if it is missing.
pub async fn from_pool(pool: SqlitePool) -> Result<DbStore> {
    let sqlite = Sqlite { pool };
    sqlite.init_schema().await?;
    Ok(Store::new(sqlite))
}

#[derive(Debug, Clone)]
pub struct Sqlite {
    pool: SqlitePool,
}

impl Sqlite {
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                kind TEXT NOT NULL,
                scope TEXT NOT NULL,
                name TEXT NOT NULL,
                data BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (kind, scope, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context(error::DatabaseSnafu {
            operation: "schema initialization",
        })?;

        info!("Database store schema initialized");
        Ok(())
    }
}

#[async_trait]
impl RawStore for Sqlite {
    async fn read(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT data FROM objects WHERE kind = ? AND scope = ? AND name = ?")
            .bind(key.kind.as_str())
            .bind(&key.scope)
            .bind(&key.name)
            .fetch_optional(&self.pool)
            .await
            .context(error::DatabaseSnafu { operation: "read" })?;
        match row {
            Some(row) => Ok(Some(
                row.try_get("data")
                    .context(error::DatabaseSnafu { operation: "read" })?,
            )),
            None => Ok(None),
        }
    }

    async fn write(&self, key: &Key, data: Vec<u8>) -> Result<()> {
        debug!(
            "Writing {} '{}' of '{}'",
            key.kind.as_str(),
            key.name,
            key.scope
        );
        sqlx::query(
            r#"
            INSERT INTO objects (kind, scope, name, data, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (kind, scope, name)
            DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(key.kind.as_str())
        .bind(&key.scope)
        .bind(&key.name)
        .bind(data)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context(error::DatabaseSnafu { operation: "write" })?;
        Ok(())
    }

    async fn remove(&self, key: &Key) -> Result<bool> {
        let result = sqlx::query("DELETE FROM objects WHERE kind = ? AND scope = ? AND name = ?")
            .bind(key.kind.as_str())
            .bind(&key.scope)
            .bind(&key.name)
            .execute(&self.pool)
            .await
            .context(error::DatabaseSnafu {
                operation: "delete",
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, kind: Kind, scope: &str) -> Result<Vec<Vec<u8>>> {
        let rows =
            sqlx::query("SELECT data FROM objects WHERE kind = ? AND scope = ? ORDER BY name")
                .bind(kind.as_str())
                .bind(scope)
                .fetch_all(&self.pool)
                .await
                .context(error::DatabaseSnafu { operation: "list" })?;
        rows.iter()
            .map(|row| {
                row.try_get("data")
                    .context(error::DatabaseSnafu { operation: "list" })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn every_kind_shares_the_objects_table() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let sqlite = Sqlite { pool: pool.clone() };
        sqlite.init_schema().await.unwrap();
        sqlite.init_schema().await.unwrap();

        let tables: Vec<String> =
            sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap()
                .iter()
                .map(|row| row.get("name"))
                .collect();
        assert_eq!(tables, vec!["objects".to_string()]);

        let columns: Vec<String> = sqlx::query("PRAGMA table_info(objects)")
            .fetch_all(&pool)
            .await
            .unwrap()
            .iter()
            .map(|row| row.get("name"))
            .collect();
        assert_eq!(
            columns,
            vec!["kind", "scope", "name", "data", "updated_at"]
        );

        for kind in [Kind::Cluster, Kind::Certificate, Kind::Operation] {
            sqlite
                .write(&Key::new(kind, "c1", "x"), b"{}".to_vec())
                .await
                .unwrap();
        }
        sqlite
            .write(&Key::new(Kind::Cluster, "c1", "x"), b"[]".to_vec())
            .await
            .unwrap();
        let kinds: Vec<String> = sqlx::query("SELECT kind FROM objects ORDER BY kind")
            .fetch_all(&pool)
            .await
            .unwrap()
            .iter()
            .map(|row| row.get("kind"))
            .collect();
        assert_eq!(kinds, vec!["certificate", "cluster", "operation"]);
        assert_eq!(
            sqlite
                .read(&Key::new(Kind::Cluster, "c1", "x"))
                .await
                .unwrap()
                .unwrap(),
            b"[]".to_vec()
        );
    }
}
