//! Database connection pool, migrations, and health check.
//!
//! The pool is opened once at process start and handed to the components
//! that need it by `Arc<Db>`; nothing holds a global connection.

use crate::config::{Config, ExposeSecret};
use crate::error::{Error, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::warn;

/// Database handle. Owns the connection pool.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Connect and migrate when `DATABASE_URL` is configured.
    ///
    /// Any failure is logged and yields `None` so callers fall back to the
    /// in-process memory backend.
    pub async fn connect_configured(config: &Config) -> Option<Self> {
        let url = config.database_url.as_ref()?;
        let db = match Self::connect(url.expose_secret()).await {
            Ok(db) => db,
            Err(e) => {
                warn!(error = %e, "cannot connect to memory database");
                return None;
            }
        };
        if let Err(e) = db.migrate().await {
            warn!(error = %e, "cannot migrate memory database");
            db.close().await;
            return None;
        }
        Some(db)
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;
        Ok(())
    }

    /// Round-trip a `SELECT 1`.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
