//! PostgreSQL connection pool.
//!
//! # Responsibilities
//! - Build connect options from the `postgres` section
//! - Open the pool and prove it works with a round trip
//! - Close the pool on release within the close timeout
//!
//! # Design Decisions
//! - A pool that opened but failed its first query is still handed back
//!   with a release, so its connections are closed
//! - Credentials never appear in logs
//! - Host, port, user, password, database and SSL mode always come from the
//!   config section; `~/.pgpass` is never read. Settings this section has no
//!   field for (SSL certificate paths, application name) still fall back to
//!   the `PG*` environment variables sqlx honours

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use thiserror::Error;

use crate::adapters::{Acquisition, ResourceAdapter, StopTimeout, RELEASE_GRACE};
use crate::config::PostgresConfig;
use crate::lifecycle::error::BoxError;
use crate::lifecycle::handle::Resources;
use crate::lifecycle::registry::Release;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("invalid connection settings: {0}")]
    Options(#[source] sqlx::Error),

    #[error("cannot connect to {host}:{port}/{db_name}: {source}")]
    Connect {
        host: String,
        port: u16,
        db_name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("connected but health query failed: {0}")]
    Ping(#[source] sqlx::Error),
}

/// Shared database pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// One round trip to the server.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }
}

pub struct PostgresAdapter {
    config: PostgresConfig,
}

impl PostgresAdapter {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    fn connect_options(&self) -> Result<PgConnectOptions, DatabaseError> {
        let ssl_mode = PgSslMode::from_str(&self.config.ssl_mode).map_err(DatabaseError::Options)?;

        // Always set, even when empty, so PGPASSWORD cannot fill the gap.
        Ok(PgConnectOptions::new_without_pgpass()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .password(&self.config.password)
            .database(&self.config.db_name)
            .ssl_mode(ssl_mode))
    }

    async fn connect(&self) -> Result<PgPool, DatabaseError> {
        let options = self.connect_options()?;
        PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.connect_timeout())
            .connect_with(options)
            .await
            .map_err(|source| DatabaseError::Connect {
                host: self.config.host.clone(),
                port: self.config.port,
                db_name: self.config.db_name.clone(),
                source,
            })
    }

    fn release(&self, pool: PgPool) -> Release {
        let deadline = self.config.close_timeout();
        Release::new(self.name(), move || async move {
            tokio::time::timeout(deadline, pool.close())
                .await
                .map_err(|_| Box::new(StopTimeout(deadline)) as BoxError)
        })
        .with_timeout(deadline + RELEASE_GRACE)
    }
}

#[async_trait]
impl ResourceAdapter for PostgresAdapter {
    type Resource = Database;

    fn name(&self) -> &str {
        "postgres"
    }

    async fn construct(&self, _resources: &Resources) -> Acquisition<Database> {
        let pool = match self.connect().await {
            Ok(pool) => pool,
            Err(e) => return Acquisition::failed(e),
        };
        let database = Database { pool: pool.clone() };
        let release = self.release(pool);

        if let Err(e) = database.ping().await {
            return Acquisition::partial(DatabaseError::Ping(e), release);
        }

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            db_name = %self.config.db_name,
            max_connections = self.config.max_connections,
            "Database pool connected"
        );
        Acquisition::ready(database, release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_ssl_mode_fails_before_connecting() {
        let config = PostgresConfig {
            ssl_mode: "sometimes".to_string(),
            ..PostgresConfig::default()
        };
        let (resource, release) = PostgresAdapter::new(config)
            .construct(&Resources::default())
            .await
            .into_parts();

        assert!(matches!(
            resource.unwrap_err().downcast_ref::<DatabaseError>(),
            Some(DatabaseError::Options(_))
        ));
        assert!(release.is_none());
    }

    #[test]
    fn test_connect_options_ignore_environment() {
        std::env::set_var("PGUSER", "from-environment");
        std::env::set_var("PGDATABASE", "from-environment");
        std::env::set_var("PGPORT", "6543");

        let config = PostgresConfig {
            host: "db.internal".to_string(),
            user: "orders".to_string(),
            db_name: "orders".to_string(),
            ..PostgresConfig::default()
        };
        let options = PostgresAdapter::new(config).connect_options().unwrap();

        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_username(), "orders");
        assert_eq!(options.get_database(), Some("orders"));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_without_release() {
        let config = PostgresConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout_secs: 1,
            ..PostgresConfig::default()
        };
        let (resource, release) = PostgresAdapter::new(config)
            .construct(&Resources::default())
            .await
            .into_parts();

        let err = resource.unwrap_err();
        assert!(err.to_string().contains("127.0.0.1:1"));
        assert!(release.is_none());
    }
}
