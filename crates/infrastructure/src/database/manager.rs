use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use flightcrawl_core::config::DatabaseConfig;
use flightcrawl_core::Result;
use flightcrawl_domain::RequestRepository;

use super::{PostgresRequestRepository, SqliteRequestRepository};

/// Builds the request store matching the configured database url scheme
/// and bootstraps its schema.
pub struct RepositoryFactory;

impl RepositoryFactory {
    pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn RequestRepository>> {
        if config.is_sqlite() {
            Self::connect_sqlite(config).await
        } else {
            Self::connect_postgres(config).await
        }
    }

    async fn connect_postgres(config: &DatabaseConfig) -> Result<Arc<dyn RequestRepository>> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!("connected to postgres request store");

        let repository = PostgresRequestRepository::new(pool);
        repository.ensure_schema().await?;

        Ok(Arc::new(repository))
    }

    async fn connect_sqlite(config: &DatabaseConfig) -> Result<Arc<dyn RequestRepository>> {
        // every pooled connection to an in-memory database would see its
        // own empty database, so those are pinned to a single connection
        let max_connections = if config.url.contains(":memory:") {
            1
        } else {
            config.max_connections
        };

        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(options)
            .await?;

        info!("connected to sqlite request store");

        let repository = SqliteRequestRepository::new(pool);
        repository.ensure_schema().await?;

        Ok(Arc::new(repository))
    }
}
