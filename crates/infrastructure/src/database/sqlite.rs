use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument, warn};

use flightcrawl_core::Result;
use flightcrawl_domain::{Request, RequestCreate, RequestRepository, RequestStatus};

use super::is_unique_violation;

const SELECT_COLUMNS: &str = "id, status, dep_port, arr_port, dep_date, ret_date, flex_option, sorted_by, direct, created_at";

/// Embedded-deployment request store. SQLite has no sequence to fall out
/// of sync, so identifiers are store-assigned up front as `max(id) + 1`;
/// the same single-retry conflict recovery as the Postgres store covers a
/// racing writer.
pub struct SqliteRequestRepository {
    pool: SqlitePool,
}

impl SqliteRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id BIGINT PRIMARY KEY NOT NULL,
                status VARCHAR(20),
                dep_port VARCHAR(20) NOT NULL,
                arr_port VARCHAR(20) NOT NULL,
                dep_date DATE NOT NULL,
                ret_date DATE,
                flex_option INTEGER NOT NULL DEFAULT 0,
                sorted_by VARCHAR(30) NOT NULL,
                direct BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request> {
        Ok(Request {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            dep_port: row.try_get("dep_port")?,
            arr_port: row.try_get("arr_port")?,
            dep_date: row.try_get("dep_date")?,
            ret_date: row.try_get("ret_date")?,
            flex_option: row.try_get("flex_option")?,
            sorted_by: row.try_get("sorted_by")?,
            direct: row.try_get("direct")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn find_matching(&self, create: &RequestCreate) -> Result<Option<Request>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM requests
            WHERE dep_port = ? AND arr_port = ? AND dep_date = ?
              AND ret_date IS ?
              AND flex_option = ? AND sorted_by = ? AND direct = ?
            ORDER BY id
            LIMIT 1
            "#
        ))
        .bind(&create.dep_port)
        .bind(&create.arr_port)
        .bind(create.dep_date)
        .bind(create.ret_date)
        .bind(create.flex_option)
        .bind(create.sorted_by)
        .bind(create.direct)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_request).transpose()
    }

    async fn insert_with_id(&self, create: &RequestCreate, id: i64) -> Result<Request> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO requests (id, dep_port, arr_port, dep_date, ret_date, flex_option, sorted_by, direct, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&create.dep_port)
        .bind(&create.arr_port)
        .bind(create.dep_date)
        .bind(create.ret_date)
        .bind(create.flex_option)
        .bind(create.sorted_by)
        .bind(create.direct)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_request(&row)
    }

    /// Insert under `id`, recovering once from a conflicting identifier by
    /// re-reading `max(id) + 1`. A second conflict propagates.
    pub(crate) async fn insert_new(&self, create: &RequestCreate, id: i64) -> Result<Request> {
        match self.insert_with_id(create, id).await {
            Ok(request) => Ok(request),
            Err(err) if is_unique_violation(&err) => {
                let next = self.next_request_id().await?;
                warn!("request insert collided on id {id}, retrying with id {next}");
                self.insert_with_id(create, next).await
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) async fn next_request_id(&self) -> Result<i64> {
        let next: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM requests")
            .fetch_one(&self.pool)
            .await?;
        Ok(next)
    }
}

#[async_trait]
impl RequestRepository for SqliteRequestRepository {
    #[instrument(skip(self, create), fields(
        dep_port = %create.dep_port,
        arr_port = %create.arr_port,
        dep_date = %create.dep_date,
    ))]
    async fn create_or_get(&self, create: &RequestCreate) -> Result<Request> {
        if let Some(existing) = self.find_matching(create).await? {
            debug!("request already exists with id {}", existing.id);
            return Ok(existing);
        }

        let next = self.next_request_id().await?;
        self.insert_new(create, next).await
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> Result<Option<Request>> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM requests WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_request).transpose()
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: i64, status: RequestStatus) -> Result<()> {
        sqlx::query("UPDATE requests SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use flightcrawl_testing_utils::sample_request_create;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn repository() -> (SqlitePool, SqliteRequestRepository) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let repository = SqliteRequestRepository::new(pool.clone());
        repository.ensure_schema().await.unwrap();

        (pool, repository)
    }

    #[tokio::test]
    async fn create_assigns_an_id_and_round_trips() {
        let (_pool, repository) = repository().await;

        let created = repository
            .create_or_get(&sample_request_create())
            .await
            .unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.status, None);

        let fetched = repository.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn create_or_get_is_idempotent_for_identical_parameters() {
        let (_pool, repository) = repository().await;

        let first = repository
            .create_or_get(&sample_request_create())
            .await
            .unwrap();
        let second = repository
            .create_or_get(&sample_request_create())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);

        let mut other = sample_request_create();
        other.ret_date = NaiveDate::from_ymd_opt(2025, 6, 8);
        let third = repository.create_or_get(&other).await.unwrap();
        assert_ne!(third.id, first.id);
    }

    #[tokio::test]
    async fn get_by_unknown_id_is_none() {
        let (_pool, repository) = repository().await;
        assert!(repository.get_by_id(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_status_only_touches_the_status_field() {
        let (_pool, repository) = repository().await;

        let created = repository
            .create_or_get(&sample_request_create())
            .await
            .unwrap();
        repository
            .update_status(created.id, RequestStatus::Finished)
            .await
            .unwrap();

        let fetched = repository.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, Some(RequestStatus::Finished));
        assert_eq!(fetched.dep_port, created.dep_port);
        assert_eq!(fetched.created_at, created.created_at);
    }

    #[tokio::test]
    async fn conflicting_identifier_recovers_with_a_greater_id() {
        let (pool, repository) = repository().await;

        repository
            .create_or_get(&sample_request_create())
            .await
            .unwrap();

        // another writer grabs the id this store is about to use
        let contested = repository.next_request_id().await.unwrap();
        sqlx::query(
            "INSERT INTO requests (id, dep_port, arr_port, dep_date, flex_option, sorted_by, direct, created_at) \
             VALUES (?, 'AMS', 'BCN', '2025-07-01', 0, 'price', 0, ?)",
        )
        .bind(contested)
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        let mut params = sample_request_create();
        params.arr_port = "JFK".to_string();
        let recovered = repository.insert_new(&params, contested).await.unwrap();

        assert!(recovered.id > contested);
        assert!(params.matches(&recovered));
    }
}
