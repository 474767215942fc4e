mod manager;
mod postgres;
mod sqlite;

pub use manager::RepositoryFactory;
pub use postgres::PostgresRequestRepository;
pub use sqlite::SqliteRequestRepository;

use flightcrawl_core::CrawlerError;

/// Primary-key conflicts are the one database error the stores recover
/// from locally.
pub(crate) fn is_unique_violation(err: &CrawlerError) -> bool {
    matches!(
        err,
        CrawlerError::Database(sqlx::Error::Database(db))
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}
