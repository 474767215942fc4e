use async_trait::async_trait;

use flightcrawl_core::Result;

use crate::entities::{Request, RequestCreate, RequestStatus};

/// Persistence boundary for `Request` rows.
///
/// Sessions behind an implementation are short-lived pool acquisitions;
/// none may be held across a queue wait or a crawl.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Return the row matching all of `create`'s business fields, inserting
    /// one when none exists. Insert collisions on the identifier are
    /// recovered once by re-assigning `max(id) + 1`; a second conflict
    /// propagates.
    async fn create_or_get(&self, create: &RequestCreate) -> Result<Request>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Request>>;

    /// Status-only update, last writer wins. The value is not validated at
    /// this layer.
    async fn update_status(&self, id: i64, status: RequestStatus) -> Result<()>;
}
