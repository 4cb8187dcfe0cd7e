//! Query execution backend
//!
//! The engine hands a backend nothing but [`BuiltQuery`] values; the backend
//! runs them and returns decoded rows.

use async_trait::async_trait;

use restgate_common::error::{Error, Result};

use crate::decode::JsonRow;
use crate::sql::BuiltQuery;

/// Unified query interface for the engine
///
/// Implementations must run every query of one [`fetch_all`](Self::fetch_all)
/// call on a single pooled connection and release it on every path.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Execute the queries in order on one connection, returning each result set
    async fn fetch_all(&self, queries: &[BuiltQuery]) -> Result<Vec<Vec<JsonRow>>>;

    /// Execute a single query
    async fn fetch(&self, query: &BuiltQuery) -> Result<Vec<JsonRow>> {
        self.fetch_all(std::slice::from_ref(query))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InternalError("backend returned no result set".to_string()))
    }

    /// Check connectivity
    async fn ping(&self) -> Result<()>;
}
