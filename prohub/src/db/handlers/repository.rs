//! Shared CRUD surface of the table repositories.
//!
//! Every repository borrows a `PgConnection`, so a handler can run several of them
//! inside one transaction (`Reservations::new(&mut tx)`, then `Professionals::new(&mut tx)`)
//! and commit once. Table-specific queries such as overlap checks or row locks live
//! on the concrete repository, not here.

use std::collections::HashMap;

use crate::db::errors::Result;

#[async_trait::async_trait]
pub trait Repository {
    /// Insert payload, already validated by the API layer
    type CreateRequest;

    /// Partial update; `None` fields are left untouched
    type UpdateRequest;

    /// Row as read back from the table, joined columns included
    type Response;

    type Id: Send + Sync;

    /// Filter and pagination for `list`
    type Filter: Send + Sync;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    /// Rows for the given ids, keyed by id. Missing ids are absent from the map.
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>>;

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Returns false when nothing matched
    async fn delete(&mut self, id: Self::Id) -> Result<bool>;

    /// Fails with `NotFound` when the row does not exist
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;
}
