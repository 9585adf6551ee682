//! Database record models matching table schemas.
//!
//! Each module holds the create/update request structs a repository accepts and the
//! `FromRow` response struct it returns. Responses often carry a few joined columns
//! (display names, category names) so API models can be built without a second query.
//!
//! API models convert from these with `From`:
//!
//! ```ignore
//! use prohub::api::models::services::ServiceResponse;
//!
//! let response: ServiceResponse = db_service.into();
//! ```

pub mod availability;
pub mod categories;
pub mod images;
pub mod messaging;
pub mod password_reset_tokens;
pub mod payments;
pub mod professionals;
pub mod reservations;
pub mod reviews;
pub mod services;
pub mod users;
