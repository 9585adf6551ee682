//! Repository implementations for database access.
//!
//! Each repository wraps a borrowed connection or transaction and exposes
//! strongly-typed operations returning records from [`crate::db::models`].
//! Entities with plain CRUD semantics implement the [`Repository`] trait; the
//! rest (images, messaging, billing) expose inherent methods only.
//!
//! # Available Repositories
//!
//! - [`Users`]: Accounts, credential lookups and login bookkeeping
//! - [`PasswordResetTokens`]: Password reset token lifecycle
//! - [`Professionals`]: Professional profiles, search and rating aggregates
//! - [`Categories`] and [`Services`]: The service catalogue
//! - [`Reservations`] and [`Availability`]: Booking and opening hours
//! - [`Reviews`]: Ratings left by customers
//! - [`Images`]: Uploaded gallery images
//! - [`Conversations`]: Customer/professional messaging
//! - [`Subscriptions`] and [`Payments`]: Billing records
//!
//! # Common Pattern
//!
//! ```ignore
//! use prohub::db::handlers::{Repository, Users};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!     let mut repo = Users::new(&mut tx);
//!     let user = repo.get_user_by_email("someone@example.com").await?;
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

pub mod availability;
pub mod categories;
pub mod images;
pub mod messaging;
pub mod password_reset_tokens;
pub mod payments;
pub mod professionals;
pub mod repository;
pub mod reservations;
pub mod reviews;
pub mod services;
pub mod users;

pub use availability::Availability;
pub use categories::Categories;
pub use images::Images;
pub use messaging::Conversations;
pub use password_reset_tokens::PasswordResetTokens;
pub use payments::{Payments, Subscriptions};
pub use professionals::Professionals;
pub use repository::Repository;
pub use reservations::Reservations;
pub use reviews::Reviews;
pub use services::Services;
pub use users::Users;
