//! Database layer for data persistence and access.
//!
//! Data access uses SQLx with PostgreSQL behind the Repository pattern.
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (api::handlers - HTTP request handlers)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Transactions
//!
//! Writes that touch more than one row (a review and its professional's rating
//! aggregate, a reservation and its conflict check) are done inside a single
//! transaction:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut repo = Reservations::new(&mut tx);
//! // ... operations ...
//! tx.commit().await?;
//! ```
//!
//! Read-only requests may borrow a pooled connection directly.
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are embedded at compile time; see
//! [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
