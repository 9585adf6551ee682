//! HTTP request handlers for all API endpoints.
//!
//! Each handler declares its authentication and baseline permission in its
//! signature (see [`crate::auth::permissions::RequiresPermission`]), performs
//! ownership checks once the target record is loaded, and runs its writes inside
//! a single transaction.
//!
//! # Handler Modules
//!
//! - [`auth`]: Registration, login, logout, password change and reset
//! - [`oauth`]: Google sign-in and the frontend token handoff
//! - [`users`]: Account CRUD
//! - [`professionals`]: Profile CRUD and geo search
//! - [`categories`], [`services`]: The catalogue
//! - [`reservations`], [`availability`]: Booking and opening hours
//! - [`reviews`]: Ratings and moderation
//! - [`uploads`]: Profile and gallery images
//! - [`conversations`]: Customer/professional messaging
//! - [`payments`]: Subscription checkout, billing portal and provider webhooks
//! - [`chatbot`]: Assistant proxy
//! - [`config`]: Public frontend configuration
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to the matching HTTP
//! status code and a JSON error body.

pub mod auth;
pub mod availability;
pub mod categories;
pub mod chatbot;
pub mod config;
pub mod conversations;
pub mod oauth;
pub mod payments;
pub mod professionals;
pub mod reservations;
pub mod reviews;
pub mod services;
pub mod uploads;
pub mod users;
