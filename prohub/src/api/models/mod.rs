//! API request and response data models.
//!
//! These structures define the public JSON contract and are kept separate from the
//! database models so storage and wire formats can evolve independently. JSON field
//! names are camelCase throughout.
//!
//! - [`users`], [`auth`]: accounts, roles, sessions and password flows
//! - [`professionals`], [`services`], [`categories`]: the marketplace catalogue
//! - [`reservations`], [`availability`]: scheduling
//! - [`reviews`], [`images`], [`messaging`]: profile content and customer contact
//! - [`payments`], [`chatbot`]: integrations
//! - [`config`]: public feature switches
//! - [`pagination`], [`clock`]: shared query and formatting helpers

pub mod auth;
pub mod availability;
pub mod categories;
pub mod chatbot;
pub mod clock;
pub mod config;
pub mod images;
pub mod messaging;
pub mod pagination;
pub mod payments;
pub mod professionals;
pub mod reservations;
pub mod reviews;
pub mod services;
pub mod users;
