//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Authentication** (`/auth/*`): Registration, login, sessions, password flows, Google OAuth
//! - **Users** (`/users/*`): Account management
//! - **Professionals** (`/professional/*`): Profiles, search and reviews
//! - **Catalogue** (`/categories/*`, `/services/*`)
//! - **Bookings** (`/reservations/*`, `/available/*`)
//! - **Reviews** (`/reviews/*`)
//! - **Images** (`/upload-img/*`, `/uploads/*`)
//! - **Messaging** (`/conversations/*`)
//! - **Billing** (`/payments/*`, `/webhooks/payments`)
//! - **Assistant** (`/chatbot/ask`)
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with `utoipa` annotations. The document is served at
//! `/openapi.json` and rendered at `/docs` when the server is running.

pub mod handlers;
pub mod models;
