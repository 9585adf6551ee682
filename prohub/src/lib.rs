//! # prohub: marketplace backend for service professionals
//!
//! `prohub` is the REST backend of a two-sided marketplace. Customers browse
//! professionals and the services they offer, book reservations against their
//! availability, message them and leave reviews. Professionals manage their
//! profile, catalogue, opening hours and image gallery, and pay a subscription
//! to be listed.
//!
//! ## Architecture
//!
//! The crate is a single Axum application on top of PostgreSQL:
//!
//! - **API layer** ([`api`]): Axum handlers and the JSON request/response models
//! - **Authentication** ([`auth`]): JWT sessions (bearer header or cookie), Argon2
//!   passwords, Google OAuth and role/ownership based permissions
//! - **Database** ([`db`]): SQLx repositories over PostgreSQL
//! - **Integrations**: [`payment_providers`] (Stripe or a dummy provider),
//!   [`storage`] (S3 or local disk images), [`email`] (SMTP or file), [`chatbot`]
//!   (OpenAI-compatible chat completions)
//!
//! ## Request flow
//!
//! ```text
//! Browser / API client
//!        │
//!        ▼
//! CORS + tracing (+ metrics) layers
//!        │
//!        ▼
//! Extractors: CurrentUser / RequiresPermission<Resource, Operation>
//!        │
//!        ▼
//! Handler ──► Repositories (transaction) ──► PostgreSQL
//!        │
//!        └──► Payment provider / image store / email / chatbot
//! ```
//!
//! ## Getting started
//!
//! ```no_run
//! use prohub::{Application, Config, telemetry};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = prohub::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async { tokio::signal::ctrl_c().await.ok(); }).await
//! }
//! ```
//!
//! See [`config`] for every configuration option.

pub mod api;
pub mod auth;
pub mod chatbot;
pub mod client;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
pub mod geo;
mod openapi;
pub mod payment_providers;
pub mod storage;
pub mod telemetry;
mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    api::{handlers, models::users::Role},
    auth::password,
    config::CorsOrigin,
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    errors::Error,
    openapi::ApiDoc,
    storage::ImageStore,
};
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    routing::{delete, get, patch, post, put},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{
    AvailabilityId, CategoryId, ConversationId, ImageId, MessageId, PaymentId, ProfessionalId, ReservationId, ReviewId, ServiceId,
    SubscriptionId, UserId,
};

/// Multipart framing on top of the raw file bytes, allowed past the upload limit so
/// an oversized file still reaches the handler and gets a proper 413 body.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// Outbound integrations that are cheap to build (payment provider, email, chatbot,
/// OAuth client) are constructed from `config` per request; the image store holds an
/// S3 client and is built once at startup.
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .storage(store)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Where uploaded images go. `None` disables the upload routes.
    pub storage: Option<Arc<dyn ImageStore>>,
}

/// HTTP client for outbound calls (OAuth, Stripe, chatbot).
///
/// reqwest is built without a bundled TLS provider, so the process-wide rustls
/// provider is installed on first use.
pub fn http_client() -> reqwest::Client {
    // Fails only when a provider is already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    reqwest::Client::new()
}

/// Get the prohub database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: an existing account with this email is promoted to admin and, when
/// a password is given, has its password replaced. Returns the admin's user ID.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, password: Option<&str>, db: &PgPool) -> Result<UserId, Error> {
    let password_hash = match password {
        Some(pwd) => Some(password::hash_string(pwd)?),
        None => None,
    };

    let mut tx = db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut tx);

    let user_id = if let Some(existing_user) = user_repo.get_user_by_email(email).await? {
        let update = UserUpdateDBRequest {
            role: Some(Role::Admin),
            password_hash,
            ..Default::default()
        };
        user_repo.update(existing_user.id, &update).await?;
        existing_user.id
    } else {
        let user_create = UserCreateDBRequest {
            email: email.to_string(),
            display_name: Some("Administrator".to_string()),
            avatar_url: None,
            role: Role::Admin,
            auth_source: "system".to_string(),
            password_hash,
            external_user_id: None,
        };
        user_repo.create(&user_create).await?.id
    };

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(user_id)
}

/// Connect the main connection pool
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let pool_settings = &config.database.pool;
    let pool = PgPoolOptions::new()
        .max_connections(pool_settings.max_connections)
        .min_connections(pool_settings.min_connections)
        .acquire_timeout(pool_settings.acquire_timeout)
        .connect(&config.database.url)
        .await?;
    info!("Connected to database");
    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;
    let mut origins = Vec::with_capacity(cors_config.allowed_origins.len());
    for origin in &cors_config.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            // Origins never carry the trailing slash `Url` normalises to
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE, http::header::ACCEPT])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers([http::header::LOCATION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with every endpoint and middleware.
///
/// - Authentication routes under `/auth` (native, Google OAuth, token handoff)
/// - Marketplace resources (users, professionals, catalogue, bookings, reviews,
///   uploads, messaging, payments, chatbot)
/// - Provider webhooks, health check, OpenAPI document and Scalar docs
/// - CORS, tracing and, when enabled, Prometheus metrics at `/internal/metrics`
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let upload_limit = DefaultBodyLimit::max(state.config.limits.max_upload_bytes + MULTIPART_OVERHEAD_BYTES);

    let auth_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/password-change", post(handlers::auth::change_password))
        .route("/auth/password-resets", post(handlers::auth::request_password_reset))
        .route(
            "/auth/password-resets/{token_id}/confirm",
            post(handlers::auth::confirm_password_reset),
        )
        .route(
            "/auth/google",
            get(handlers::oauth::google_redirect).post(handlers::oauth::google_authorization_url),
        )
        .route("/auth/google/callback", get(handlers::oauth::google_callback))
        .route("/auth/callback", get(handlers::oauth::token_handoff));

    let api_routes = Router::new()
        .route("/config", get(handlers::config::get_config))
        // Users
        .route("/users", get(handlers::users::list_users))
        .route(
            "/users/{user_id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        // Professionals
        .route(
            "/professional",
            get(handlers::professionals::list_professionals).post(handlers::professionals::create_professional),
        )
        .route("/professional/me", get(handlers::professionals::get_my_professional))
        .route(
            "/professional/{id}",
            get(handlers::professionals::get_professional)
                .put(handlers::professionals::update_professional)
                .delete(handlers::professionals::delete_professional),
        )
        .route("/professional/{id}/reviews", get(handlers::reviews::list_professional_reviews))
        // Catalogue
        .route(
            "/categories",
            get(handlers::categories::list_categories).post(handlers::categories::create_category),
        )
        .route(
            "/categories/{id}",
            get(handlers::categories::get_category)
                .put(handlers::categories::update_category)
                .delete(handlers::categories::delete_category),
        )
        .route(
            "/services",
            get(handlers::services::list_services).post(handlers::services::create_service),
        )
        .route(
            "/services/{id}",
            get(handlers::services::get_service)
                .put(handlers::services::update_service)
                .delete(handlers::services::delete_service),
        )
        // Bookings
        .route(
            "/reservations",
            get(handlers::reservations::list_reservations).post(handlers::reservations::create_reservation),
        )
        .route("/reservations/me", get(handlers::reservations::list_my_reservations))
        .route(
            "/reservations/{id}",
            get(handlers::reservations::get_reservation)
                .put(handlers::reservations::update_reservation)
                .delete(handlers::reservations::delete_reservation),
        )
        .route(
            "/available/professional/{id}",
            get(handlers::availability::list_availability).post(handlers::availability::create_availability),
        )
        .route(
            "/available/{slot_id}",
            put(handlers::availability::update_availability).delete(handlers::availability::delete_availability),
        )
        // Reviews
        .route("/reviews", get(handlers::reviews::list_reviews).post(handlers::reviews::create_review))
        .route("/reviews/{id}", delete(handlers::reviews::delete_review))
        .route("/reviews/{id}/status", patch(handlers::reviews::update_review_status))
        // Images
        .route(
            "/upload-img/{professional_id}/profile-image",
            put(handlers::uploads::upload_profile_image).layer(upload_limit.clone()),
        )
        .route(
            "/upload-img/{professional_id}/images",
            get(handlers::uploads::list_images).post(handlers::uploads::upload_image).layer(upload_limit),
        )
        .route("/upload-img/images/{image_id}", delete(handlers::uploads::delete_image))
        .route("/uploads/{*key}", get(handlers::uploads::serve_upload))
        // Messaging
        .route(
            "/conversations",
            get(handlers::conversations::list_conversations).post(handlers::conversations::create_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            get(handlers::conversations::list_messages).post(handlers::conversations::send_message),
        )
        .route("/conversations/{id}/read", post(handlers::conversations::mark_read))
        // Billing
        .route("/payments", get(handlers::payments::list_payments))
        .route("/payments/checkout", post(handlers::payments::create_checkout))
        .route(
            "/payments/checkout/{session_id}/confirm",
            post(handlers::payments::confirm_checkout),
        )
        .route("/payments/portal", post(handlers::payments::create_portal_session))
        .route("/payments/subscription", get(handlers::payments::get_subscription))
        // Assistant
        .route("/chatbot/ask", post(handlers::chatbot::ask));

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        // Webhook routes (external services, not part of client API docs)
        .route("/webhooks/payments", post(handlers::payments::webhook_handler))
        .merge(auth_routes)
        .merge(api_routes)
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let mut router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(move || async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// A fully initialised server: database migrated, admin ensured, integrations
/// built and router assembled.
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Like [`Application::new`], reusing an existing pool when one is given
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting prohub with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => pool,
            None => setup_database(&config).await?,
        };
        migrator().run(&pool).await?;

        create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {}", e))?;

        let storage = storage::create_store(&config.storage, &config.public_url).await?;

        match &config.payment {
            Some(payment) => info!("Payments enabled via {}", payment_providers::create_provider(payment.clone()).name()),
            None => info!("Payments disabled"),
        }

        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .storage(storage)
            .build();
        let router = build_router(&app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("prohub listening on http://{}, public URL {}", bind_addr, self.config.public_url);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
