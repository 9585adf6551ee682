//! Fixtures shared by the database and HTTP tests.

use crate::{
    AppState,
    api::models::{
        professionals::ProfessionalCreate,
        users::{CurrentUser, Role, UserResponse},
    },
    auth::session,
    config::{Config, DummyConfig, EmailConfig, EmailTransportConfig, PasswordConfig, PaymentConfig, PoolSettings, StorageConfig},
    db::{
        handlers::{Categories, Professionals, Repository, Services, Users},
        models::{
            categories::{CategoryCreateDBRequest, CategoryDBResponse},
            professionals::{ProfessionalCreateDBRequest, ProfessionalDBResponse},
            services::{ServiceCreateDBRequest, ServiceDBResponse},
            users::UserCreateDBRequest,
        },
    },
    types::{ProfessionalId, UserId},
};
use axum_test::TestServer;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

/// Router over a fresh state, without the startup work `Application` does
pub async fn create_test_app(pool: PgPool) -> TestServer {
    let state = create_test_app_state(pool, create_test_config()).await;
    let router = crate::build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> TestServer {
    let state = create_test_app_state(pool, config).await;
    let router = crate::build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

pub async fn create_test_app_state(pool: PgPool, config: Config) -> AppState {
    let storage = crate::storage::create_store(&config.storage, &config.public_url)
        .await
        .expect("Failed to create image store");
    AppState::builder().db(pool).config(config).storage(storage).build()
}

pub fn create_test_config() -> Config {
    // Per-process temp dirs for written emails and uploaded images
    let temp_root = std::env::temp_dir().join(format!("prohub-test-{}", std::process::id()));

    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_email: "admin@test.com".to_string(),
        admin_password: None,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        email: EmailConfig {
            transport: EmailTransportConfig::File {
                path: temp_root.join("emails").to_string_lossy().to_string(),
            },
            ..Default::default()
        },
        storage: StorageConfig::Local {
            path: temp_root.join("uploads").to_string_lossy().to_string(),
        },
        payment: Some(PaymentConfig::Dummy(DummyConfig {
            amount: Decimal::new(1999, 2),
            currency: "usd".to_string(),
        })),
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    };
    config.database.pool = PoolSettings {
        max_connections: 2,
        min_connections: 0,
        ..Default::default()
    };
    config.auth.native.password = PasswordConfig {
        argon2_memory_kib: 1024,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        ..Default::default()
    };
    config
}

async fn insert_user(pool: &PgPool, role: Role, display_name: &str) -> UserResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let user_id = Uuid::new_v4();
    let user_create = UserCreateDBRequest {
        email: format!("testuser_{}@example.com", user_id.simple()),
        display_name: Some(display_name.to_string()),
        avatar_url: None,
        role,
        auth_source: "test".to_string(),
        password_hash: None,
        external_user_id: None,
    };
    Users::new(&mut conn)
        .create(&user_create)
        .await
        .expect("Failed to create test user")
        .into()
}

pub async fn create_test_user(pool: &PgPool, role: Role) -> UserResponse {
    insert_user(pool, role, "Test User").await
}

pub async fn create_test_admin_user(pool: &PgPool) -> UserResponse {
    insert_user(pool, Role::Admin, "Test Admin").await
}

pub async fn get_user(pool: &PgPool, user_id: UserId) -> UserResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .get_by_id(user_id)
        .await
        .expect("Failed to load user")
        .expect("User should exist")
        .into()
}

/// A professional account with a geolocated profile (central Madrid, 10 km radius)
pub async fn create_test_professional(pool: &PgPool) -> ProfessionalDBResponse {
    let user = insert_user(pool, Role::Professional, "Test Professional").await;
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let create = ProfessionalCreateDBRequest::new(
        user.id,
        ProfessionalCreate {
            speciality: Some("Plumbing".to_string()),
            bio: Some("Fixes leaks fast".to_string()),
            location: Some("Madrid".to_string()),
            latitude: Some(40.4168),
            longitude: Some(-3.7038),
            service_radius_km: Some(10.0),
        },
    );
    Professionals::new(&mut conn)
        .create(&create)
        .await
        .expect("Failed to create test professional")
}

pub async fn create_test_service(pool: &PgPool, professional_id: ProfessionalId) -> ServiceDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let create = ServiceCreateDBRequest {
        professional_id,
        category_id: None,
        name: format!("Service {}", Uuid::new_v4().simple()),
        description: Some("Standard call-out".to_string()),
        price: Decimal::new(4500, 2),
        duration_minutes: 60,
        is_active: true,
    };
    Services::new(&mut conn)
        .create(&create)
        .await
        .expect("Failed to create test service")
}

pub async fn create_test_category(pool: &PgPool, name: &str) -> CategoryDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let create = CategoryCreateDBRequest {
        name: name.to_string(),
        description: None,
    };
    Categories::new(&mut conn)
        .create(&create)
        .await
        .expect("Failed to create test category")
}

/// Session token for the user, signed with the test config's key
pub fn session_token(user: &UserResponse) -> String {
    let current_user = CurrentUser::from(user.clone());
    session::create_session_token(&current_user, &create_test_config()).expect("Failed to create session token")
}

/// Headers authenticating requests as the user
pub fn add_auth_headers(user: &UserResponse) -> Vec<(String, String)> {
    vec![("authorization".to_string(), format!("Bearer {}", session_token(user)))]
}
