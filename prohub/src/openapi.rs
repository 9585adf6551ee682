//! OpenAPI document for the REST API, served at `/openapi.json` and rendered by
//! Scalar at `/docs`.
//!
//! Provider webhooks and the local `/uploads` file route are left out: they are
//! not called by API clients.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::{self, models};

/// Session token, either as a bearer header or as the session cookie.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token returned by `/auth/login` or `/auth/register`:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "access_token",
                    "Session cookie set on login, registration and Google sign-in.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Prohub API",
        description = "Marketplace backend connecting customers with service professionals."
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::me,
        api::handlers::auth::change_password,
        api::handlers::auth::request_password_reset,
        api::handlers::auth::confirm_password_reset,
        api::handlers::oauth::google_redirect,
        api::handlers::oauth::google_authorization_url,
        api::handlers::oauth::google_callback,
        api::handlers::oauth::token_handoff,
        api::handlers::config::get_config,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
        api::handlers::professionals::list_professionals,
        api::handlers::professionals::create_professional,
        api::handlers::professionals::get_my_professional,
        api::handlers::professionals::get_professional,
        api::handlers::professionals::update_professional,
        api::handlers::professionals::delete_professional,
        api::handlers::categories::list_categories,
        api::handlers::categories::get_category,
        api::handlers::categories::create_category,
        api::handlers::categories::update_category,
        api::handlers::categories::delete_category,
        api::handlers::services::list_services,
        api::handlers::services::get_service,
        api::handlers::services::create_service,
        api::handlers::services::update_service,
        api::handlers::services::delete_service,
        api::handlers::reservations::create_reservation,
        api::handlers::reservations::list_reservations,
        api::handlers::reservations::list_my_reservations,
        api::handlers::reservations::get_reservation,
        api::handlers::reservations::update_reservation,
        api::handlers::reservations::delete_reservation,
        api::handlers::availability::list_availability,
        api::handlers::availability::create_availability,
        api::handlers::availability::update_availability,
        api::handlers::availability::delete_availability,
        api::handlers::reviews::list_reviews,
        api::handlers::reviews::list_professional_reviews,
        api::handlers::reviews::create_review,
        api::handlers::reviews::update_review_status,
        api::handlers::reviews::delete_review,
        api::handlers::uploads::upload_profile_image,
        api::handlers::uploads::list_images,
        api::handlers::uploads::upload_image,
        api::handlers::uploads::delete_image,
        api::handlers::conversations::list_conversations,
        api::handlers::conversations::create_conversation,
        api::handlers::conversations::list_messages,
        api::handlers::conversations::send_message,
        api::handlers::conversations::mark_read,
        api::handlers::payments::list_payments,
        api::handlers::payments::create_checkout,
        api::handlers::payments::confirm_checkout,
        api::handlers::payments::create_portal_session,
        api::handlers::payments::get_subscription,
        api::handlers::chatbot::ask,
    ),
    components(
        schemas(
            models::auth::RegisterRequest,
            models::auth::LoginRequest,
            models::auth::AuthResponse,
            models::auth::AuthSuccessResponse,
            models::auth::MeResponse,
            models::auth::ChangePasswordRequest,
            models::auth::PasswordResetRequest,
            models::auth::PasswordResetConfirmRequest,
            models::auth::PasswordResetResponse,
            models::auth::OAuthAction,
            models::auth::OAuthStartResponse,
            models::config::PublicConfig,
            models::users::Role,
            models::users::UserUpdate,
            models::users::UserResponse,
            models::professionals::ProfessionalCreate,
            models::professionals::ProfessionalUpdate,
            models::professionals::ProfessionalResponse,
            models::categories::CategoryCreate,
            models::categories::CategoryUpdate,
            models::categories::CategoryResponse,
            models::services::ServiceCreate,
            models::services::ServiceUpdate,
            models::services::ServiceResponse,
            models::reservations::ReservationStatus,
            models::reservations::ReservationCreate,
            models::reservations::ReservationUpdate,
            models::reservations::ReservationResponse,
            models::availability::AvailabilityCreate,
            models::availability::AvailabilityUpdate,
            models::availability::AvailabilityResponse,
            models::reviews::ReviewStatus,
            models::reviews::ReviewCreate,
            models::reviews::ReviewStatusUpdate,
            models::reviews::ReviewResponse,
            models::images::ImageResponse,
            models::images::ProfileImageResponse,
            models::images::ImageUploadForm,
            models::messaging::ConversationCreate,
            models::messaging::ConversationResponse,
            models::messaging::MessageCreate,
            models::messaging::MessageResponse,
            models::messaging::MarkReadResponse,
            models::payments::SubscriptionStatus,
            models::payments::PaymentStatus,
            models::payments::CheckoutResponse,
            models::payments::CheckoutConfirmation,
            models::payments::PortalResponse,
            models::payments::SubscriptionResponse,
            models::payments::PaymentResponse,
            models::chatbot::ChatRole,
            models::chatbot::ChatTurn,
            models::chatbot::ChatbotAskRequest,
            models::chatbot::ChatbotAskResponse,
        )
    ),
    tags(
        (name = "authentication", description = "Registration, login, sessions, password management and Google sign-in."),
        (name = "config", description = "Feature flags the frontend needs before login."),
        (name = "users", description = "Accounts. Customers and professionals manage their own, admins manage all."),
        (name = "professionals", description = "Professional profiles and geo search by distance from a point."),
        (name = "categories", description = "Service categories. Managed by admins."),
        (name = "services", description = "Services a professional offers, with price and duration."),
        (name = "reservations", description = "Bookings of a service on a date and time, and their status lifecycle.

Either side may cancel or reschedule an open reservation. Only the professional (or an admin) may
confirm it or mark it `completed` or `no_show`. `cancelled`, `completed` and `no_show` are final."),
        (name = "availability", description = "Weekly opening hours per professional. Slots on the same day may not overlap."),
        (name = "reviews", description = "Ratings left by customers after a completed reservation."),
        (name = "uploads", description = "Profile and gallery images."),
        (name = "conversations", description = "Messaging between a customer and a professional."),
        (name = "payments", description = "Professional subscription checkout, billing portal and payment history."),
        (name = "chatbot", description = "Assistant that helps customers find the right professional."),
    )
)]
pub struct ApiDoc;
