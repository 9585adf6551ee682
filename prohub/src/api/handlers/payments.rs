//! HTTP handlers for subscription checkout, billing and provider webhooks.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use tracing::{error, info};

use crate::{
    AppState,
    api::models::{
        pagination::PaginatedResponse,
        payments::{
            CheckoutConfirmation, CheckoutResponse, ListPaymentsQuery, PaymentResponse, PortalResponse,
            SubscriptionResponse,
        },
        users::CurrentUser,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Payments, Professionals, Repository, Subscriptions, Users},
        models::{professionals::ProfessionalDBResponse, users::UserDBResponse},
    },
    errors::{Error, Result},
    payment_providers::{self, CheckoutRequest, PaymentError, PaymentProvider},
    types::{Operation, Permission, Resource},
};

fn provider(state: &AppState) -> Result<Box<dyn PaymentProvider>> {
    state
        .config
        .payment
        .clone()
        .map(payment_providers::create_provider)
        .ok_or_else(|| Error::ServiceUnavailable {
            message: "Payments are not enabled".to_string(),
        })
}

/// Where the provider sends the user back to, with an optional query string
fn billing_url(state: &AppState, query: &str) -> String {
    let base = state.config.frontend_url.as_str().trim_end_matches('/');
    if query.is_empty() {
        format!("{base}/dashboard/billing")
    } else {
        format!("{base}/dashboard/billing?{query}")
    }
}

async fn load_caller(state: &AppState, user: &CurrentUser) -> Result<(UserDBResponse, Option<ProfessionalDBResponse>)> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let record = Users::new(&mut conn).get_by_id(user.id).await?.ok_or_else(|| Error::Unauthenticated {
        message: Some("User no longer exists".to_string()),
    })?;
    let professional = Professionals::new(&mut conn).get_by_user_id(user.id).await?;
    Ok((record, professional))
}

#[utoipa::path(
    get,
    path = "/payments",
    tag = "payments",
    summary = "Payment history",
    description = "The caller's own payments, newest first.",
    params(ListPaymentsQuery),
    responses(
        (status = 200, description = "Paginated list of payments", body = PaginatedResponse<PaymentResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
    current_user: RequiresPermission<resource::Payments, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<PaymentResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Payments::new(&mut conn);
    let payments = repo.list_for_user(current_user.id, skip, limit).await?;
    let total_count = repo.count_for_user(current_user.id).await?;

    Ok(Json(PaginatedResponse::new(
        payments.into_iter().map(PaymentResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/payments/checkout",
    tag = "payments",
    summary = "Start subscription checkout",
    description = "Creates a hosted checkout for the caller's professional subscription. \
        The provider redirects back to the billing page with the session ID.",
    responses(
        (status = 200, description = "Checkout created", body = CheckoutResponse),
        (status = 400, description = "Caller has no professional profile"),
        (status = 403, description = "Only professionals subscribe"),
        (status = 503, description = "Payments disabled or provider unavailable"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_checkout(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Payments, operation::CreateOwn>,
) -> Result<Json<CheckoutResponse>> {
    let provider = provider(&state)?;
    let (user, professional) = load_caller(&state, &current_user).await?;
    let professional = professional.ok_or_else(|| Error::BadRequest {
        message: "Create a professional profile before subscribing".to_string(),
    })?;

    let success_url = billing_url(&state, "payment=success&session_id={CHECKOUT_SESSION_ID}");
    let cancel_url = billing_url(&state, "payment=cancelled");
    let session = provider
        .create_checkout_session(CheckoutRequest {
            user: &current_user,
            professional_id: professional.id,
            customer_id: user.payment_provider_id.as_deref(),
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await?;

    info!(session_id = %session.id, professional_id = %professional.id, "Checkout session created");
    Ok(Json(CheckoutResponse {
        url: session.url,
        session_id: session.id,
    }))
}

#[utoipa::path(
    post,
    path = "/payments/checkout/{session_id}/confirm",
    tag = "payments",
    summary = "Confirm checkout",
    description = "Looks the session up with the provider and, once paid, activates the subscription. \
        Safe to call repeatedly and alongside the webhook.",
    params(("session_id" = String, Path, description = "Provider checkout session ID")),
    responses(
        (status = 200, description = "Checkout fulfilled", body = CheckoutConfirmation),
        (status = 400, description = "Unknown session"),
        (status = 403, description = "Session belongs to someone else"),
        (status = 409, description = "Payment not completed yet"),
        (status = 503, description = "Payments disabled or provider unavailable"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_checkout(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    current_user: CurrentUser,
) -> Result<Json<CheckoutConfirmation>> {
    let provider = provider(&state)?;
    let session = provider.get_checkout_session(&session_id).await?;

    if session.user_id != current_user.id && !current_user.is_admin() {
        return Err(Error::InsufficientPermissions {
            required: Permission::Owner,
            action: Operation::UpdateOwn,
            resource: Resource::Payments.to_string(),
        });
    }
    if !session.is_paid {
        return Err(PaymentError::PaymentNotCompleted.into());
    }

    let subscription = payment_providers::fulfil_session(&state.db, provider.name(), &session).await?;
    Ok(Json(CheckoutConfirmation {
        paid: true,
        subscription: Some(subscription.into()),
    }))
}

#[utoipa::path(
    post,
    path = "/payments/portal",
    tag = "payments",
    summary = "Open billing portal",
    responses(
        (status = 200, description = "Billing portal URL", body = PortalResponse),
        (status = 400, description = "Caller has never paid"),
        (status = 503, description = "Payments disabled or provider unavailable"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_portal_session(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Payments, operation::ReadOwn>,
) -> Result<Json<PortalResponse>> {
    let provider = provider(&state)?;
    let (user, _) = load_caller(&state, &current_user).await?;
    let customer_id = user.payment_provider_id.ok_or(PaymentError::NoCustomerId)?;

    let url = provider
        .create_billing_portal_session(&customer_id, &billing_url(&state, ""))
        .await?;
    Ok(Json(PortalResponse { url }))
}

#[utoipa::path(
    get,
    path = "/payments/subscription",
    tag = "payments",
    summary = "Current subscription",
    responses(
        (status = 200, description = "The caller's subscription", body = SubscriptionResponse),
        (status = 404, description = "No professional profile or no subscription"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_subscription(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Payments, operation::ReadOwn>,
) -> Result<Json<SubscriptionResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let not_found = || Error::NotFound {
        resource: "Subscription".to_string(),
        id: current_user.id.to_string(),
    };

    let professional = Professionals::new(&mut conn)
        .get_by_user_id(current_user.id)
        .await?
        .ok_or_else(not_found)?;
    let subscription = Subscriptions::new(&mut conn)
        .get_by_professional(professional.id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(subscription.into()))
}

/// Provider webhook. The signature is checked before anything is recorded.
/// Once verified, processing failures are logged and acknowledged so the provider
/// does not keep retrying; checkout confirmation covers anything missed.
#[tracing::instrument(skip_all)]
pub async fn webhook_handler(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<StatusCode> {
    let provider = provider(&state)?;

    let Some(event) = provider.validate_webhook(&headers, &body).await? else {
        return Ok(StatusCode::OK);
    };
    info!("Received {} webhook: {:?}", provider.name(), event);

    if let Err(e) = provider.process_webhook_event(&state.db, &event).await {
        error!("Failed to process webhook event: {}", e);
    }
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::payments::{PaymentStatus, SubscriptionStatus};
    use crate::api::models::users::Role;
    use crate::config::{PaymentConfig, StripeConfig};
    use crate::test_utils::{
        add_auth_headers, create_test_app, create_test_app_with_config, create_test_config, create_test_professional,
        create_test_user, get_user,
    };
    use hmac::{Hmac, Mac};
    use serde_json::json;
    use sha2::Sha256;
    use sqlx::PgPool;

    fn session_id_from(url: &str) -> String {
        let url = url::Url::parse(url).unwrap();
        url.query_pairs().find(|(k, _)| k == "session_id").unwrap().1.to_string()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_dummy_checkout_flow(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let professional = create_test_professional(&pool).await;
        let owner = get_user(&pool, professional.user_id).await;
        let headers = add_auth_headers(&owner);

        app.get("/payments/subscription")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let checkout: CheckoutResponse = app
            .post("/payments/checkout")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .json();
        assert!(checkout.url.starts_with("http://localhost:3000/dashboard/billing?payment=success"));
        let session_id = session_id_from(&checkout.url);
        assert_eq!(session_id, checkout.session_id);

        // Confirming twice records one subscription and one payment
        for _ in 0..2 {
            let confirmation: CheckoutConfirmation = app
                .post(&format!("/payments/checkout/{session_id}/confirm"))
                .add_header(&headers[0].0, &headers[0].1)
                .await
                .json();
            assert!(confirmation.paid);
            let subscription = confirmation.subscription.unwrap();
            assert_eq!(subscription.status, SubscriptionStatus::Active);
            assert!(subscription.is_entitled);
        }

        let subscription: SubscriptionResponse = app
            .get("/payments/subscription")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .json();
        assert_eq!(subscription.professional_id, professional.id);

        let payments: PaginatedResponse<PaymentResponse> = app
            .get("/payments")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .json();
        assert_eq!(payments.total_count, 1);
        assert_eq!(payments.data[0].status, PaymentStatus::Succeeded);
        assert_eq!(payments.data[0].provider, "dummy");

        // Someone else cannot confirm this session
        let other = create_test_user(&pool, Role::Professional).await;
        let headers = add_auth_headers(&other);
        app.post(&format!("/payments/checkout/{session_id}/confirm"))
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_checkout_requirements(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;

        let customer = create_test_user(&pool, Role::Customer).await;
        let headers = add_auth_headers(&customer);
        app.post("/payments/checkout")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        // Professional role without a profile
        let professional = create_test_user(&pool, Role::Professional).await;
        let headers = add_auth_headers(&professional);
        app.post("/payments/checkout")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        // Never paid, so there is no billing customer
        app.post("/payments/portal")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        app.post("/payments/checkout/not_a_session/confirm")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_payments_disabled(pool: PgPool) {
        let mut config = create_test_config();
        config.payment = None;
        let app = create_test_app_with_config(pool.clone(), config).await;
        let professional = create_test_professional(&pool).await;
        let headers = add_auth_headers(&get_user(&pool, professional.user_id).await);

        app.post("/payments/checkout")
            .add_header(&headers[0].0, &headers[0].1)
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
        app.post("/webhooks/payments")
            .text("{}")
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_stripe_webhook_requires_valid_signature(pool: PgPool) {
        const SECRET: &str = "whsec_handler_test";
        let mut config = create_test_config();
        config.payment = Some(PaymentConfig::Stripe(StripeConfig {
            api_key: "sk_test_fake".to_string(),
            webhook_secret: SECRET.to_string(),
            price_id: "price_fake".to_string(),
            api_base: url::Url::parse("http://127.0.0.1:9/").unwrap(),
        }));
        let app = create_test_app_with_config(pool.clone(), config).await;

        // Seed a subscription the webhook can refer to
        let professional = create_test_professional(&pool).await;
        payment_providers::fulfil_session(
            &pool,
            "stripe",
            &payment_providers::PaymentSession {
                session_id: "cs_test_1".to_string(),
                professional_id: professional.id,
                user_id: professional.user_id,
                amount: rust_decimal::Decimal::new(1999, 2),
                currency: "usd".to_string(),
                is_paid: true,
                customer_id: Some("cus_1".to_string()),
                subscription_id: Some("sub_1".to_string()),
            },
        )
        .await
        .unwrap();

        let body = json!({
            "id": "evt_1",
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_1", "status": "canceled" } }
        })
        .to_string();

        app.post("/webhooks/payments")
            .add_header("stripe-signature", "t=1,v1=deadbeef")
            .text(body.clone())
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let t = chrono::Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{t}.{body}").as_bytes());
        let signature = format!("t={t},v1={}", hex::encode(mac.finalize().into_bytes()));
        app.post("/webhooks/payments")
            .add_header("stripe-signature", signature)
            .text(body)
            .await
            .assert_status_ok();

        let mut conn = pool.acquire().await.unwrap();
        let subscription = Subscriptions::new(&mut conn)
            .get_by_professional(professional.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(subscription.status, SubscriptionStatus::Canceled);
    }
}
