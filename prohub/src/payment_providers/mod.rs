//! Payment provider abstraction layer
//!
//! This module defines the `PaymentProvider` trait which abstracts subscription
//! billing across providers (Stripe, and a dummy provider for development).
//!
//! Providers only talk to the billing service. Recording what happened is shared:
//! [`PaymentProvider::process_checkout_session`] and
//! [`PaymentProvider::process_webhook_event`] turn provider state into idempotent
//! upserts on `subscriptions` and `payments`, keyed on the provider's own
//! identifiers, so redirects, retries and duplicate webhook deliveries are safe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};

use crate::{
    api::models::{
        payments::{PaymentStatus, SubscriptionStatus},
        users::CurrentUser,
    },
    config::PaymentConfig,
    db::{
        errors::DbError,
        handlers::{Payments, Professionals, Repository, Subscriptions, Users},
        models::{
            payments::{PaymentUpsertDBRequest, SubscriptionDBResponse, SubscriptionUpsertDBRequest},
            users::UserUpdateDBRequest,
        },
    },
    errors::Error,
    types::{ProfessionalId, UserId, abbrev_uuid},
};

pub mod dummy;
pub mod stripe;

/// Create a payment provider from configuration
///
/// This is the single point where we convert config into provider instances.
/// Adding a new provider requires adding a match arm here.
pub fn create_provider(config: PaymentConfig) -> Box<dyn PaymentProvider> {
    match config {
        PaymentConfig::Stripe(stripe_config) => Box::new(stripe::StripeProvider::from(stripe_config)),
        PaymentConfig::Dummy(dummy_config) => Box::new(dummy::DummyProvider::from(dummy_config)),
    }
}

/// Result type for payment provider operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors that can occur during payment processing
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Payment not completed yet")]
    PaymentNotCompleted,

    #[error("Invalid payment data: {0}")]
    InvalidData(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("User does not have a payment provider customer ID")]
    NoCustomerId,
}

impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        PaymentError::Database(err.into())
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::ProviderApi(err.to_string())
    }
}

impl From<PaymentError> for Error {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::PaymentNotCompleted => Error::Conflict { message: err.to_string() },
            PaymentError::InvalidData(_) | PaymentError::InvalidSignature(_) | PaymentError::NoCustomerId => {
                Error::BadRequest { message: err.to_string() }
            }
            PaymentError::Database(db) => Error::Database(db),
            PaymentError::ProviderApi(message) => {
                warn!("Payment provider request failed: {message}");
                Error::ServiceUnavailable {
                    message: "The payment provider is unavailable right now, please try again later".to_string(),
                }
            }
        }
    }
}

/// A freshly created hosted checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    /// Provider-hosted page to send the user to
    pub url: String,
}

/// Who is paying and for which professional profile
#[derive(Debug, Clone, Copy)]
pub struct CheckoutRequest<'a> {
    pub user: &'a CurrentUser,
    pub professional_id: ProfessionalId,
    /// Existing provider customer, reused so the portal shows one billing history
    pub customer_id: Option<&'a str>,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

/// A checkout session as reported by the provider
#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub session_id: String,
    pub professional_id: ProfessionalId,
    /// Local user who paid
    pub user_id: UserId,
    /// Amount paid, in major currency units
    pub amount: Decimal,
    pub currency: String,
    /// Whether the payment has been completed
    pub is_paid: bool,
    pub customer_id: Option<String>,
    /// Provider subscription created by the checkout, if any
    pub subscription_id: Option<String>,
}

/// Provider webhook, normalized to what we record locally
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    /// A checkout finished; the session is looked up again before fulfilment
    CheckoutCompleted { session_id: String },
    /// Subscription created, changed or deleted
    SubscriptionUpdated {
        subscription_id: String,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
    },
    /// An invoice was charged, successfully or not
    Invoice {
        invoice_id: String,
        subscription_id: Option<String>,
        customer_id: Option<String>,
        amount: Decimal,
        currency: String,
        status: PaymentStatus,
    },
    /// Valid event we do not act on
    Ignored { event_type: String },
}

/// Abstract payment provider interface
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Short provider name stored alongside subscriptions and payments
    fn name(&self) -> &'static str;

    /// Create a new subscription checkout session
    async fn create_checkout_session(&self, request: CheckoutRequest<'_>) -> Result<CheckoutSession>;

    /// Retrieve and validate a checkout session
    async fn get_checkout_session(&self, session_id: &str) -> Result<PaymentSession>;

    /// Create a billing portal session for customer self-service
    ///
    /// Returns a URL that the user should be redirected to for managing their billing.
    async fn create_billing_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String>;

    /// Validate and extract a webhook event from raw request data
    ///
    /// Returns None if this provider doesn't support webhooks.
    /// Returns Err if validation fails (invalid signature, malformed data, etc.)
    async fn validate_webhook(&self, headers: &axum::http::HeaderMap, body: &str) -> Result<Option<WebhookEvent>>;

    /// Fulfil a checkout session: activate the subscription and record the payment
    ///
    /// Idempotent: processing the same session again updates the same rows.
    #[instrument(skip(self, pool), err)]
    async fn process_checkout_session(&self, pool: &PgPool, session_id: &str) -> Result<SubscriptionDBResponse> {
        let session = self.get_checkout_session(session_id).await?;
        if !session.is_paid {
            debug!("Checkout session {session_id} has not been paid");
            return Err(PaymentError::PaymentNotCompleted);
        }
        fulfil_session(pool, self.name(), &session).await
    }

    /// Apply a validated webhook event
    ///
    /// Idempotent, so duplicate deliveries are safe.
    #[instrument(skip(self, pool), err)]
    async fn process_webhook_event(&self, pool: &PgPool, event: &WebhookEvent) -> Result<()> {
        match event {
            WebhookEvent::CheckoutCompleted { session_id } => match self.process_checkout_session(pool, session_id).await {
                Ok(_) => Ok(()),
                // Async payment methods complete later with their own event
                Err(PaymentError::PaymentNotCompleted) => Ok(()),
                Err(e) => Err(e),
            },
            WebhookEvent::SubscriptionUpdated {
                subscription_id,
                status,
                current_period_end,
            } => {
                let mut conn = pool.acquire().await?;
                let updated = Subscriptions::new(&mut conn)
                    .update_status_by_provider_id(subscription_id, *status, *current_period_end)
                    .await?;
                match updated {
                    Some(sub) => info!(
                        "Subscription {} for professional {} is now {:?}",
                        subscription_id,
                        abbrev_uuid(&sub.professional_id),
                        status
                    ),
                    None => debug!("Subscription {subscription_id} is not known locally, ignoring update"),
                }
                Ok(())
            }
            WebhookEvent::Invoice {
                invoice_id,
                subscription_id,
                customer_id,
                amount,
                currency,
                status,
            } => {
                let mut conn = pool.acquire().await?;
                let Some(user_id) = invoice_owner(&mut conn, subscription_id.as_deref(), customer_id.as_deref()).await? else {
                    debug!("Invoice {invoice_id} has no local owner, ignoring");
                    return Ok(());
                };
                Payments::new(&mut conn)
                    .upsert(&PaymentUpsertDBRequest {
                        user_id,
                        provider: self.name().to_string(),
                        provider_reference: invoice_id.clone(),
                        amount: *amount,
                        currency: currency.clone(),
                        status: *status,
                        description: Some("Subscription invoice".to_string()),
                    })
                    .await?;
                Ok(())
            }
            WebhookEvent::Ignored { event_type } => {
                debug!("Ignoring webhook event type: {event_type}");
                Ok(())
            }
        }
    }
}

/// Find the local user an invoice belongs to, by subscription first, then by customer
async fn invoice_owner(
    conn: &mut sqlx::PgConnection,
    subscription_id: Option<&str>,
    customer_id: Option<&str>,
) -> Result<Option<UserId>> {
    if let Some(subscription_id) = subscription_id
        && let Some(sub) = Subscriptions::new(&mut *conn).get_by_provider_id(subscription_id).await?
        && let Some(professional) = Professionals::new(&mut *conn).get_by_id(sub.professional_id).await?
    {
        return Ok(Some(professional.user_id));
    }
    if let Some(customer_id) = customer_id
        && let Some(user) = Users::new(&mut *conn).get_user_by_payment_provider_id(customer_id).await?
    {
        return Ok(Some(user.id));
    }
    Ok(None)
}

/// Record a paid checkout: subscription, payment and the customer ID, in one transaction
#[instrument(skip(pool, session), fields(session_id = %session.session_id, professional_id = %abbrev_uuid(&session.professional_id)), err)]
pub async fn fulfil_session(pool: &PgPool, provider: &str, session: &PaymentSession) -> Result<SubscriptionDBResponse> {
    let mut tx = pool.begin().await?;

    let subscription = Subscriptions::new(&mut tx)
        .upsert(&SubscriptionUpsertDBRequest {
            professional_id: session.professional_id,
            provider: provider.to_string(),
            provider_subscription_id: session.subscription_id.clone().unwrap_or_else(|| session.session_id.clone()),
            provider_customer_id: session.customer_id.clone(),
            status: SubscriptionStatus::Active,
            current_period_end: None,
        })
        .await?;

    Payments::new(&mut tx)
        .upsert(&PaymentUpsertDBRequest {
            user_id: session.user_id,
            provider: provider.to_string(),
            provider_reference: session.session_id.clone(),
            amount: session.amount,
            currency: session.currency.clone(),
            status: PaymentStatus::Succeeded,
            description: Some("Professional subscription".to_string()),
        })
        .await?;

    if let Some(customer_id) = &session.customer_id {
        let mut users = Users::new(&mut tx);
        let user = users.get_by_id(session.user_id).await?.ok_or(DbError::NotFound)?;
        if user.payment_provider_id.is_none() {
            users
                .update(
                    session.user_id,
                    &UserUpdateDBRequest {
                        payment_provider_id: Some(customer_id.clone()),
                        ..Default::default()
                    },
                )
                .await?;
        }
    }

    tx.commit().await?;
    info!("Fulfilled checkout session {}", session.session_id);
    Ok(subscription)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::users::Role,
        config::DummyConfig,
        test_utils::{create_test_professional, create_test_user},
    };
    use sqlx::PgPool;

    fn session(professional_id: ProfessionalId, user_id: UserId) -> PaymentSession {
        PaymentSession {
            session_id: "cs_test_123".to_string(),
            professional_id,
            user_id,
            amount: Decimal::new(1999, 2),
            currency: "usd".to_string(),
            is_paid: true,
            customer_id: Some("cus_123".to_string()),
            subscription_id: Some("sub_123".to_string()),
        }
    }

    #[test]
    fn test_error_status_codes() {
        use axum::http::StatusCode;
        let cases = [
            (PaymentError::PaymentNotCompleted, StatusCode::CONFLICT),
            (PaymentError::InvalidSignature("bad".into()), StatusCode::BAD_REQUEST),
            (PaymentError::NoCustomerId, StatusCode::BAD_REQUEST),
            (PaymentError::ProviderApi("boom".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(Error::from(err).status_code(), status);
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_fulfil_session_is_idempotent(pool: PgPool) {
        let professional = create_test_professional(&pool).await;
        let session = session(professional.id, professional.user_id);

        let first = fulfil_session(&pool, "stripe", &session).await.unwrap();
        let second = fulfil_session(&pool, "stripe", &session).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, SubscriptionStatus::Active);
        assert_eq!(second.provider_subscription_id, "sub_123");

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Payments::new(&mut conn).count_for_user(professional.user_id).await.unwrap(), 1);
        let user = Users::new(&mut conn).get_by_id(professional.user_id).await.unwrap().unwrap();
        assert_eq!(user.payment_provider_id.as_deref(), Some("cus_123"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_webhook_events_update_local_state(pool: PgPool) {
        let professional = create_test_professional(&pool).await;
        fulfil_session(&pool, "stripe", &session(professional.id, professional.user_id))
            .await
            .unwrap();

        let provider = dummy::DummyProvider::from(DummyConfig {
            amount: Decimal::new(1999, 2),
            currency: "usd".to_string(),
        });

        provider
            .process_webhook_event(
                &pool,
                &WebhookEvent::SubscriptionUpdated {
                    subscription_id: "sub_123".to_string(),
                    status: SubscriptionStatus::PastDue,
                    current_period_end: None,
                },
            )
            .await
            .unwrap();

        let invoice = WebhookEvent::Invoice {
            invoice_id: "in_1".to_string(),
            subscription_id: Some("sub_123".to_string()),
            customer_id: None,
            amount: Decimal::new(1999, 2),
            currency: "USD".to_string(),
            status: PaymentStatus::Failed,
        };
        // Duplicate delivery
        provider.process_webhook_event(&pool, &invoice).await.unwrap();
        provider.process_webhook_event(&pool, &invoice).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let sub = Subscriptions::new(&mut conn)
            .get_by_professional(professional.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);

        let payments = Payments::new(&mut conn).list_for_user(professional.user_id, 0, 10).await.unwrap();
        assert_eq!(payments.len(), 2);
        let failed = payments.iter().find(|p| p.provider_reference == "in_1").unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.currency, "usd");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unknown_invoice_owner_is_ignored(pool: PgPool) {
        let customer = create_test_user(&pool, Role::Customer).await;
        let provider = dummy::DummyProvider::from(DummyConfig {
            amount: Decimal::new(1999, 2),
            currency: "usd".to_string(),
        });

        provider
            .process_webhook_event(
                &pool,
                &WebhookEvent::Invoice {
                    invoice_id: "in_orphan".to_string(),
                    subscription_id: Some("sub_unknown".to_string()),
                    customer_id: Some("cus_unknown".to_string()),
                    amount: Decimal::ONE,
                    currency: "usd".to_string(),
                    status: PaymentStatus::Succeeded,
                },
            )
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(Payments::new(&mut conn).count_for_user(customer.id).await.unwrap(), 0);
    }
}
