//! Dummy payment provider implementation
//!
//! This provider completes every checkout immediately without talking to any
//! external service. Useful for development and tests.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    config::DummyConfig,
    payment_providers::{CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider, PaymentSession, Result, WebhookEvent},
};

const SESSION_PREFIX: &str = "dummy_session_";

/// Dummy payment provider whose checkouts are always paid
pub struct DummyProvider {
    amount: Decimal,
    currency: String,
}

impl From<DummyConfig> for DummyProvider {
    fn from(config: DummyConfig) -> Self {
        Self {
            amount: config.amount,
            currency: config.currency,
        }
    }
}

#[async_trait]
impl PaymentProvider for DummyProvider {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn create_checkout_session(&self, request: CheckoutRequest<'_>) -> Result<CheckoutSession> {
        // The session ID carries everything needed to fulfil it later
        // Format: dummy_session_{professional_id}_{user_id}_{uuid}
        let session_id = format!(
            "{SESSION_PREFIX}{}_{}_{}",
            request.professional_id,
            request.user.id,
            uuid::Uuid::new_v4()
        );

        tracing::info!("Dummy provider created checkout session {} for user {}", session_id, request.user.id);

        // Payment is instantly "complete", so go straight to the success page
        Ok(CheckoutSession {
            url: request.success_url.replace("{CHECKOUT_SESSION_ID}", &session_id),
            id: session_id,
        })
    }

    async fn get_checkout_session(&self, session_id: &str) -> Result<PaymentSession> {
        let invalid = || PaymentError::InvalidData("Invalid dummy session ID format".to_string());

        let mut parts = session_id.strip_prefix(SESSION_PREFIX).ok_or_else(invalid)?.split('_');
        let (Some(professional_id), Some(user_id), Some(_nonce), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };

        Ok(PaymentSession {
            session_id: session_id.to_string(),
            professional_id: professional_id.parse().map_err(|_| invalid())?,
            user_id: user_id.parse().map_err(|_| invalid())?,
            amount: self.amount,
            currency: self.currency.clone(),
            is_paid: true,
            customer_id: None,
            subscription_id: None,
        })
    }

    async fn create_billing_portal_session(&self, _customer_id: &str, return_url: &str) -> Result<String> {
        // Nothing to manage, send the user straight back
        Ok(return_url.to_string())
    }

    async fn validate_webhook(&self, _headers: &axum::http::HeaderMap, _body: &str) -> Result<Option<WebhookEvent>> {
        // Dummy provider doesn't use webhooks
        Ok(None)
    }
}
