//! Stripe payment provider implementation
//!
//! Talks to the Stripe REST API directly: hosted subscription checkout, checkout
//! session lookup, the billing portal and signed webhooks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::CONTENT_TYPE;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{error, info, trace};
use url::{Url, form_urlencoded};

use crate::{
    api::models::payments::{PaymentStatus, SubscriptionStatus},
    config::StripeConfig,
    payment_providers::{CheckoutRequest, CheckoutSession, PaymentError, PaymentProvider, PaymentSession, Result, WebhookEvent},
};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook signature timestamp, in seconds
const SIGNATURE_TOLERANCE_SECS: u64 = 300;

/// Stripe payment provider
pub struct StripeProvider {
    api_key: String,
    price_id: String,
    webhook_secret: String,
    api_base: Url,
    http: reqwest::Client,
}

impl From<StripeConfig> for StripeProvider {
    fn from(config: StripeConfig) -> Self {
        Self {
            api_key: config.api_key,
            price_id: config.price_id,
            webhook_secret: config.webhook_secret,
            api_base: config.api_base,
            http: crate::http_client(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
    payment_status: String,
    client_reference_id: Option<String>,
    /// Either an ID or an expanded object
    customer: Option<Value>,
    subscription: Option<Value>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StripePortalSession {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}

/// ID of a Stripe field that may be expanded into an object
fn expandable_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) => Some(id.clone()),
        Value::Object(object) => object.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Stripe amounts are integers in the currency's minor unit
fn from_minor_units(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}

fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value.and_then(Value::as_i64).and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>]`)
///
/// The signature is an HMAC-SHA256 over `{t}.{body}` keyed with the endpoint secret.
pub fn verify_signature(header: &str, body: &str, secret: &str, now: i64) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("missing v1 signature".to_string()));
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature("timestamp outside tolerance".to_string()));
    }

    let signed_payload = format!("{timestamp}.{body}");
    let matches = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(signed_payload.as_bytes());
        mac.verify_slice(&expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature("no matching signature".to_string()))
    }
}

/// Normalize a verified Stripe event
fn parse_event(body: &str) -> Result<WebhookEvent> {
    let event: StripeEvent = serde_json::from_str(body).map_err(|e| PaymentError::InvalidData(format!("Malformed webhook event: {e}")))?;
    let object = &event.data.object;
    let object_id = || {
        object
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PaymentError::InvalidData(format!("{} event without object id", event.event_type)))
    };

    let normalized = match event.event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => WebhookEvent::CheckoutCompleted { session_id: object_id()? },
        "customer.subscription.created" | "customer.subscription.updated" | "customer.subscription.deleted" => {
            let status = if event.event_type == "customer.subscription.deleted" {
                SubscriptionStatus::Canceled
            } else {
                object
                    .get("status")
                    .and_then(Value::as_str)
                    .and_then(SubscriptionStatus::from_provider)
                    .ok_or_else(|| PaymentError::InvalidData("Unknown subscription status".to_string()))?
            };
            // Newer API versions report the period on the subscription items
            let current_period_end = timestamp(object.get("current_period_end"))
                .or_else(|| timestamp(object.pointer("/items/data/0/current_period_end")));
            WebhookEvent::SubscriptionUpdated {
                subscription_id: object_id()?,
                status,
                current_period_end,
            }
        }
        "invoice.paid" | "invoice.payment_succeeded" | "invoice.payment_failed" => {
            let failed = event.event_type == "invoice.payment_failed";
            let amount_field = if failed { "amount_due" } else { "amount_paid" };
            let subscription_id = expandable_id(object.get("subscription"))
                .or_else(|| expandable_id(object.pointer("/parent/subscription_details/subscription")));
            WebhookEvent::Invoice {
                invoice_id: object_id()?,
                subscription_id,
                customer_id: expandable_id(object.get("customer")),
                amount: from_minor_units(object.get(amount_field).and_then(Value::as_i64).unwrap_or_default()),
                currency: object.get("currency").and_then(Value::as_str).unwrap_or("usd").to_string(),
                status: if failed { PaymentStatus::Failed } else { PaymentStatus::Succeeded },
            }
        }
        _ => WebhookEvent::Ignored {
            event_type: event.event_type.clone(),
        },
    };
    Ok(normalized)
}

impl StripeProvider {
    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .map_err(|e| PaymentError::ProviderApi(format!("Invalid Stripe endpoint {path}: {e}")))
    }

    /// POST a form-encoded request, as the Stripe API expects
    async fn post_form<T: serde::de::DeserializeOwned>(&self, path: &str, form: Vec<(&str, String)>) -> Result<T> {
        // The serializer is not `Send`, so it must be gone before the first await
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form.iter().map(|(key, value)| (*key, value.as_str())))
            .finish();

        let response = self
            .http
            .post(self.endpoint(path)?)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.get(self.endpoint(path)?).bearer_auth(&self.api_key).send().await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response
            .json::<StripeErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| status.to_string());
        error!("Stripe API returned {status}: {message}");
        if status.is_client_error() && status != reqwest::StatusCode::UNAUTHORIZED {
            Err(PaymentError::InvalidData(message))
        } else {
            Err(PaymentError::ProviderApi(message))
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_checkout_session(&self, request: CheckoutRequest<'_>) -> Result<CheckoutSession> {
        let professional_id = request.professional_id.to_string();
        let mut form = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", self.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", request.success_url.to_string()),
            ("cancel_url", request.cancel_url.to_string()),
            ("client_reference_id", professional_id.clone()),
            ("metadata[user_id]", request.user.id.to_string()),
            ("metadata[professional_id]", professional_id.clone()),
            ("subscription_data[metadata][professional_id]", professional_id),
        ];

        // Include existing customer ID if we have one
        match request.customer_id {
            Some(customer_id) => {
                info!("Using existing Stripe customer ID {} for user {}", customer_id, request.user.id);
                form.push(("customer", customer_id.to_string()));
            }
            None => form.push(("customer_email", request.user.email.clone())),
        }

        let session: StripeCheckoutSession = self.post_form("v1/checkout/sessions", form).await?;
        info!("Created checkout session {} for user {}", session.id, request.user.id);

        let url = session.url.ok_or_else(|| {
            error!("Checkout session missing URL");
            PaymentError::ProviderApi("Checkout session missing URL".to_string())
        })?;
        Ok(CheckoutSession { id: session.id, url })
    }

    async fn get_checkout_session(&self, session_id: &str) -> Result<PaymentSession> {
        if session_id.is_empty() || !session_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PaymentError::InvalidData("Invalid Stripe session ID".to_string()));
        }

        let session: StripeCheckoutSession = self.get(&format!("v1/checkout/sessions/{session_id}")).await?;

        let professional_id = session
            .client_reference_id
            .as_deref()
            .or(session.metadata.get("professional_id").map(String::as_str))
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| PaymentError::InvalidData("Missing client_reference_id".to_string()))?;
        let user_id = session
            .metadata
            .get("user_id")
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| PaymentError::InvalidData("Missing user_id metadata".to_string()))?;

        trace!("Retrieved checkout session {} with status {}", session.id, session.payment_status);
        Ok(PaymentSession {
            is_paid: matches!(session.payment_status.as_str(), "paid" | "no_payment_required"),
            amount: from_minor_units(session.amount_total.unwrap_or_default()),
            currency: session.currency.unwrap_or_else(|| "usd".to_string()),
            customer_id: expandable_id(session.customer.as_ref()),
            subscription_id: expandable_id(session.subscription.as_ref()),
            session_id: session.id,
            professional_id,
            user_id,
        })
    }

    async fn create_billing_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String> {
        let form = vec![("customer", customer_id.to_string()), ("return_url", return_url.to_string())];
        let session: StripePortalSession = self.post_form("v1/billing_portal/sessions", form).await?;
        Ok(session.url)
    }

    async fn validate_webhook(&self, headers: &axum::http::HeaderMap, body: &str) -> Result<Option<WebhookEvent>> {
        let signature = headers
            .get("stripe-signature")
            .ok_or_else(|| PaymentError::InvalidSignature("Missing stripe-signature header".to_string()))?
            .to_str()
            .map_err(|_| PaymentError::InvalidSignature("Invalid stripe-signature header".to_string()))?;

        verify_signature(signature, body, &self.webhook_secret, Utc::now().timestamp())?;

        let event = parse_event(body)?;
        trace!("Validated Stripe webhook event: {:?}", event);
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::{CurrentUser, Role};
    use uuid::Uuid;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, header, method, path},
    };

    const SECRET: &str = "whsec_test_secret";

    fn provider(server: &MockServer) -> StripeProvider {
        StripeProvider::from(StripeConfig {
            api_key: "sk_test_fake".to_string(),
            webhook_secret: SECRET.to_string(),
            price_id: "price_fake".to_string(),
            api_base: Url::parse(&format!("{}/", server.uri())).unwrap(),
        })
    }

    fn sign(body: &str, t: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{t}.{body}").as_bytes());
        format!("t={t},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn user() -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "pro@example.com".to_string(),
            role: Role::Professional,
            display_name: None,
            avatar_url: None,
        }
    }

    #[test]
    fn test_signature_verification() {
        let body = r#"{"type":"ping"}"#;
        let now = 1_700_000_000;

        assert!(verify_signature(&sign(body, now), body, SECRET, now).is_ok());
        // Any one of several v1 signatures may match
        let rotated = format!("t={now},v1=deadbeef,{}", sign(body, now).split_once(',').unwrap().1);
        assert!(verify_signature(&rotated, body, SECRET, now).is_ok());

        assert!(verify_signature(&sign(body, now), r#"{"type":"tampered"}"#, SECRET, now).is_err());
        assert!(verify_signature(&sign(body, now), body, "whsec_other", now).is_err());
        assert!(verify_signature(&sign(body, now - 301), body, SECRET, now).is_err());
        assert!(verify_signature("v1=abc", body, SECRET, now).is_err());

        // Extreme timestamps are rejected, not overflowed
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1=00");
            assert!(matches!(
                verify_signature(&header, body, SECRET, now),
                Err(PaymentError::InvalidSignature(_))
            ));
        }
    }

    #[test]
    fn test_parse_subscription_and_invoice_events() {
        let deleted = r#"{"id":"evt_1","type":"customer.subscription.deleted","data":{"object":{"id":"sub_1","status":"active"}}}"#;
        assert_eq!(
            parse_event(deleted).unwrap(),
            WebhookEvent::SubscriptionUpdated {
                subscription_id: "sub_1".to_string(),
                status: SubscriptionStatus::Canceled,
                current_period_end: None,
            }
        );

        let updated = r#"{"type":"customer.subscription.updated","data":{"object":{"id":"sub_1","status":"past_due","items":{"data":[{"current_period_end":1700000000}]}}}}"#;
        match parse_event(updated).unwrap() {
            WebhookEvent::SubscriptionUpdated {
                status, current_period_end, ..
            } => {
                assert_eq!(status, SubscriptionStatus::PastDue);
                assert_eq!(current_period_end.unwrap().timestamp(), 1_700_000_000);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let invoice = r#"{"type":"invoice.payment_failed","data":{"object":{"id":"in_1","customer":"cus_1","amount_due":1999,"currency":"eur","parent":{"subscription_details":{"subscription":"sub_1"}}}}}"#;
        assert_eq!(
            parse_event(invoice).unwrap(),
            WebhookEvent::Invoice {
                invoice_id: "in_1".to_string(),
                subscription_id: Some("sub_1".to_string()),
                customer_id: Some("cus_1".to_string()),
                amount: Decimal::new(1999, 2),
                currency: "eur".to_string(),
                status: PaymentStatus::Failed,
            }
        );

        let other = r#"{"type":"charge.refunded","data":{"object":{"id":"ch_1"}}}"#;
        assert!(matches!(parse_event(other).unwrap(), WebhookEvent::Ignored { .. }));
    }

    #[tokio::test]
    async fn test_validate_webhook_requires_signature() {
        let server = MockServer::start().await;
        let provider = provider(&server);
        let body = r#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_test_1"}}}"#;

        let mut headers = axum::http::HeaderMap::new();
        assert!(matches!(
            provider.validate_webhook(&headers, body).await,
            Err(PaymentError::InvalidSignature(_))
        ));

        headers.insert("stripe-signature", sign(body, Utc::now().timestamp()).parse().unwrap());
        assert_eq!(
            provider.validate_webhook(&headers, body).await.unwrap(),
            Some(WebhookEvent::CheckoutCompleted {
                session_id: "cs_test_1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_create_checkout_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test_fake"))
            .and(body_string_contains("mode=subscription"))
            .and(body_string_contains("customer_email=pro%40example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1",
                "payment_status": "unpaid"
            })))
            .mount(&server)
            .await;

        let user = user();
        let session = provider(&server)
            .create_checkout_session(CheckoutRequest {
                user: &user,
                professional_id: Uuid::new_v4(),
                customer_id: None,
                success_url: "http://localhost/success",
                cancel_url: "http://localhost/cancel",
            })
            .await
            .unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert_eq!(session.url, "https://checkout.stripe.com/c/pay/cs_test_1");
    }

    #[tokio::test]
    async fn test_checkout_runs_on_spawned_task() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_2",
                "url": "https://checkout.stripe.com/c/pay/cs_test_2",
                "payment_status": "unpaid"
            })))
            .mount(&server)
            .await;

        // Handlers run on the multi-threaded runtime, so the request future must be Send
        let provider = provider(&server);
        let session = tokio::spawn(async move {
            let user = user();
            provider
                .create_checkout_session(CheckoutRequest {
                    user: &user,
                    professional_id: Uuid::new_v4(),
                    customer_id: Some("cus_1"),
                    success_url: "http://localhost/success",
                    cancel_url: "http://localhost/cancel",
                })
                .await
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(session.id, "cs_test_2");
    }

    #[tokio::test]
    async fn test_get_checkout_session() {
        let server = MockServer::start().await;
        let professional_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_test_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_1",
                "url": null,
                "payment_status": "paid",
                "client_reference_id": professional_id.to_string(),
                "customer": "cus_1",
                "subscription": { "id": "sub_1", "object": "subscription" },
                "amount_total": 1999,
                "currency": "usd",
                "metadata": { "user_id": user_id.to_string() }
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let session = provider.get_checkout_session("cs_test_1").await.unwrap();
        assert!(session.is_paid);
        assert_eq!(session.professional_id, professional_id);
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.amount, Decimal::new(1999, 2));
        assert_eq!(session.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(session.subscription_id.as_deref(), Some("sub_1"));

        assert!(matches!(
            provider.get_checkout_session("../v1/customers").await,
            Err(PaymentError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/billing_portal/sessions"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": { "message": "Something went wrong" }
            })))
            .mount(&server)
            .await;

        let result = provider(&server).create_billing_portal_session("cus_1", "http://localhost").await;
        assert!(matches!(result, Err(PaymentError::ProviderApi(message)) if message == "Something went wrong"));
    }
}
