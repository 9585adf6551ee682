//! API models for subscriptions and payment history.

use super::pagination::Pagination;
use crate::db::models::payments::{PaymentDBResponse, SubscriptionDBResponse};
use crate::types::{PaymentId, ProfessionalId, SubscriptionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Subscription lifecycle, mirroring the billing provider's states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    /// Whether the professional currently has access to paid features
    pub fn is_entitled(self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }

    /// Parse the provider's wire name, e.g. `past_due`
    pub fn from_provider(status: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(status.to_string())).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// Provider-hosted page to redirect the user to
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PortalResponse {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: SubscriptionId,
    #[schema(value_type = String, format = "uuid")]
    pub professional_id: ProfessionalId,
    pub provider: String,
    pub status: SubscriptionStatus,
    pub is_entitled: bool,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SubscriptionDBResponse> for SubscriptionResponse {
    fn from(db: SubscriptionDBResponse) -> Self {
        Self {
            id: db.id,
            professional_id: db.professional_id,
            provider: db.provider,
            status: db.status,
            is_entitled: db.status.is_entitled(),
            current_period_end: db.current_period_end,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PaymentId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub provider: String,
    pub provider_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentDBResponse> for PaymentResponse {
    fn from(db: PaymentDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            provider: db.provider,
            provider_reference: db.provider_reference,
            amount: db.amount,
            currency: db.currency,
            status: db.status,
            description: db.description,
            created_at: db.created_at,
        }
    }
}

/// Outcome of confirming a checkout session after the provider redirect
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutConfirmation {
    pub paid: bool,
    pub subscription: Option<SubscriptionResponse>,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListPaymentsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_status_names() {
        assert_eq!(SubscriptionStatus::from_provider("past_due"), Some(SubscriptionStatus::PastDue));
        assert_eq!(
            SubscriptionStatus::from_provider("incomplete_expired"),
            Some(SubscriptionStatus::IncompleteExpired)
        );
        assert_eq!(SubscriptionStatus::from_provider("bogus"), None);
    }

    #[test]
    fn test_entitlement() {
        assert!(SubscriptionStatus::Active.is_entitled());
        assert!(SubscriptionStatus::Trialing.is_entitled());
        assert!(!SubscriptionStatus::PastDue.is_entitled());
        assert!(!SubscriptionStatus::Canceled.is_entitled());
    }
}
