//! Database models for subscriptions and payments.

use crate::api::models::payments::{PaymentStatus, SubscriptionStatus};
use crate::types::{PaymentId, ProfessionalId, SubscriptionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

/// Insert-or-update keyed on the provider's subscription ID
#[derive(Debug, Clone)]
pub struct SubscriptionUpsertDBRequest {
    pub professional_id: ProfessionalId,
    pub provider: String,
    pub provider_subscription_id: String,
    pub provider_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionDBResponse {
    pub id: SubscriptionId,
    pub professional_id: ProfessionalId,
    pub provider: String,
    pub provider_subscription_id: String,
    pub provider_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert-or-update keyed on the provider's payment reference
#[derive(Debug, Clone)]
pub struct PaymentUpsertDBRequest {
    pub user_id: UserId,
    pub provider: String,
    pub provider_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentDBResponse {
    pub id: PaymentId,
    pub user_id: UserId,
    pub provider: String,
    pub provider_reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
