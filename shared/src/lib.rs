use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_traits::{ToPrimitive, Zero};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod error;
pub mod otp;
pub mod signature;
pub mod telemetry;
pub mod token;

pub use error::{ApiError, ErrorResponse};

pub const RECEIPT_PREFIX: &str = "BGHS";
pub const DEFAULT_CURRENCY: &str = "INR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Initiated,
    Pending,
    Verified,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Verified => "verified",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Verified | PaymentStatus::Failed)
    }

    /// Terminal states never move again.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Initiated, Pending) | (Initiated | Pending, Verified | Failed)
        )
    }

    pub fn open_states() -> [PaymentStatus; 2] {
        [PaymentStatus::Initiated, PaymentStatus::Pending]
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(PaymentStatus::Initiated),
            "pending" => Ok(PaymentStatus::Pending),
            "verified" => Ok(PaymentStatus::Verified),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(anyhow::anyhow!("unknown payment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedEntityType {
    Registration,
    Event,
    Donation,
    Membership,
    Other,
}

impl RelatedEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelatedEntityType::Registration => "registration",
            RelatedEntityType::Event => "event",
            RelatedEntityType::Donation => "donation",
            RelatedEntityType::Membership => "membership",
            RelatedEntityType::Other => "other",
        }
    }
}

impl FromStr for RelatedEntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(RelatedEntityType::Registration),
            "event" => Ok(RelatedEntityType::Event),
            "donation" => Ok(RelatedEntityType::Donation),
            "membership" => Ok(RelatedEntityType::Membership),
            "other" => Ok(RelatedEntityType::Other),
            other => Err(anyhow::anyhow!("unknown entity type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub payment_config_id: Option<Uuid>,
    pub related_entity_type: Option<RelatedEntityType>,
    pub related_entity_id: Option<Uuid>,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: BigDecimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentTransaction {
    pub fn receipt_id(&self) -> Option<&str> {
        self.metadata.get("receipt_id").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEventType {
    PaymentVerified,
    PaymentFailed,
}

impl PaymentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentEventType::PaymentVerified => "PaymentVerified",
            PaymentEventType::PaymentFailed => "PaymentFailed",
        }
    }
}

/// Payload published to the payment events topic once a transaction settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub event_type: PaymentEventType,
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: BigDecimal,
    pub currency: String,
    pub related_entity_type: Option<RelatedEntityType>,
    pub related_entity_id: Option<Uuid>,
    pub razorpay_payment_id: Option<String>,
    pub failure_reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn from_transaction(transaction: &PaymentTransaction) -> Self {
        let event_type = if transaction.status == PaymentStatus::Verified {
            PaymentEventType::PaymentVerified
        } else {
            PaymentEventType::PaymentFailed
        };

        Self {
            event_type,
            transaction_id: transaction.id,
            user_id: transaction.user_id,
            amount: transaction.amount.clone(),
            currency: transaction.currency.clone(),
            related_entity_type: transaction.related_entity_type,
            related_entity_id: transaction.related_entity_id,
            razorpay_payment_id: transaction.razorpay_payment_id.clone(),
            failure_reason: transaction.failure_reason.clone(),
            occurred_at: transaction.completed_at.unwrap_or(transaction.updated_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
}

/// Delivery request consumed by the email/SMS side channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: Uuid,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub template: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NotificationRequest {
    pub fn otp(channel: NotificationChannel, recipient: String, code: &str, expires_in_secs: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            recipient,
            template: "otp".to_string(),
            data: serde_json::json!({ "otp": code, "expires_in": expires_in_secs }),
            created_at: Utc::now(),
        }
    }
}

/// Positive, at most two decimal places, and at least one minor unit.
pub fn is_chargeable_amount(amount: &BigDecimal) -> bool {
    amount > &BigDecimal::zero()
        && amount.with_scale(2) == *amount
        && to_minor_units(amount).is_some_and(|minor| minor >= 1)
}

/// Amounts go over the wire as JSON numbers, integral ones without a fraction.
pub fn serialize_amount<S: serde::Serializer>(
    amount: &BigDecimal,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    if amount.is_integer() {
        if let Some(whole) = amount.to_i64() {
            return serializer.serialize_i64(whole);
        }
    }
    match amount.to_f64() {
        Some(value) => serializer.serialize_f64(value),
        None => Err(serde::ser::Error::custom(format!("amount out of range: {}", amount))),
    }
}

/// Gateway amounts are integers in the currency's minor unit (paise for INR).
pub fn to_minor_units(amount: &BigDecimal) -> Option<i64> {
    (amount * BigDecimal::from(100)).round(0).to_i64()
}

pub fn from_minor_units(minor: i64) -> BigDecimal {
    BigDecimal::from(minor) / BigDecimal::from(100)
}

/// `BGHS-YYYYMMDD-XXXXXX`
pub fn generate_receipt_id(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect();
    format!("{}-{}-{}", prefix, now.format("%Y%m%d"), suffix)
}
