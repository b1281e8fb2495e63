use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::token::PaymentLink;
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::payment_transactions)]
pub struct DbPaymentTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub payment_config_id: Option<Uuid>,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<Uuid>,
    pub amount: bigdecimal::BigDecimal,
    pub currency: String,
    pub payment_status: String,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
    pub payment_method: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::payment_transactions)]
pub struct NewPaymentTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub payment_config_id: Option<Uuid>,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<Uuid>,
    pub amount: bigdecimal::BigDecimal,
    pub currency: String,
    pub payment_status: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::payment_tokens)]
pub struct DbPaymentToken {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub payment_config_id: Option<Uuid>,
    pub amount: bigdecimal::BigDecimal,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::profiles)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub registration_payment_status: Option<String>,
    pub registration_payment_transaction_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct DbOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct NewOutboxEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
}

impl TryFrom<DbPaymentTransaction> for PaymentTransaction {
    type Error = anyhow::Error;

    fn try_from(row: DbPaymentTransaction) -> Result<Self, Self::Error> {
        let related_entity_type = row
            .related_entity_type
            .as_deref()
            .map(str::parse::<RelatedEntityType>)
            .transpose()?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            payment_config_id: row.payment_config_id,
            related_entity_type,
            related_entity_id: row.related_entity_id,
            amount: row.amount,
            currency: row.currency,
            status: row.payment_status.parse()?,
            razorpay_order_id: row.razorpay_order_id,
            razorpay_payment_id: row.razorpay_payment_id,
            payment_method: row.payment_method,
            failure_reason: row.failure_reason,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

impl From<DbPaymentToken> for PaymentLink {
    fn from(row: DbPaymentToken) -> Self {
        Self {
            id: row.id,
            token_hash: row.token_hash,
            user_id: row.user_id,
            transaction_id: row.transaction_id,
            payment_config_id: row.payment_config_id,
            amount: row.amount,
            currency: row.currency,
            expires_at: row.expires_at,
            used: row.used,
            used_at: row.used_at,
            created_at: row.created_at,
        }
    }
}

impl From<PaymentLink> for DbPaymentToken {
    fn from(link: PaymentLink) -> Self {
        Self {
            id: link.id,
            token_hash: link.token_hash,
            user_id: link.user_id,
            transaction_id: link.transaction_id,
            payment_config_id: link.payment_config_id,
            amount: link.amount,
            currency: link.currency,
            expires_at: link.expires_at,
            used: link.used,
            used_at: link.used_at,
            created_at: link.created_at,
        }
    }
}

impl NewOutboxEvent {
    pub fn for_transaction(transaction: &PaymentTransaction) -> anyhow::Result<Self> {
        let event = PaymentEvent::from_transaction(transaction);
        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_id: transaction.id,
            event_type: event.event_type.as_str().to_string(),
            event_data: serde_json::to_value(&event)?,
        })
    }
}
