use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use shared::token::PaymentLink;
use shared::{PaymentTransaction, RelatedEntityType};
use uuid::Uuid;

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::{DbPool, PgPaymentStore};

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub payment_config_id: Option<Uuid>,
    pub related_entity_type: Option<RelatedEntityType>,
    pub related_entity_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub currency: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Verified {
        razorpay_payment_id: String,
        razorpay_signature: Option<String>,
        payment_method: String,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayerProfile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub registration_payment_status: Option<String>,
}

impl PayerProfile {
    pub fn has_settled_registration(&self) -> bool {
        matches!(
            self.registration_payment_status.as_deref(),
            Some("paid") | Some("waived")
        )
    }
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists a transaction in `initiated`.
    async fn insert_transaction(&self, new: NewTransaction) -> Result<PaymentTransaction>;

    /// Records the gateway order handle and moves `initiated` to `pending`.
    async fn attach_order(
        &self,
        transaction_id: Uuid,
        razorpay_order_id: &str,
    ) -> Result<Option<PaymentTransaction>>;

    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<PaymentTransaction>>;

    async fn find_by_order_id(&self, razorpay_order_id: &str) -> Result<Option<PaymentTransaction>>;

    /// Moves an open transaction to a terminal state and records the matching
    /// outbox event in the same unit of work. `None` when the transaction is
    /// missing or already terminal.
    async fn settle(
        &self,
        transaction_id: Uuid,
        settlement: Settlement,
    ) -> Result<Option<PaymentTransaction>>;

    /// Newest first, plus the total count for the user.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<PaymentTransaction>, i64)>;

    async fn insert_link(&self, link: PaymentLink) -> Result<()>;

    async fn find_link(&self, token_hash: &str) -> Result<Option<PaymentLink>>;

    /// Points the link at a transaction, but only while the link is unbound or
    /// its current transaction is terminal. Returns whether the bind happened.
    async fn bind_link(&self, token_hash: &str, transaction_id: Uuid) -> Result<bool>;

    /// Flips `used` only when the link is unused and unexpired. Returns true
    /// for the single call that performed the flip.
    async fn consume_link(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool>;

    async fn payer_profile(&self, user_id: Uuid) -> Result<Option<PayerProfile>>;

    /// Marks the registration, event registration or donation behind a
    /// verified transaction as paid.
    async fn settle_related_entity(&self, transaction: &PaymentTransaction) -> Result<()>;
}
