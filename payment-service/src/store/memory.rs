use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::token::PaymentLink;
use shared::{PaymentEvent, PaymentStatus, PaymentTransaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NewTransaction, PayerProfile, PaymentStore, Settlement};

#[derive(Default)]
struct State {
    transactions: HashMap<Uuid, PaymentTransaction>,
    links: HashMap<String, PaymentLink>,
    profiles: HashMap<Uuid, PayerProfile>,
    outbox: Vec<PaymentEvent>,
    settled_entities: Vec<Uuid>,
}

/// Test double for [`PaymentStore`] that keeps every table in one lock, so
/// conditional updates are as atomic as their SQL counterparts.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_profile(&self, profile: PayerProfile) {
        self.state.write().await.profiles.insert(profile.id, profile);
    }

    pub async fn profile(&self, id: Uuid) -> Option<PayerProfile> {
        self.state.read().await.profiles.get(&id).cloned()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }

    pub async fn outbox(&self) -> Vec<PaymentEvent> {
        self.state.read().await.outbox.clone()
    }

    pub async fn settled_entities(&self) -> Vec<Uuid> {
        self.state.read().await.settled_entities.clone()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_transaction(&self, new: NewTransaction) -> Result<PaymentTransaction> {
        let now = Utc::now();
        let transaction = PaymentTransaction {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            payment_config_id: new.payment_config_id,
            related_entity_type: new.related_entity_type,
            related_entity_id: new.related_entity_id,
            amount: new.amount,
            currency: new.currency,
            status: PaymentStatus::Initiated,
            razorpay_order_id: None,
            razorpay_payment_id: None,
            payment_method: None,
            failure_reason: None,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.state
            .write()
            .await
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn attach_order(
        &self,
        transaction_id: Uuid,
        razorpay_order_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let mut state = self.state.write().await;
        let Some(transaction) = state.transactions.get_mut(&transaction_id) else {
            return Ok(None);
        };
        if transaction.status != PaymentStatus::Initiated {
            return Ok(None);
        }
        transaction.razorpay_order_id = Some(razorpay_order_id.to_string());
        transaction.status = PaymentStatus::Pending;
        transaction.updated_at = Utc::now();
        Ok(Some(transaction.clone()))
    }

    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<PaymentTransaction>> {
        Ok(self.state.read().await.transactions.get(&transaction_id).cloned())
    }

    async fn find_by_order_id(&self, razorpay_order_id: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .values()
            .find(|t| t.razorpay_order_id.as_deref() == Some(razorpay_order_id))
            .cloned())
    }

    async fn settle(
        &self,
        transaction_id: Uuid,
        settlement: Settlement,
    ) -> Result<Option<PaymentTransaction>> {
        let mut state = self.state.write().await;
        let Some(transaction) = state.transactions.get_mut(&transaction_id) else {
            return Ok(None);
        };
        if transaction.status.is_terminal() {
            return Ok(None);
        }

        let now = Utc::now();
        match settlement {
            Settlement::Verified {
                razorpay_payment_id,
                payment_method,
                ..
            } => {
                transaction.status = PaymentStatus::Verified;
                transaction.razorpay_payment_id = Some(razorpay_payment_id);
                transaction.payment_method = Some(payment_method);
                transaction.completed_at = Some(now);
            }
            Settlement::Failed { reason } => {
                transaction.status = PaymentStatus::Failed;
                transaction.failure_reason = Some(reason);
            }
        }
        transaction.updated_at = now;

        let settled = transaction.clone();
        state.outbox.push(PaymentEvent::from_transaction(&settled));
        Ok(Some(settled))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<PaymentTransaction>, i64)> {
        let state = self.state.read().await;
        let mut owned: Vec<PaymentTransaction> = state
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = owned.len() as i64;
        let page = owned
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert_link(&self, link: PaymentLink) -> Result<()> {
        let mut state = self.state.write().await;
        if state.links.contains_key(&link.token_hash) {
            anyhow::bail!("duplicate token hash");
        }
        state.links.insert(link.token_hash.clone(), link);
        Ok(())
    }

    async fn find_link(&self, token_hash: &str) -> Result<Option<PaymentLink>> {
        Ok(self.state.read().await.links.get(token_hash).cloned())
    }

    async fn bind_link(&self, token_hash: &str, transaction_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let State {
            links,
            transactions,
            ..
        } = &mut *state;
        let Some(link) = links.get_mut(token_hash) else {
            return Ok(false);
        };
        let rebindable = match link.transaction_id {
            None => true,
            Some(bound) => transactions
                .get(&bound)
                .map_or(true, |t| t.status.is_terminal()),
        };
        if rebindable {
            link.transaction_id = Some(transaction_id);
        }
        Ok(rebindable)
    }

    async fn consume_link(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.links.get_mut(token_hash) {
            Some(link) if !link.used && link.expires_at > now => {
                link.used = true;
                link.used_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn payer_profile(&self, user_id: Uuid) -> Result<Option<PayerProfile>> {
        Ok(self.state.read().await.profiles.get(&user_id).cloned())
    }

    async fn settle_related_entity(&self, transaction: &PaymentTransaction) -> Result<()> {
        let Some(entity_id) = transaction.related_entity_id else {
            return Ok(());
        };
        let mut state = self.state.write().await;
        if let Some(profile) = state.profiles.get_mut(&entity_id) {
            profile.registration_payment_status = Some("paid".to_string());
        }
        state.settled_entities.push(entity_id);
        Ok(())
    }
}
