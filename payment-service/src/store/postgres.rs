use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::token::PaymentLink;
use shared::{PaymentStatus, PaymentTransaction, RelatedEntityType};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{NewTransaction, PayerProfile, PaymentStore, Settlement};
use crate::models::*;
use crate::schema::*;

pub type DbPool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

#[derive(Clone)]
pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn open_states() -> Vec<&'static str> {
    PaymentStatus::open_states()
        .iter()
        .map(|s| s.as_str())
        .collect()
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert_transaction(&self, new: NewTransaction) -> Result<PaymentTransaction> {
        let mut conn = self.pool.get().await?;

        let row = NewPaymentTransaction {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            payment_config_id: new.payment_config_id,
            related_entity_type: new.related_entity_type.map(|t| t.as_str().to_string()),
            related_entity_id: new.related_entity_id,
            amount: new.amount,
            currency: new.currency,
            payment_status: PaymentStatus::Initiated.as_str().to_string(),
            metadata: new.metadata,
        };

        let inserted = diesel::insert_into(payment_transactions::table)
            .values(&row)
            .get_result::<DbPaymentTransaction>(&mut conn)
            .await?;

        inserted.try_into()
    }

    async fn attach_order(
        &self,
        transaction_id: Uuid,
        razorpay_order_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            payment_transactions::table
                .filter(payment_transactions::id.eq(transaction_id))
                .filter(payment_transactions::payment_status.eq(PaymentStatus::Initiated.as_str())),
        )
        .set((
            payment_transactions::razorpay_order_id.eq(razorpay_order_id),
            payment_transactions::payment_status.eq(PaymentStatus::Pending.as_str()),
            payment_transactions::updated_at.eq(Utc::now()),
        ))
        .get_result::<DbPaymentTransaction>(&mut conn)
        .await
        .optional()?;

        updated.map(PaymentTransaction::try_from).transpose()
    }

    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<PaymentTransaction>> {
        let mut conn = self.pool.get().await?;

        let row = payment_transactions::table
            .find(transaction_id)
            .first::<DbPaymentTransaction>(&mut conn)
            .await
            .optional()?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn find_by_order_id(&self, razorpay_order_id: &str) -> Result<Option<PaymentTransaction>> {
        let mut conn = self.pool.get().await?;

        let row = payment_transactions::table
            .filter(payment_transactions::razorpay_order_id.eq(razorpay_order_id))
            .first::<DbPaymentTransaction>(&mut conn)
            .await
            .optional()?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn settle(
        &self,
        transaction_id: Uuid,
        settlement: Settlement,
    ) -> Result<Option<PaymentTransaction>> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                let now = Utc::now();
                let target = payment_transactions::table
                    .filter(payment_transactions::id.eq(transaction_id))
                    .filter(payment_transactions::payment_status.eq_any(open_states()));

                let updated = match settlement {
                    Settlement::Verified {
                        razorpay_payment_id,
                        razorpay_signature,
                        payment_method,
                    } => diesel::update(target)
                        .set((
                            payment_transactions::payment_status
                                .eq(PaymentStatus::Verified.as_str()),
                            payment_transactions::razorpay_payment_id.eq(razorpay_payment_id),
                            payment_transactions::razorpay_signature.eq(razorpay_signature),
                            payment_transactions::payment_method.eq(payment_method),
                            payment_transactions::completed_at.eq(now),
                            payment_transactions::updated_at.eq(now),
                        ))
                        .get_result::<DbPaymentTransaction>(conn)
                        .await
                        .optional()?,
                    Settlement::Failed { reason } => diesel::update(target)
                        .set((
                            payment_transactions::payment_status.eq(PaymentStatus::Failed.as_str()),
                            payment_transactions::failure_reason.eq(reason),
                            payment_transactions::updated_at.eq(now),
                        ))
                        .get_result::<DbPaymentTransaction>(conn)
                        .await
                        .optional()?,
                };

                let Some(row) = updated else {
                    return Ok(None);
                };
                let transaction = PaymentTransaction::try_from(row)?;

                diesel::insert_into(outbox_events::table)
                    .values(&NewOutboxEvent::for_transaction(&transaction)?)
                    .execute(conn)
                    .await?;

                Ok(Some(transaction))
            }
            .scope_boxed()
        })
        .await
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<PaymentTransaction>, i64)> {
        let mut conn = self.pool.get().await?;

        let rows = payment_transactions::table
            .filter(payment_transactions::user_id.eq(user_id))
            .order(payment_transactions::created_at.desc())
            .offset(offset)
            .limit(limit)
            .load::<DbPaymentTransaction>(&mut conn)
            .await?;

        let total: i64 = payment_transactions::table
            .filter(payment_transactions::user_id.eq(user_id))
            .count()
            .get_result(&mut conn)
            .await?;

        let transactions = rows
            .into_iter()
            .map(PaymentTransaction::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((transactions, total))
    }

    async fn insert_link(&self, link: PaymentLink) -> Result<()> {
        let mut conn = self.pool.get().await?;

        diesel::insert_into(payment_tokens::table)
            .values(&DbPaymentToken::from(link))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn find_link(&self, token_hash: &str) -> Result<Option<PaymentLink>> {
        let mut conn = self.pool.get().await?;

        let row = payment_tokens::table
            .filter(payment_tokens::token_hash.eq(token_hash))
            .first::<DbPaymentToken>(&mut conn)
            .await
            .optional()?;

        Ok(row.map(PaymentLink::from))
    }

    async fn bind_link(&self, token_hash: &str, transaction_id: Uuid) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let token_hash = token_hash.to_string();

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                let link = payment_tokens::table
                    .filter(payment_tokens::token_hash.eq(&token_hash))
                    .for_update()
                    .first::<DbPaymentToken>(conn)
                    .await
                    .optional()?;
                let Some(link) = link else {
                    return Ok(false);
                };

                if let Some(bound) = link.transaction_id {
                    let status = payment_transactions::table
                        .find(bound)
                        .select(payment_transactions::payment_status)
                        .first::<String>(conn)
                        .await
                        .optional()?;
                    if let Some(status) = status {
                        if !status.parse::<PaymentStatus>()?.is_terminal() {
                            return Ok(false);
                        }
                    }
                }

                diesel::update(payment_tokens::table.find(link.id))
                    .set(payment_tokens::transaction_id.eq(transaction_id))
                    .execute(conn)
                    .await?;
                Ok(true)
            }
            .scope_boxed()
        })
        .await
    }

    async fn consume_link(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let updated_rows = diesel::update(
            payment_tokens::table
                .filter(payment_tokens::token_hash.eq(token_hash))
                .filter(payment_tokens::used.eq(false))
                .filter(payment_tokens::expires_at.gt(now)),
        )
        .set((
            payment_tokens::used.eq(true),
            payment_tokens::used_at.eq(now),
        ))
        .execute(&mut conn)
        .await?;

        Ok(updated_rows == 1)
    }

    async fn payer_profile(&self, user_id: Uuid) -> Result<Option<PayerProfile>> {
        let mut conn = self.pool.get().await?;

        let profile = profiles::table
            .find(user_id)
            .first::<Profile>(&mut conn)
            .await
            .optional()?;

        Ok(profile.map(|p| PayerProfile {
            id: p.id,
            full_name: p.full_name,
            email: p.email,
            registration_payment_status: p.registration_payment_status,
        }))
    }

    async fn settle_related_entity(&self, transaction: &PaymentTransaction) -> Result<()> {
        let (Some(entity_type), Some(entity_id)) =
            (transaction.related_entity_type, transaction.related_entity_id)
        else {
            return Ok(());
        };
        let mut conn = self.pool.get().await?;

        let updated_rows = match entity_type {
            RelatedEntityType::Registration => {
                diesel::update(profiles::table.find(entity_id))
                    .set((
                        profiles::registration_payment_status.eq("paid"),
                        profiles::registration_payment_transaction_id.eq(transaction.id),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            RelatedEntityType::Event => {
                diesel::update(event_registrations::table.find(entity_id))
                    .set((
                        event_registrations::payment_status.eq("paid"),
                        event_registrations::payment_transaction_id.eq(transaction.id),
                        event_registrations::registration_confirmed.eq(true),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            RelatedEntityType::Donation => {
                diesel::update(donations::table.find(entity_id))
                    .set((
                        donations::payment_status.eq("completed"),
                        donations::payment_transaction_id.eq(transaction.id),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            RelatedEntityType::Membership | RelatedEntityType::Other => {
                debug!(
                    entity_type = entity_type.as_str(),
                    "No settlement handler for entity type"
                );
                return Ok(());
            }
        };

        if updated_rows == 0 {
            warn!(
                entity_type = entity_type.as_str(),
                %entity_id,
                transaction_id = %transaction.id,
                "Related entity not found while settling payment"
            );
        }

        Ok(())
    }
}
