use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::otp::{Contact, OtpRecord};
use uuid::Uuid;

use super::{OtpStore, UserProfile};
use crate::models::*;
use crate::schema::*;

pub type DbPool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

#[derive(Clone)]
pub struct PgOtpStore {
    pool: DbPool,
}

impl PgOtpStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn insert_otp(&self, record: OtpRecord) -> Result<()> {
        let mut conn = self.pool.get().await?;

        diesel::insert_into(otp_codes::table)
            .values(DbOtpCode::from(record))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn find_live(
        &self,
        contact: &Contact,
        otp_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>> {
        let mut conn = self.pool.get().await?;

        let mut query = otp_codes::table
            .filter(otp_codes::otp_hash.eq(otp_hash))
            .filter(otp_codes::used.eq(false))
            .filter(otp_codes::expires_at.gt(now))
            .order(otp_codes::created_at.desc())
            .into_boxed::<Pg>();
        if let Some(email) = contact.email.as_deref() {
            query = query.filter(otp_codes::email.eq(email));
        }
        if let Some(phone) = contact.phone.as_deref() {
            query = query.filter(otp_codes::phone.eq(phone));
        }

        let row = query.first::<DbOtpCode>(&mut conn).await.optional()?;
        Ok(row.map(OtpRecord::from))
    }

    async fn consume(&self, otp_id: Uuid) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let rows = diesel::update(
            otp_codes::table
                .filter(otp_codes::id.eq(otp_id))
                .filter(otp_codes::used.eq(false)),
        )
        .set(otp_codes::used.eq(true))
        .execute(&mut conn)
        .await?;

        Ok(rows == 1)
    }

    async fn profile_by_phone(&self, phone: &str) -> Result<Option<UserProfile>> {
        let mut conn = self.pool.get().await?;

        let profile = profiles::table
            .filter(profiles::phone.eq(phone))
            .first::<Profile>(&mut conn)
            .await
            .optional()?;

        Ok(profile.map(UserProfile::from))
    }
}
