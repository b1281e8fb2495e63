use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::otp::{Contact, OtpRecord};
use uuid::Uuid;

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgOtpStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Every issuance is a fresh row; older codes stay valid until they expire.
    async fn insert_otp(&self, record: OtpRecord) -> Result<()>;

    /// Newest unused, unexpired record with this hash for the given contact.
    async fn find_live(
        &self,
        contact: &Contact,
        otp_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>>;

    /// Flips `used` only if it is still false. True for the single winner.
    async fn consume(&self, otp_id: Uuid) -> Result<bool>;

    async fn profile_by_phone(&self, phone: &str) -> Result<Option<UserProfile>>;
}
