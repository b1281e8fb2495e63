use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const TOKEN_BYTES: usize = 32;
pub const DEFAULT_LINK_EXPIRY_HOURS: i64 = 72;

/// 32 random bytes, hex encoded. Only the hash ever reaches the database.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("Invalid or expired token")]
    NotFound,
    #[error("This payment link has expired")]
    Expired,
    #[error("This payment link has already been used")]
    AlreadyUsed,
    #[error("Payment already completed")]
    AlreadyPaid,
    #[error("User not found")]
    UnknownPayer,
}

/// A stored payment link, keyed by the token hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub payment_config_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub currency: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PaymentLink {
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), TokenRejection> {
        if self.expires_at <= now {
            return Err(TokenRejection::Expired);
        }
        if self.used {
            return Err(TokenRejection::AlreadyUsed);
        }
        Ok(())
    }
}
