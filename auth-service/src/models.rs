use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::otp::OtpRecord;
use uuid::Uuid;

use crate::store::UserProfile;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::otp_codes)]
pub struct DbOtpCode {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
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

impl From<OtpRecord> for DbOtpCode {
    fn from(record: OtpRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            phone: record.phone,
            otp_hash: record.otp_hash,
            expires_at: record.expires_at,
            used: record.used,
            created_at: record.created_at,
        }
    }
}

impl From<DbOtpCode> for OtpRecord {
    fn from(row: DbOtpCode) -> Self {
        Self {
            id: row.id,
            email: row.email,
            phone: row.phone,
            otp_hash: row.otp_hash,
            expires_at: row.expires_at,
            used: row.used,
            created_at: row.created_at,
        }
    }
}

impl From<Profile> for UserProfile {
    fn from(row: Profile) -> Self {
        Self {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            phone: row.phone,
        }
    }
}
