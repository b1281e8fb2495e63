use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::otp::{Contact, OtpRecord};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OtpStore, UserProfile};

#[derive(Default)]
struct State {
    otps: Vec<OtpRecord>,
    profiles: Vec<UserProfile>,
}

#[derive(Default, Clone)]
pub struct InMemoryOtpStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_profile(&self, profile: UserProfile) {
        self.state.write().await.profiles.push(profile);
    }

    pub async fn otps(&self) -> Vec<OtpRecord> {
        self.state.read().await.otps.clone()
    }

    /// Pushes every stored code's expiry into the past.
    pub async fn expire_all(&self) {
        let past = Utc::now() - chrono::Duration::seconds(1);
        for record in self.state.write().await.otps.iter_mut() {
            record.expires_at = past;
        }
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    async fn insert_otp(&self, record: OtpRecord) -> Result<()> {
        self.state.write().await.otps.push(record);
        Ok(())
    }

    async fn find_live(
        &self,
        contact: &Contact,
        otp_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OtpRecord>> {
        Ok(self
            .state
            .read()
            .await
            .otps
            .iter()
            .filter(|r| r.accepts(contact, otp_hash, now))
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn consume(&self, otp_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.otps.iter_mut().find(|r| r.id == otp_id) {
            Some(record) if !record.used => {
                record.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn profile_by_phone(&self, phone: &str) -> Result<Option<UserProfile>> {
        Ok(self
            .state
            .read()
            .await
            .profiles
            .iter()
            .find(|p| p.phone.as_deref() == Some(phone))
            .cloned())
    }
}
