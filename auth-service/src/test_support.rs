use anyhow::Result;
use async_trait::async_trait;
use shared::NotificationRequest;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::notifier::OtpDelivery;
use crate::service::OtpService;
use crate::session::SessionIssuer;
use crate::store::memory::InMemoryOtpStore;
use crate::store::UserProfile;

pub const PHONE: &str = "+919812345678";

#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<NotificationRequest>>,
    failing: AtomicBool,
}

impl RecordingDelivery {
    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_code(&self) -> String {
        let sent = self.sent.lock().unwrap();
        sent.last().unwrap().data["otp"].as_str().unwrap().to_string()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OtpDelivery for RecordingDelivery {
    async fn deliver(&self, request: NotificationRequest) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("broker unavailable");
        }
        self.sent.lock().unwrap().push(request);
        Ok(())
    }
}

pub struct FakeSessions;

#[async_trait]
impl SessionIssuer for FakeSessions {
    async fn magic_link(&self, email: &str) -> Result<String> {
        Ok(format!("https://auth.example.org/magic/{}", email))
    }
}

pub fn profile(phone: &str, email: Option<&str>) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        full_name: Some("Asha Rao".to_string()),
        email: email.map(str::to_string),
        phone: Some(phone.to_string()),
    }
}

pub struct Harness {
    pub store: InMemoryOtpStore,
    pub delivery: Arc<RecordingDelivery>,
    pub service: Arc<OtpService>,
}

pub fn harness() -> Harness {
    let store = InMemoryOtpStore::new();
    let delivery = Arc::new(RecordingDelivery::default());
    let service = Arc::new(OtpService::new(
        Arc::new(store.clone()),
        delivery.clone(),
        Arc::new(FakeSessions),
    ));
    Harness { store, delivery, service }
}
