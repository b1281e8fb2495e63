use anyhow::anyhow;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::otp::{self, Contact, OtpRecord};
use shared::{ApiError, NotificationChannel, NotificationRequest};
use std::sync::Arc;
use tracing::{info, warn};

use crate::notifier::OtpDelivery;
use crate::session::SessionIssuer;
use crate::store::{OtpStore, UserProfile};

const INVALID_OTP: &str = "Invalid or expired OTP";

#[derive(Debug, Default, Deserialize)]
pub struct SendOtpRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendOtpResponse {
    pub message: String,
    pub expires: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub otp: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyOtpResponse {
    pub message: String,
    pub verified: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct OtpLoginRequest {
    pub phone: Option<String>,
    pub otp: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OtpLoginResponse {
    pub message: String,
    pub verified: bool,
    pub user: UserProfile,
    pub magic_link: String,
}

fn well_formed_code(code: Option<String>) -> Result<String, ApiError> {
    code.map(|c| c.trim().to_string())
        .filter(|c| otp::is_well_formed(c))
        .ok_or_else(|| ApiError::validation("Valid 6-digit OTP is required"))
}

pub struct OtpService {
    store: Arc<dyn OtpStore>,
    delivery: Arc<dyn OtpDelivery>,
    sessions: Arc<dyn SessionIssuer>,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn OtpStore>,
        delivery: Arc<dyn OtpDelivery>,
        sessions: Arc<dyn SessionIssuer>,
    ) -> Self {
        Self { store, delivery, sessions }
    }

    pub async fn send(&self, request: SendOtpRequest) -> Result<SendOtpResponse, ApiError> {
        let contact = Contact::new(request.email, request.phone);
        if contact.is_empty() {
            return Err(ApiError::validation("Email or phone number is required"));
        }

        let code = otp::generate_code();
        let record = OtpRecord::issue(&contact, &code, Utc::now());
        let expires_in = (record.expires_at - record.created_at).num_seconds();
        self.store.insert_otp(record).await?;

        let mut deliveries = Vec::with_capacity(2);
        if let Some(email) = contact.email.clone() {
            deliveries.push(NotificationRequest::otp(NotificationChannel::Email, email, &code, expires_in));
        }
        if let Some(phone) = contact.phone.clone() {
            deliveries.push(NotificationRequest::otp(NotificationChannel::Sms, phone, &code, expires_in));
        }
        for request in deliveries {
            let channel = request.channel;
            if let Err(e) = self.delivery.deliver(request).await {
                warn!(?channel, "OTP delivery failed: {:#}", e);
            }
        }

        info!(
            has_email = contact.email.is_some(),
            has_phone = contact.phone.is_some(),
            "OTP issued"
        );

        Ok(SendOtpResponse {
            message: "OTP sent if contact is valid".to_string(),
            expires: expires_in,
        })
    }

    /// Finds the newest matching code for the contact and consumes it.
    async fn redeem(&self, contact: &Contact, code: &str) -> Result<(), ApiError> {
        let code_hash = otp::hash_code(code);
        let now = Utc::now();

        let record = self
            .store
            .find_live(contact, &code_hash, now)
            .await?
            .filter(|r| r.accepts(contact, &code_hash, now))
            .ok_or_else(|| ApiError::validation(INVALID_OTP))?;

        if !self.store.consume(record.id).await? {
            warn!(otp_id = %record.id, "OTP was consumed concurrently");
            return Err(ApiError::validation(INVALID_OTP));
        }
        Ok(())
    }

    pub async fn verify(&self, request: VerifyOtpRequest) -> Result<VerifyOtpResponse, ApiError> {
        let code = well_formed_code(request.otp)?;
        let contact = Contact::new(request.email, request.phone);
        if contact.is_empty() {
            return Err(ApiError::validation("Email or phone number is required"));
        }

        self.redeem(&contact, &code).await?;
        info!("OTP verified");

        Ok(VerifyOtpResponse {
            message: "OTP verified successfully".to_string(),
            verified: true,
        })
    }

    pub async fn login(&self, request: OtpLoginRequest) -> Result<OtpLoginResponse, ApiError> {
        let contact = Contact::new(None, request.phone);
        let Some(phone) = contact.phone.clone() else {
            return Err(ApiError::validation("Phone number and OTP are required"));
        };
        let code = well_formed_code(request.otp)?;

        self.redeem(&contact, &code).await?;

        let user = self
            .store
            .profile_by_phone(&phone)
            .await?
            .ok_or_else(|| {
                ApiError::not_found("User not registered. Please contact admin to register first.")
            })?;
        let email = user
            .email
            .as_deref()
            .ok_or_else(|| anyhow!("profile {} has no email", user.id))?;

        let magic_link = self.sessions.magic_link(email).await?;
        info!(user_id = %user.id, "OTP login successful");

        Ok(OtpLoginResponse {
            message: "OTP login successful".to_string(),
            verified: true,
            user,
            magic_link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    fn send_to(email: Option<&str>, phone: Option<&str>) -> SendOtpRequest {
        SendOtpRequest {
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
        }
    }

    fn verify_with(email: Option<&str>, phone: Option<&str>, code: &str) -> VerifyOtpRequest {
        VerifyOtpRequest {
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            otp: Some(code.to_string()),
        }
    }

    #[tokio::test]
    async fn send_requires_a_contact() {
        let h = harness();
        let err = h.service.send(send_to(Some("  "), None)).await.unwrap_err();
        assert_eq!(err.to_string(), "Email or phone number is required");
        assert!(h.store.otps().await.is_empty());
    }

    #[tokio::test]
    async fn send_stores_hash_and_notifies_each_channel() {
        let h = harness();
        let response = h
            .service
            .send(send_to(Some("Asha@Example.org"), Some("+919800000000")))
            .await
            .unwrap();
        assert_eq!(response.expires, 600);

        let stored = h.store.otps().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].email.as_deref(), Some("asha@example.org"));

        let sent = h.delivery.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].channel, NotificationChannel::Email);
        assert_eq!(sent[1].channel, NotificationChannel::Sms);
        let code = sent[0].data["otp"].as_str().unwrap();
        assert_eq!(stored[0].otp_hash, otp::hash_code(code));
        assert_ne!(stored[0].otp_hash, code);
    }

    #[tokio::test]
    async fn delivery_failure_is_not_surfaced() {
        let h = harness();
        h.delivery.fail();
        let response = h.service.send(send_to(Some("a@b.org"), None)).await.unwrap();
        assert_eq!(response.message, "OTP sent if contact is valid");
        assert_eq!(h.store.otps().await.len(), 1);
    }

    #[tokio::test]
    async fn code_verifies_once() {
        let h = harness();
        h.service.send(send_to(Some("a@b.org"), None)).await.unwrap();
        let code = h.delivery.last_code();

        let response = h
            .service
            .verify(verify_with(Some("A@B.org"), None, &code))
            .await
            .unwrap();
        assert!(response.verified);

        let err = h
            .service
            .verify(verify_with(Some("a@b.org"), None, &code))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), INVALID_OTP);
    }

    #[tokio::test]
    async fn wrong_code_contact_or_expiry_fails() {
        let h = harness();
        h.service.send(send_to(Some("a@b.org"), None)).await.unwrap();
        let code = h.delivery.last_code();
        let wrong = if code == "123456" { "654321" } else { "123456" };

        for request in [
            verify_with(Some("a@b.org"), None, wrong),
            verify_with(Some("other@b.org"), None, &code),
            verify_with(None, Some("+919800000000"), &code),
        ] {
            let err = h.service.verify(request).await.unwrap_err();
            assert_eq!(err.to_string(), INVALID_OTP);
        }

        h.store.expire_all().await;
        let err = h
            .service
            .verify(verify_with(Some("a@b.org"), None, &code))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), INVALID_OTP);
    }

    #[tokio::test]
    async fn malformed_code_is_rejected() {
        let h = harness();
        for code in ["12345", "1234567", "12a456", ""] {
            let err = h
                .service
                .verify(verify_with(Some("a@b.org"), None, code))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Valid 6-digit OTP is required");
        }
    }

    #[tokio::test]
    async fn login_issues_magic_link_for_registered_phone() {
        let h = harness();
        h.store.add_profile(profile(PHONE, Some("asha@example.org"))).await;
        h.service.send(send_to(None, Some(PHONE))).await.unwrap();

        let response = h
            .service
            .login(OtpLoginRequest {
                phone: Some(PHONE.to_string()),
                otp: Some(h.delivery.last_code()),
            })
            .await
            .unwrap();

        assert!(response.verified);
        assert_eq!(response.user.phone.as_deref(), Some(PHONE));
        assert_eq!(response.magic_link, "https://auth.example.org/magic/asha@example.org");
    }

    #[tokio::test]
    async fn login_for_unknown_phone_is_not_found() {
        let h = harness();
        h.service.send(send_to(None, Some(PHONE))).await.unwrap();

        let err = h
            .service
            .login(OtpLoginRequest {
                phone: Some(PHONE.to_string()),
                otp: Some(h.delivery.last_code()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn login_without_profile_email_is_internal() {
        let h = harness();
        h.store.add_profile(profile(PHONE, None)).await;
        h.service.send(send_to(None, Some(PHONE))).await.unwrap();

        let err = h
            .service
            .login(OtpLoginRequest {
                phone: Some(PHONE.to_string()),
                otp: Some(h.delivery.last_code()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
