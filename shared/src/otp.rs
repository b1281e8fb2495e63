use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const OTP_LENGTH: usize = 6;
pub const OTP_TTL_MINUTES: i64 = 10;

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == OTP_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

pub fn expiry_from(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(OTP_TTL_MINUTES)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Contact {
    /// Blank fields count as absent, emails compare case-insensitively.
    pub fn new(email: Option<String>, phone: Option<String>) -> Self {
        let clean = |v: Option<String>| {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };
        Self {
            email: clean(email).map(|e| e.to_lowercase()),
            phone: clean(phone),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRecord {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl OtpRecord {
    pub fn issue(contact: &Contact, code: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            otp_hash: hash_code(code),
            expires_at: expiry_from(now),
            used: false,
            created_at: now,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }

    /// Every contact field the caller supplied must equal the stored one.
    pub fn belongs_to(&self, contact: &Contact) -> bool {
        if let Some(email) = &contact.email {
            if self.email.as_deref() != Some(email.as_str()) {
                return false;
            }
        }
        if let Some(phone) = &contact.phone {
            if self.phone.as_deref() != Some(phone.as_str()) {
                return false;
            }
        }
        true
    }

    pub fn accepts(&self, contact: &Contact, code_hash: &str, now: DateTime<Utc>) -> bool {
        self.is_live(now) && self.otp_hash == code_hash && self.belongs_to(contact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(e: &str) -> Contact {
        Contact::new(Some(e.to_string()), None)
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert!(is_well_formed(&code), "{}", code);
            assert!(!code.starts_with('0'));
        }
    }

    #[test]
    fn well_formed_requires_six_digits() {
        assert!(is_well_formed("123456"));
        assert!(!is_well_formed("12345"));
        assert!(!is_well_formed("1234567"));
        assert!(!is_well_formed("12a456"));
        assert!(!is_well_formed(""));
    }

    #[test]
    fn contact_is_normalised() {
        let c = Contact::new(Some("  Alum@Example.ORG ".into()), Some("   ".into()));
        assert_eq!(c.email.as_deref(), Some("alum@example.org"));
        assert_eq!(c.phone, None);
        assert!(Contact::new(None, Some(String::new())).is_empty());
    }

    #[test]
    fn accepts_matching_code_within_window() {
        let now = Utc::now();
        let contact = email("a@example.org");
        let record = OtpRecord::issue(&contact, "482913", now);
        assert_eq!(record.expires_at - now, Duration::minutes(10));
        assert!(record.accepts(&contact, &hash_code("482913"), now + Duration::minutes(9)));
    }

    #[test]
    fn wrong_code_expired_or_foreign_contact_fail() {
        let now = Utc::now();
        let contact = email("a@example.org");
        let record = OtpRecord::issue(&contact, "482913", now);
        let hash = hash_code("482913");

        assert!(!record.accepts(&contact, &hash_code("482914"), now));
        assert!(!record.accepts(&contact, &hash, now + Duration::minutes(10)));
        assert!(!record.accepts(&email("b@example.org"), &hash, now));
        assert!(!record.accepts(&Contact::new(None, Some("+919800000000".into())), &hash, now));

        let used = OtpRecord { used: true, ..record };
        assert!(!used.accepts(&contact, &hash, now));
    }
}
