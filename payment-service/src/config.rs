use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Test,
    Live,
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: Option<String>,
    pub mode: GatewayMode,
    pub default_currency: String,
    pub link_expiry_hours: i64,
    pub public_base_url: String,
}

impl PaymentSettings {
    /// Safe to log or show: the key id is public, but only its prefix is echoed.
    pub fn key_id_prefix(&self) -> String {
        self.key_id.chars().take(12).collect()
    }

    pub fn payment_link(&self, token: &str) -> String {
        format!(
            "{}/payments/registration/{}",
            self.public_base_url.trim_end_matches('/'),
            token
        )
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigurationStatus {
    pub key_id_configured: bool,
    pub key_id_prefix: String,
    pub key_secret_configured: bool,
    pub webhook_secret_configured: bool,
    pub mode: GatewayMode,
    pub is_test_mode: bool,
    pub link_expiry_hours: i64,
    pub default_currency: String,
}

impl From<&PaymentSettings> for ConfigurationStatus {
    fn from(settings: &PaymentSettings) -> Self {
        Self {
            key_id_configured: !settings.key_id.is_empty(),
            key_id_prefix: format!("{}...", settings.key_id_prefix()),
            key_secret_configured: !settings.key_secret.is_empty(),
            webhook_secret_configured: settings.webhook_secret().is_some(),
            mode: settings.mode,
            is_test_mode: settings.mode == GatewayMode::Test,
            link_expiry_hours: settings.link_expiry_hours,
            default_currency: settings.default_currency.clone(),
        }
    }
}
