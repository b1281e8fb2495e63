use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Issues a one-shot sign-in link for an existing account.
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    async fn magic_link(&self, email: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GenerateLinkRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    email: &'a str,
    redirect_to: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateLinkResponse {
    action_link: String,
}

/// Supabase admin API, authenticated with the service role key.
#[derive(Debug, Clone)]
pub struct SupabaseAdmin {
    client: reqwest::Client,
    base_url: String,
    service_role_key: String,
    redirect_to: String,
}

impl SupabaseAdmin {
    pub fn new(base_url: &str, service_role_key: &str, public_base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
            redirect_to: format!(
                "{}/login?otp_success=true",
                public_base_url.trim_end_matches('/')
            ),
        }
    }
}

#[async_trait]
impl SessionIssuer for SupabaseAdmin {
    async fn magic_link(&self, email: &str) -> Result<String> {
        let res = self
            .client
            .post(format!("{}/auth/v1/admin/generate_link", self.base_url))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(&GenerateLinkRequest {
                kind: "magiclink",
                email,
                redirect_to: &self.redirect_to,
            })
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(anyhow!("generate_link responded with {}", status));
        }
        Ok(res.json::<GenerateLinkResponse>().await?.action_link)
    }
}
