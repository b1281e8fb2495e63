use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::json;
use shared::ApiError;
use uuid::Uuid;

use crate::api::AppState;

/// Permission required to issue payment links for other users.
pub const LINK_ISSUER_PERMISSION: &str = "can_manage_payment_settings";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    /// The bearer token the user authenticated with.
    #[serde(skip)]
    pub access_token: String,
}

/// Resolves a bearer access token to the user it was issued for.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, access_token: &str) -> anyhow::Result<Option<AuthUser>>;

    async fn has_permission(&self, user: &AuthUser, permission: &str) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseAuth {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }
}

#[async_trait]
impl Authenticator for SupabaseAuth {
    async fn authenticate(&self, access_token: &str) -> anyhow::Result<Option<AuthUser>> {
        let res = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match res.status() {
            s if s.is_success() => Ok(Some(res.json::<AuthUser>().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            s => Err(anyhow::anyhow!("auth backend responded with {}", s)),
        }
    }

    async fn has_permission(&self, user: &AuthUser, permission: &str) -> anyhow::Result<bool> {
        let granted = self
            .client
            .post(format!("{}/rest/v1/rpc/has_permission", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&user.access_token)
            .json(&json!({ "user_uuid": user.id, "permission_name": permission }))
            .send()
            .await?
            .error_for_status()?
            .json::<Option<bool>>()
            .await?;

        Ok(granted.unwrap_or(false))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;
        state
            .auth
            .authenticate(token)
            .await?
            .map(|user| AuthUser {
                access_token: token.to_string(),
                ..user
            })
            .ok_or_else(|| ApiError::unauthorized("Unauthorized"))
    }
}

/// A caller that may or may not be signed in. A missing or unknown token
/// yields `None`; a failing auth backend is still an error.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(Self(Some(user))),
            Err(ApiError::Unauthorized(_)) => Ok(Self(None)),
            Err(e) => Err(e),
        }
    }
}
