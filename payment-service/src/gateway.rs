use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::instrument;

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Minor units (paise for INR).
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub status: String,
    pub method: Option<String>,
    #[serde(default)]
    pub amount: i64,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub description: String,
}

#[derive(Debug)]
pub enum GatewayError {
    RequestError(reqwest::Error),
    GatewayResponse { status: u16, error: ErrorDetail },
    GatewayDeserialization(serde_json::Error),
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        Self::RequestError(value)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(value: serde_json::Error) -> Self {
        Self::GatewayDeserialization(value)
    }
}

impl std::error::Error for GatewayError {}

impl Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::RequestError(e) => write!(f, "http request error: {e}"),
            GatewayError::GatewayResponse { status, error } => write!(
                f,
                "gateway response {status}: {}: {}",
                error.code, error.description
            ),
            GatewayError::GatewayDeserialization(e) => {
                write!(f, "gateway response deserialization: {e}")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder>;
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment>;
}

/// RazorPay REST client authenticated with the key id/secret pair.
#[derive(Debug, Clone)]
pub struct RazorpayClient {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(base_url: &str, key_id: &str, key_secret: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
        }
    }

    async fn parse<T: DeserializeOwned>(res: reqwest::Response) -> Result<T> {
        let status = res.status();
        let body = res.bytes().await?;
        if !status.is_success() {
            let error: ErrorResponse = serde_json::from_slice(&body)?;
            return Err(GatewayError::GatewayResponse {
                status: status.as_u16(),
                error: error.error,
            });
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip_all, fields(receipt = %request.receipt, amount = request.amount))]
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder> {
        let url = format!("{}/orders", self.base_url);
        tracing::debug!(%url, currency = %request.currency, "Gateway create order request");
        let res = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&request)
            .send()
            .await?;
        let order: GatewayOrder = Self::parse(res).await?;
        tracing::info!(order_id = %order.id, status = %order.status, "Gateway order created");
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        let url = format!("{}/payments/{}", self.base_url, payment_id);
        let res = self
            .client
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;
        let payment: GatewayPayment = Self::parse(res).await?;
        tracing::debug!(
            status = %payment.status,
            method = payment.method.as_deref().unwrap_or("unknown"),
            "Gateway payment fetched"
        );
        Ok(payment)
    }
}
