use anyhow::anyhow;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::signature;
use shared::token::{self, PaymentLink, TokenRejection};
use shared::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::config::{ConfigurationStatus, PaymentSettings};
use crate::gateway::{GatewayPayment, OrderRequest, PaymentGateway};
use crate::store::{NewTransaction, PaymentStore, Settlement};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct CreateOrderRequest {
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub payment_config_id: Option<Uuid>,
    pub related_entity_type: Option<RelatedEntityType>,
    pub related_entity_id: Option<Uuid>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderCreated {
    pub success: bool,
    pub transaction_id: Uuid,
    pub razorpay_order_id: String,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: BigDecimal,
    pub currency: String,
    pub razorpay_key_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyPaymentRequest {
    pub transaction_id: Option<Uuid>,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub razorpay_signature: Option<String>,
    pub payment_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub success: bool,
    pub message: String,
    pub transaction: Option<PaymentTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct IssueLinkRequest {
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: Option<String>,
    pub payment_config_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedLink {
    pub success: bool,
    pub token: String,
    pub payment_link: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenDetails {
    pub valid: bool,
    pub user_id: Uuid,
    pub payment_config_id: Option<Uuid>,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: BigDecimal,
    pub currency: String,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub transaction_id: Option<Uuid>,
}

#[derive(Debug)]
pub enum TokenValidation {
    Valid(TokenDetails),
    Invalid(TokenRejection),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryPage {
    pub success: bool,
    pub transactions: Vec<PaymentTransaction>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ConfigStatusResponse {
    pub success: bool,
    pub configuration: ConfigurationStatus,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    payment: Option<WebhookEntity<GatewayPayment>>,
}

#[derive(Debug, Deserialize)]
struct WebhookEntity<T> {
    entity: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    Verified,
    Failed,
    Ignored,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookOutcome {
    pub received: bool,
    pub action: WebhookAction,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn rejection_error(rejection: TokenRejection) -> ApiError {
    match rejection {
        TokenRejection::NotFound => ApiError::not_found(rejection.to_string()),
        other => ApiError::validation(other.to_string()),
    }
}

pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: PaymentSettings,
    ) -> Self {
        Self { store, gateway, settings }
    }

    fn currency_or_default(&self, currency: Option<String>) -> String {
        currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.settings.default_currency.clone())
    }

    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderCreated, ApiError> {
        let amount = request
            .amount
            .filter(is_chargeable_amount)
            .ok_or_else(|| ApiError::validation("Amount must be greater than 0"))?;
        let currency = self.currency_or_default(request.currency);

        let transaction = self
            .open_order(NewTransaction {
                user_id,
                payment_config_id: request.payment_config_id,
                related_entity_type: request.related_entity_type,
                related_entity_id: request.related_entity_id,
                amount,
                currency,
                metadata: serde_json::Value::Object(request.metadata.unwrap_or_default()),
            })
            .await?;

        self.order_created(transaction)
    }

    /// Order for a payer who holds a payment link instead of a session.
    pub async fn create_token_order(&self, token: &str) -> Result<OrderCreated, ApiError> {
        let details = match self.validate_token(token).await? {
            TokenValidation::Valid(details) => details,
            TokenValidation::Invalid(rejection) => return Err(rejection_error(rejection)),
        };

        if let Some(existing) = self.open_link_order(details.transaction_id).await? {
            info!(transaction_id = %existing.id, "Reusing open order for payment link");
            return self.order_created(existing);
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert("payment_link".to_string(), serde_json::Value::Bool(true));

        let transaction = self
            .open_order(NewTransaction {
                user_id: details.user_id,
                payment_config_id: details.payment_config_id,
                related_entity_type: Some(RelatedEntityType::Registration),
                related_entity_id: Some(details.user_id),
                amount: details.amount,
                currency: details.currency,
                metadata: serde_json::Value::Object(metadata),
            })
            .await?;

        let token_hash = token::hash_token(token);
        if !self.store.bind_link(&token_hash, transaction.id).await? {
            warn!(transaction_id = %transaction.id, "Payment link was bound by a concurrent order");
            let settlement = Settlement::Failed {
                reason: "Payment link bound to another order".to_string(),
            };
            self.store.settle(transaction.id, settlement).await?;

            let bound = match self.store.find_link(&token_hash).await? {
                Some(link) => self.open_link_order(link.transaction_id).await?,
                None => None,
            };
            return match bound {
                Some(existing) => self.order_created(existing),
                None => Err(ApiError::validation(
                    "Payment link already has an order in progress",
                )),
            };
        }

        self.order_created(transaction)
    }

    /// The transaction a link is bound to, while it can still be paid.
    async fn open_link_order(
        &self,
        transaction_id: Option<Uuid>,
    ) -> Result<Option<PaymentTransaction>, ApiError> {
        let Some(transaction_id) = transaction_id else {
            return Ok(None);
        };
        Ok(self
            .store
            .get_transaction(transaction_id)
            .await?
            .filter(|t| !t.status.is_terminal() && t.razorpay_order_id.is_some()))
    }

    fn order_created(&self, transaction: PaymentTransaction) -> Result<OrderCreated, ApiError> {
        let razorpay_order_id = transaction
            .razorpay_order_id
            .ok_or_else(|| anyhow!("transaction {} has no gateway order", transaction.id))?;

        Ok(OrderCreated {
            success: true,
            transaction_id: transaction.id,
            razorpay_order_id,
            amount: transaction.amount,
            currency: transaction.currency,
            razorpay_key_id: self.settings.key_id.clone(),
        })
    }

    async fn open_order(&self, mut new: NewTransaction) -> Result<PaymentTransaction, ApiError> {
        let minor_amount = to_minor_units(&new.amount)
            .ok_or_else(|| ApiError::validation("Amount is out of range"))?;
        let receipt_id = generate_receipt_id(RECEIPT_PREFIX, Utc::now());
        if let serde_json::Value::Object(map) = &mut new.metadata {
            map.insert("receipt_id".to_string(), receipt_id.clone().into());
        }

        let transaction = self.store.insert_transaction(new).await?;

        let mut notes = BTreeMap::new();
        notes.insert("transaction_id".to_string(), transaction.id.to_string());
        notes.insert("user_id".to_string(), transaction.user_id.to_string());
        if let Some(entity_type) = transaction.related_entity_type {
            notes.insert("entity_type".to_string(), entity_type.as_str().to_string());
        }
        if let Some(entity_id) = transaction.related_entity_id {
            notes.insert("entity_id".to_string(), entity_id.to_string());
        }

        let order = match self
            .gateway
            .create_order(OrderRequest {
                amount: minor_amount,
                currency: transaction.currency.clone(),
                receipt: receipt_id,
                notes,
            })
            .await
        {
            Ok(order) => order,
            Err(e) => {
                error!(transaction_id = %transaction.id, "Gateway order creation failed: {}", e);
                let settlement = Settlement::Failed {
                    reason: "Gateway order creation failed".to_string(),
                };
                if let Err(e) = self.store.settle(transaction.id, settlement).await {
                    warn!(transaction_id = %transaction.id, "Failed to mark transaction failed: {:#}", e);
                }
                return Err(anyhow::Error::new(e)
                    .context("payment order creation failed")
                    .into());
            }
        };

        let transaction = self
            .store
            .attach_order(transaction.id, &order.id)
            .await?
            .ok_or_else(|| anyhow!("transaction {} left initiated state", transaction.id))?;

        info!(
            transaction_id = %transaction.id,
            order_id = %order.id,
            amount = %transaction.amount,
            currency = %transaction.currency,
            "Payment order created"
        );
        Ok(transaction)
    }

    pub async fn verify(
        &self,
        caller: Option<&AuthUser>,
        request: VerifyPaymentRequest,
    ) -> Result<VerificationOutcome, ApiError> {
        let transaction_id = request
            .transaction_id
            .ok_or_else(|| ApiError::validation("Missing required payment verification fields"))?;
        let transaction = self
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Transaction not found"))?;

        let bound_link = self
            .authorize_verification(caller, request.payment_token.as_deref(), &transaction)
            .await?;

        if transaction.status.is_terminal() {
            return Err(ApiError::validation("Transaction already finalized"));
        }

        let fields = (
            non_blank(request.razorpay_order_id.as_deref()),
            non_blank(request.razorpay_payment_id.as_deref()),
            non_blank(request.razorpay_signature.as_deref()),
        );
        let (Some(order_id), Some(payment_id), Some(supplied_signature)) = fields else {
            return self
                .reject(transaction_id, "Missing required payment verification fields")
                .await;
        };

        if transaction.razorpay_order_id.as_deref() != Some(order_id) {
            warn!(%transaction_id, %order_id, "Verification order does not match transaction");
            return self.reject(transaction_id, "Order does not match transaction").await;
        }

        let valid = signature::verify_payment_signature(
            self.settings.key_secret.as_bytes(),
            order_id,
            payment_id,
            supplied_signature,
        );
        info!(%transaction_id, %order_id, %payment_id, is_valid = valid, "Signature verification");
        if !valid {
            return self.reject(transaction_id, "Invalid payment signature").await;
        }

        let payment_method = match self.gateway.fetch_payment(payment_id).await {
            Ok(payment) => payment.method.unwrap_or_else(|| "unknown".to_string()),
            Err(e) => {
                warn!(%payment_id, "Could not fetch payment details: {}", e);
                "unknown".to_string()
            }
        };

        let settled = self
            .store
            .settle(
                transaction_id,
                Settlement::Verified {
                    razorpay_payment_id: payment_id.to_string(),
                    razorpay_signature: Some(supplied_signature.to_string()),
                    payment_method,
                },
            )
            .await?
            .ok_or_else(|| ApiError::validation("Transaction already finalized"))?;

        self.after_verified(&settled).await;

        if let Some(token_hash) = bound_link {
            if !self.store.consume_link(&token_hash, Utc::now()).await? {
                warn!(%transaction_id, "Payment link was no longer usable after verification");
            }
        }

        Ok(VerificationOutcome {
            success: true,
            message: "Payment verified successfully".to_string(),
            transaction: Some(settled),
        })
    }

    /// Returns the hash of the payment link to consume on success. Only a link
    /// bound to this transaction is ever returned.
    async fn authorize_verification(
        &self,
        caller: Option<&AuthUser>,
        payment_token: Option<&str>,
        transaction: &PaymentTransaction,
    ) -> Result<Option<String>, ApiError> {
        let link = match non_blank(payment_token) {
            Some(token) => self.store.find_link(&token::hash_token(token)).await?,
            None => None,
        };
        if link
            .as_ref()
            .is_some_and(|l| l.transaction_id != Some(transaction.id))
        {
            return Err(ApiError::forbidden(
                "You do not have permission to verify this transaction",
            ));
        }

        if caller.is_some_and(|user| user.id == transaction.user_id) {
            let now = Utc::now();
            return Ok(link
                .filter(|l| l.check(now).is_ok())
                .map(|l| l.token_hash));
        }

        match (caller, non_blank(payment_token)) {
            (_, Some(_)) => {
                let link = link
                    .ok_or_else(|| ApiError::unauthorized(TokenRejection::NotFound.to_string()))?;
                link.check(Utc::now())
                    .map_err(|r| ApiError::unauthorized(r.to_string()))?;
                Ok(Some(link.token_hash))
            }
            (Some(_), None) => Err(ApiError::forbidden(
                "You do not have permission to verify this transaction",
            )),
            (None, None) => Err(ApiError::unauthorized(
                "You must be logged in to verify payment",
            )),
        }
    }

    async fn reject(
        &self,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<VerificationOutcome, ApiError> {
        let settled = self
            .store
            .settle(
                transaction_id,
                Settlement::Failed {
                    reason: reason.to_string(),
                },
            )
            .await?;

        Ok(VerificationOutcome {
            success: false,
            message: format!("Payment verification failed: {}", reason),
            transaction: settled,
        })
    }

    async fn after_verified(&self, transaction: &PaymentTransaction) {
        info!(
            transaction_id = %transaction.id,
            amount = %transaction.amount,
            currency = %transaction.currency,
            "Payment verified"
        );
        if let Err(e) = self.store.settle_related_entity(transaction).await {
            error!(transaction_id = %transaction.id, "Failed to update related entity: {:#}", e);
        }
    }

    pub async fn status(
        &self,
        user: &AuthUser,
        transaction_id: Uuid,
    ) -> Result<PaymentTransaction, ApiError> {
        let transaction = self
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Transaction not found"))?;

        if transaction.user_id != user.id {
            return Err(ApiError::forbidden(
                "You do not have permission to view this transaction",
            ));
        }
        Ok(transaction)
    }

    pub async fn history(
        &self,
        user: &AuthUser,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<HistoryPage, ApiError> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 || !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ApiError::validation(
                "Page must be >= 1 and page_size must be between 1 and 100",
            ));
        }

        let offset = (page - 1).saturating_mul(page_size);
        let (transactions, total_count) = self
            .store
            .list_for_user(user.id, offset, page_size)
            .await?;

        Ok(HistoryPage {
            success: true,
            transactions,
            pagination: Pagination {
                page,
                page_size,
                total_count,
                total_pages: (total_count + page_size - 1) / page_size,
            },
        })
    }

    pub async fn issue_link(
        &self,
        issuer: &AuthUser,
        request: IssueLinkRequest,
    ) -> Result<IssuedLink, ApiError> {
        if !is_chargeable_amount(&request.amount) {
            return Err(ApiError::validation("Amount must be greater than 0"));
        }

        let token = token::generate_token();
        let now = Utc::now();
        let expires_at = now + Duration::hours(self.settings.link_expiry_hours);

        self.store
            .insert_link(PaymentLink {
                id: Uuid::new_v4(),
                token_hash: token::hash_token(&token),
                user_id: request.user_id,
                transaction_id: None,
                payment_config_id: request.payment_config_id,
                amount: request.amount,
                currency: self.currency_or_default(request.currency),
                expires_at,
                used: false,
                used_at: None,
                created_at: now,
            })
            .await?;

        info!(issuer = %issuer.id, user_id = %request.user_id, %expires_at, "Payment link issued");

        Ok(IssuedLink {
            success: true,
            payment_link: self.settings.payment_link(&token),
            token,
            expires_at,
        })
    }

    /// Read-only: never consumes the link.
    pub async fn validate_token(&self, token: &str) -> Result<TokenValidation, ApiError> {
        let Some(link) = self.store.find_link(&token::hash_token(token)).await? else {
            return Ok(TokenValidation::Invalid(TokenRejection::NotFound));
        };
        if let Err(rejection) = link.check(Utc::now()) {
            return Ok(TokenValidation::Invalid(rejection));
        }

        let Some(profile) = self.store.payer_profile(link.user_id).await? else {
            return Ok(TokenValidation::Invalid(TokenRejection::UnknownPayer));
        };
        if profile.has_settled_registration() {
            return Ok(TokenValidation::Invalid(TokenRejection::AlreadyPaid));
        }

        Ok(TokenValidation::Valid(TokenDetails {
            valid: true,
            user_id: link.user_id,
            payment_config_id: link.payment_config_id,
            amount: link.amount,
            currency: link.currency,
            user_name: profile.full_name,
            user_email: profile.email,
            transaction_id: link.transaction_id,
        }))
    }

    pub async fn mark_token_used(&self, token: &str) -> Result<(), ApiError> {
        let token_hash = token::hash_token(token);
        let now = Utc::now();
        if self.store.consume_link(&token_hash, now).await? {
            info!("Payment link marked as used");
            return Ok(());
        }

        match self.store.find_link(&token_hash).await? {
            None => Err(rejection_error(TokenRejection::NotFound)),
            Some(link) => match link.check(now) {
                Err(rejection) => Err(rejection_error(rejection)),
                Ok(()) => Err(anyhow!("payment link could not be consumed").into()),
            },
        }
    }

    pub async fn handle_webhook(
        &self,
        body: &[u8],
        supplied_signature: Option<&str>,
    ) -> Result<WebhookOutcome, ApiError> {
        let Some(secret) = self.settings.webhook_secret() else {
            warn!("Webhook received but no webhook secret is configured");
            return Err(ApiError::unauthorized("Webhook signature verification failed"));
        };
        let authentic = supplied_signature
            .is_some_and(|sig| signature::verify_webhook_signature(secret.as_bytes(), body, sig));
        if !authentic {
            warn!("Webhook signature verification failed");
            return Err(ApiError::unauthorized("Webhook signature verification failed"));
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|_| ApiError::validation("Malformed webhook payload"))?;
        let captured = match event.event.as_str() {
            "payment.captured" => true,
            "payment.failed" => false,
            other => {
                info!(event = other, "Ignoring webhook event");
                return Ok(WebhookOutcome { received: true, action: WebhookAction::Ignored });
            }
        };

        let payment = event
            .payload
            .payment
            .map(|p| p.entity)
            .ok_or_else(|| ApiError::validation("Malformed webhook payload"))?;
        let Some(order_id) = payment.order_id.as_deref() else {
            return Ok(WebhookOutcome { received: true, action: WebhookAction::Ignored });
        };
        let Some(transaction) = self.store.find_by_order_id(order_id).await? else {
            warn!(%order_id, "Webhook for unknown order");
            return Ok(WebhookOutcome { received: true, action: WebhookAction::Ignored });
        };
        if transaction.status.is_terminal() {
            return Ok(WebhookOutcome { received: true, action: WebhookAction::Ignored });
        }

        let settlement = if captured {
            Settlement::Verified {
                razorpay_payment_id: payment.id.clone(),
                razorpay_signature: None,
                payment_method: payment.method.clone().unwrap_or_else(|| "unknown".to_string()),
            }
        } else {
            Settlement::Failed {
                reason: payment
                    .error_description
                    .clone()
                    .unwrap_or_else(|| "Payment failed at gateway".to_string()),
            }
        };

        let Some(settled) = self.store.settle(transaction.id, settlement).await? else {
            return Ok(WebhookOutcome { received: true, action: WebhookAction::Ignored });
        };
        let action = if settled.status == PaymentStatus::Verified {
            self.after_verified(&settled).await;
            WebhookAction::Verified
        } else {
            info!(transaction_id = %settled.id, "Payment failed per gateway webhook");
            WebhookAction::Failed
        };

        Ok(WebhookOutcome { received: true, action })
    }

    pub fn config_status(&self) -> ConfigStatusResponse {
        ConfigStatusResponse {
            success: true,
            configuration: ConfigurationStatus::from(&self.settings),
        }
    }
}
