use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::token::TokenRejection;
use shared::ApiError;
use std::sync::Arc;
use tower_http::{cors, trace::TraceLayer};
use uuid::Uuid;

use crate::auth::{AuthUser, Authenticator, MaybeAuthUser, LINK_ISSUER_PERMISSION};
use crate::service::*;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub auth: Arc<dyn Authenticator>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/payments/create-order", post(create_order))
        .route("/payments/token-orders", post(create_token_order))
        .route("/payments/verify", post(verify_payment))
        .route("/payments/validate-token", post(validate_token))
        .route("/payments/mark-token-used", post(mark_token_used))
        .route("/payments/links", post(issue_link))
        .route("/payments/status/:transaction_id", get(payment_status))
        .route("/payments/history", get(payment_history))
        .route("/payments/webhook", post(webhook))
        .route("/payments/config-status", get(config_status))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods(cors::Any)
                .allow_headers(cors::Any),
        )
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

fn required_token(request: TokenRequest) -> Result<String, ApiError> {
    request
        .token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::validation("Token is required"))
}

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<OrderCreated>, ApiError> {
    let request = body(payload)?;
    Ok(Json(state.payments.create_order(user.id, request).await?))
}

pub async fn create_token_order(
    State(state): State<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<OrderCreated>, ApiError> {
    let token = required_token(body(payload)?)?;
    Ok(Json(state.payments.create_token_order(&token).await?))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VerificationOutcome>), ApiError> {
    let request = body(payload)?;
    let outcome = state.payments.verify(user.as_ref(), request).await?;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(outcome)))
}

pub async fn validate_token(
    State(state): State<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let token = required_token(body(payload)?)?;
    match state.payments.validate_token(&token).await? {
        TokenValidation::Valid(details) => {
            let details = serde_json::to_value(details).map_err(anyhow::Error::from)?;
            Ok((StatusCode::OK, Json(details)))
        }
        TokenValidation::Invalid(rejection) => {
            let status = match rejection {
                TokenRejection::NotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            };
            Ok((status, Json(json!({ "valid": false, "error": rejection.to_string() }))))
        }
    }
}

pub async fn mark_token_used(
    State(state): State<AppState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let token = required_token(body(payload)?)?;
    state.payments.mark_token_used(&token).await?;
    Ok(Json(json!({ "success": true, "message": "Token marked as used" })))
}

pub async fn issue_link(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<IssueLinkRequest>, JsonRejection>,
) -> Result<Json<IssuedLink>, ApiError> {
    let request = body(payload)?;
    if !state.auth.has_permission(&user, LINK_ISSUER_PERMISSION).await? {
        return Err(ApiError::forbidden(
            "You do not have permission to issue payment links",
        ));
    }
    Ok(Json(state.payments.issue_link(&user, request).await?))
}

pub async fn payment_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let transaction = state.payments.status(&user, transaction_id).await?;
    Ok(Json(json!({ "success": true, "transaction": transaction })))
}

pub async fn payment_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    Ok(Json(
        state
            .payments
            .history(&user, query.page, query.page_size)
            .await?,
    ))
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    Ok(Json(state.payments.handle_webhook(&payload, signature).await?))
}

pub async fn config_status(State(state): State<AppState>) -> Json<ConfigStatusResponse> {
    Json(state.payments.config_status())
}

pub async fn health_check() -> &'static str {
    "OK"
}
