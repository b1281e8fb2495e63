use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::{get, post},
    Router,
};
use shared::ApiError;
use std::sync::Arc;
use tower_http::{cors, trace::TraceLayer};

use crate::service::*;

#[derive(Clone)]
pub struct AppState {
    pub otp: Arc<OtpService>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/send-otp", post(send_otp))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/otp-login", post(otp_login))
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

pub async fn send_otp(
    State(state): State<AppState>,
    payload: Result<Json<SendOtpRequest>, JsonRejection>,
) -> Result<Json<SendOtpResponse>, ApiError> {
    Ok(Json(state.otp.send(body(payload)?).await?))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<VerifyOtpResponse>, ApiError> {
    Ok(Json(state.otp.verify(body(payload)?).await?))
}

pub async fn otp_login(
    State(state): State<AppState>,
    payload: Result<Json<OtpLoginRequest>, JsonRejection>,
) -> Result<Json<OtpLoginResponse>, ApiError> {
    Ok(Json(state.otp.login(body(payload)?).await?))
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn send_then_verify_over_http() {
        let h = harness();
        let app = create_router(AppState { otp: h.service.clone() });

        let response = app
            .clone()
            .oneshot(post_json("/auth/send-otp", json!({ "email": "a@b.org" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["expires"], 600);

        let code = h.delivery.last_code();
        let request = json!({ "email": "a@b.org", "otp": code });
        let response = app
            .clone()
            .oneshot(post_json("/auth/verify-otp", request.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["verified"], true);

        let response = app
            .oneshot(post_json("/auth/verify-otp", request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid or expired OTP");
    }

    #[tokio::test]
    async fn send_without_contact_is_bad_request() {
        let h = harness();
        let response = create_router(AppState { otp: h.service.clone() })
            .oneshot(post_json("/auth/send-otp", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let h = harness();
        let response = create_router(AppState { otp: h.service.clone() })
            .oneshot(
                Request::post("/auth/verify-otp")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn login_for_unregistered_phone_is_not_found() {
        let h = harness();
        let app = create_router(AppState { otp: h.service.clone() });
        app.clone()
            .oneshot(post_json("/auth/send-otp", json!({ "phone": PHONE })))
            .await
            .unwrap();

        let response = app
            .oneshot(post_json(
                "/auth/otp-login",
                json!({ "phone": PHONE, "otp": h.delivery.last_code() }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
