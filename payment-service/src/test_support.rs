use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::auth::{AuthUser, Authenticator};
use crate::config::{GatewayMode, PaymentSettings};
use crate::gateway::{
    ErrorDetail, GatewayError, GatewayOrder, GatewayPayment, OrderRequest, PaymentGateway, Result,
};
use crate::service::PaymentService;
use crate::store::memory::InMemoryPaymentStore;
use crate::store::PayerProfile;

pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";

pub fn settings() -> PaymentSettings {
    PaymentSettings {
        key_id: "rzp_test_abcdefghijkl".to_string(),
        key_secret: KEY_SECRET.to_string(),
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        mode: GatewayMode::Test,
        default_currency: "INR".to_string(),
        link_expiry_hours: 72,
        public_base_url: "https://alumni.example.org".to_string(),
    }
}

#[derive(Default)]
pub struct FakeGateway {
    orders: Mutex<Vec<OrderRequest>>,
    failing: AtomicBool,
}

impl FakeGateway {
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    pub fn fail_orders(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::GatewayResponse {
                status: 502,
                error: ErrorDetail {
                    code: "GATEWAY_ERROR".to_string(),
                    description: "upstream unavailable".to_string(),
                },
            });
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push(request.clone());
        Ok(GatewayOrder {
            id: format!("order_{}", orders.len()),
            amount: request.amount,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: "created".to_string(),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        Ok(GatewayPayment {
            id: payment_id.to_string(),
            order_id: None,
            status: "captured".to_string(),
            method: Some("upi".to_string()),
            amount: 0,
            error_description: None,
        })
    }
}

#[derive(Default)]
pub struct StaticAuthenticator {
    users: HashMap<String, AuthUser>,
    grants: HashSet<(Uuid, String)>,
}

impl StaticAuthenticator {
    pub fn with_user(mut self, access_token: &str, user: AuthUser) -> Self {
        self.users.insert(access_token.to_string(), user);
        self
    }

    pub fn with_permission(mut self, user_id: Uuid, permission: &str) -> Self {
        self.grants.insert((user_id, permission.to_string()));
        self
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, access_token: &str) -> anyhow::Result<Option<AuthUser>> {
        Ok(self.users.get(access_token).cloned())
    }

    async fn has_permission(&self, user: &AuthUser, permission: &str) -> anyhow::Result<bool> {
        Ok(self.grants.contains(&(user.id, permission.to_string())))
    }
}

/// An auth backend that is down.
pub struct UnavailableAuthenticator;

#[async_trait]
impl Authenticator for UnavailableAuthenticator {
    async fn authenticate(&self, _access_token: &str) -> anyhow::Result<Option<AuthUser>> {
        Err(anyhow::anyhow!("auth backend responded with 503 Service Unavailable"))
    }

    async fn has_permission(&self, _user: &AuthUser, _permission: &str) -> anyhow::Result<bool> {
        Err(anyhow::anyhow!("auth backend responded with 503 Service Unavailable"))
    }
}

pub fn user() -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        email: Some("alumnus@example.org".to_string()),
        access_token: String::new(),
    }
}

pub fn unpaid_profile(id: Uuid) -> PayerProfile {
    PayerProfile {
        id,
        full_name: Some("Asha Rao".to_string()),
        email: Some("asha@example.org".to_string()),
        registration_payment_status: Some("pending".to_string()),
    }
}

pub struct Harness {
    pub store: InMemoryPaymentStore,
    pub gateway: Arc<FakeGateway>,
    pub service: Arc<PaymentService>,
}

pub fn harness() -> Harness {
    let store = InMemoryPaymentStore::new();
    let gateway = Arc::new(FakeGateway::default());
    let service = Arc::new(PaymentService::new(
        Arc::new(store.clone()),
        gateway.clone(),
        settings(),
    ));
    Harness { store, gateway, service }
}
