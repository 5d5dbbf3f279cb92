#![allow(dead_code)]

use chrono::Utc;
use course_payment_service::config::Config;
use course_payment_service::models::{Course, Enrollment};
use course_payment_service::services::{InMemoryPaymentStore, PaymentStore};
use course_payment_service::startup::Application;
use reqwest::redirect::Policy;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use service_core::utils::signature::generate_signature;
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const LEARNER_ID: &str = "learner-1";
pub const LEARNER_EMAIL: &str = "ada@example.com";

pub struct TestApp {
    pub address: String,
    pub store: InMemoryPaymentStore,
    pub fedapay: MockServer,
    /// Keeps session cookies and does not follow redirects.
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    /// Spawns the app on a random port with in-memory storage and a mocked
    /// FedaPay API. `overrides` replace the default environment.
    pub async fn spawn_with(overrides: &[(&str, &str)]) -> Self {
        let fedapay = MockServer::start().await;

        let mut vars: HashMap<String, String> = [
            ("STORAGE_BACKEND", "memory"),
            ("FEDAPAY_API_KEY", "sk_sandbox_test"),
            ("FEDAPAY_AUTH_KEY", WEBHOOK_SECRET),
            ("PUBLIC_BASE_URL", "http://learn.test"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        vars.insert("FEDAPAY_API_URL".to_string(), fedapay.uri());
        for (key, value) in overrides {
            vars.insert(key.to_string(), value.to_string());
        }

        let common = service_core::config::Config {
            port: 0,
            otlp_endpoint: None,
        };
        let config = Config::from_lookup(common, |key| vars.get(key).cloned())
            .expect("Failed to build test configuration");

        let store = InMemoryPaymentStore::new();
        let app = Application::build_with_store(config, Arc::new(store.clone()))
            .await
            .expect("Failed to build test application");
        let address = format!("http://127.0.0.1:{}", app.port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .cookie_store(true)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            address,
            store,
            fedapay,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn seed_course(&self, id: &str, fee: Decimal) -> Course {
        let course = Course {
            id: id.to_string(),
            name: "Rust 101".to_string(),
            fee,
            is_active: true,
        };
        self.store.insert_course(course.clone()).await;
        course
    }

    pub async fn seed_enrollment(&self, fee: Decimal) -> Enrollment {
        let course = self.seed_course("course-1", fee).await;
        let enrollment = Enrollment::new_pending(LEARNER_ID, &course.id);
        self.store
            .create_enrollment(enrollment.clone())
            .await
            .expect("Failed to seed enrollment");
        enrollment
    }

    pub fn as_learner(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("X-User-ID", LEARNER_ID)
            .header("X-User-Email", LEARNER_EMAIL)
            .header("X-User-First-Name", "Ada")
            .header("X-User-Last-Name", "Lovelace")
    }

    pub async fn start_checkout(&self, enrollment_id: &str) -> reqwest::Response {
        self.as_learner(
            self.client
                .post(self.url(&format!("/enrollments/{}/payment", enrollment_id))),
        )
        .send()
        .await
        .expect("Failed to execute request")
    }

    pub async fn post_webhook(&self, body: &str, signature: Option<&str>) -> reqwest::Response {
        let mut request = self
            .client
            .post(self.url("/webhooks/fedapay"))
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(signature) = signature {
            request = request.header("x-fedapay-signature", signature);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn flash_messages(&self) -> Vec<Value> {
        self.client
            .get(self.url("/session/messages"))
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .expect("Failed to parse JSON")
    }

    pub async fn mock_create_transaction(&self, response: Value) {
        Mock::given(method("POST"))
            .and(path("/v1/transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .mount(&self.fedapay)
            .await;
    }

    pub async fn mock_transaction_link(&self, transaction_id: &str, response: Value) {
        Mock::given(method("POST"))
            .and(path(format!("/v1/transactions/{}/token", transaction_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .mount(&self.fedapay)
            .await;
    }

    pub async fn mock_transaction_status(&self, transaction_id: &str, status: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/transactions/{}", transaction_id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"v1/transaction": {"id": transaction_id, "status": status}})),
            )
            .mount(&self.fedapay)
            .await;
    }

    /// Mocks a successful checkout for `tx_1` and runs it.
    pub async fn checkout_tx_1(&self, enrollment_id: &str) -> reqwest::Response {
        self.mock_create_transaction(json!({"id": "tx_1"})).await;
        self.mock_transaction_link("tx_1", json!({"url": "https://pay.example/tx_1"}))
            .await;
        self.start_checkout(enrollment_id).await
    }
}

/// `x-fedapay-signature` value for `body` signed now.
pub fn sign(body: &str) -> String {
    sign_at(body, Utc::now().timestamp())
}

pub fn sign_at(body: &str, timestamp: i64) -> String {
    let signature = generate_signature(WEBHOOK_SECRET, timestamp, body.as_bytes())
        .expect("Failed to sign body");
    format!("t={},v1={}", timestamp, signature)
}

pub fn approved_event(transaction_id: &str) -> String {
    json!({
        "name": "transaction.approved",
        "entity": {"id": transaction_id, "status": "approved"}
    })
    .to_string()
}
