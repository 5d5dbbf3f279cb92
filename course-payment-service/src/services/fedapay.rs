//! FedaPay REST client.
//!
//! Implements transaction creation, lookup and payment-link retrieval
//! against the FedaPay v1 API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::config::FedaPayConfig;
use crate::services::gateway::{GatewayError, GatewayTransaction, NewTransaction, PaymentGateway};

/// FedaPay client, built once at startup and shared through `AppState`.
#[derive(Clone)]
pub struct FedaPayClient {
    client: Client,
    config: FedaPayConfig,
}

impl FedaPayClient {
    pub fn new(config: FedaPayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Check if FedaPay is configured (API key is set).
    pub fn is_configured(&self) -> bool {
        !self.config.api_url.is_empty() && !self.config.api_key.expose_secret().is_empty()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// `{api}/v1/transactions/{id}[/{action}]` with the id encoded as a
    /// single path segment.
    fn transaction_endpoint(
        &self,
        transaction_id: &str,
        action: Option<&str>,
    ) -> Result<Url, GatewayError> {
        // Dot segments are dropped by the URL serializer.
        if matches!(transaction_id, "" | "." | "..") {
            return Err(GatewayError::InvalidRequest(format!(
                "transaction id {:?}",
                transaction_id
            )));
        }

        let mut url = Url::parse(&self.endpoint("transactions"))
            .map_err(|e| GatewayError::InvalidRequest(format!("api url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidRequest("api url cannot be a base".to_string()))?
            .push(transaction_id)
            .extend(action);
        Ok(url)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Value, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let response = request
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(operation, status = %status, body = %body, "FedaPay response");

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| GatewayError::MalformedResponse(format!("{}: {}", operation, e)))
        } else {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            tracing::error!(
                operation,
                status = status.as_u16(),
                message = %message,
                "FedaPay request failed"
            );
            Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl PaymentGateway for FedaPayClient {
    async fn create_transaction(
        &self,
        request: &NewTransaction,
    ) -> Result<GatewayTransaction, GatewayError> {
        let document = self
            .send(
                "create_transaction",
                self.client.post(self.endpoint("transactions")).json(request),
            )
            .await?;

        let transaction = GatewayTransaction::from_document(document)?;
        tracing::info!(
            transaction_id = %transaction.id,
            amount = request.amount,
            currency = %request.currency.iso,
            "FedaPay transaction created"
        );
        Ok(transaction)
    }

    async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<GatewayTransaction, GatewayError> {
        let document = self
            .send(
                "get_transaction",
                self.client
                    .get(self.transaction_endpoint(transaction_id, None)?),
            )
            .await?;

        GatewayTransaction::from_document(document)
    }

    async fn get_transaction_link(&self, transaction_id: &str) -> Result<Value, GatewayError> {
        self.send(
            "get_transaction_link",
            self.client
                .post(self.transaction_endpoint(transaction_id, Some("token"))?),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::{Currency, Customer, PhoneNumber};
    use secrecy::Secret;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_url: &str) -> FedaPayConfig {
        FedaPayConfig {
            api_url: api_url.to_string(),
            api_key: Secret::new("sk_sandbox_test".to_string()),
            webhook_secret: Secret::new("wh_secret".to_string()),
            environment: "sandbox".to_string(),
            timeout: Duration::from_secs(5),
            signature_tolerance_seconds: 0,
        }
    }

    fn new_transaction() -> NewTransaction {
        NewTransaction {
            description: "Course payment: Rust 101".to_string(),
            amount: 5000,
            currency: Currency {
                iso: "XOF".to_string(),
            },
            callback_url: "http://localhost/payments/callback".to_string(),
            customer: Customer {
                firstname: "Ada".to_string(),
                lastname: "Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                phone_number: PhoneNumber {
                    number: "0100000000".to_string(),
                    country: "bj".to_string(),
                },
            },
        }
    }

    #[test]
    fn test_is_configured() {
        let client = FedaPayClient::new(test_config("https://sandbox-api.fedapay.com")).unwrap();
        assert!(client.is_configured());

        let mut empty = test_config("https://sandbox-api.fedapay.com");
        empty.api_key = Secret::new(String::new());
        let client = FedaPayClient::new(empty).unwrap();
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn test_create_transaction_sends_bearer_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/transactions"))
            .and(header("authorization", "Bearer sk_sandbox_test"))
            .and(body_partial_json(json!({
                "amount": 5000,
                "currency": {"iso": "XOF"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"v1/transaction": {"id": 381, "status": "pending"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = FedaPayClient::new(test_config(&server.uri())).unwrap();
        let transaction = client.create_transaction(&new_transaction()).await.unwrap();

        assert_eq!(transaction.id, "381");
        assert_eq!(transaction.status.as_deref(), Some("pending"));
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/transactions/tx_404"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "Transaction not found"})),
            )
            .mount(&server)
            .await;

        let client = FedaPayClient::new(test_config(&server.uri())).unwrap();
        let err = client.get_transaction("tx_404").await.unwrap_err();

        match err {
            GatewayError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Transaction not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_link_returns_raw_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/transactions/tx_1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"token": "tok_1", "url": "https://pay.example/tx_1"}),
            ))
            .mount(&server)
            .await;

        let client = FedaPayClient::new(test_config(&server.uri())).unwrap();
        let document = client.get_transaction_link("tx_1").await.unwrap();

        assert_eq!(document["url"], "https://pay.example/tx_1");
    }

    #[tokio::test]
    async fn test_transaction_id_stays_in_one_path_segment() {
        let server = MockServer::start().await;
        let client = FedaPayClient::new(test_config(&server.uri())).unwrap();

        // No mock mounted, so the server answers 404.
        let err = client.get_transaction("../customers").await.unwrap_err();
        assert!(matches!(err, GatewayError::Api { status: 404, .. }));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.path(), "/v1/transactions/..%2Fcustomers");
    }

    #[tokio::test]
    async fn test_dot_segment_ids_are_rejected() {
        let server = MockServer::start().await;
        let client = FedaPayClient::new(test_config(&server.uri())).unwrap();

        for id in ["..", ".", ""] {
            let err = client.get_transaction(id).await.unwrap_err();
            assert!(matches!(err, GatewayError::InvalidRequest(_)));
            let err = client.get_transaction_link(id).await.unwrap_err();
            assert!(matches!(err, GatewayError::InvalidRequest(_)));
        }

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_client_does_not_call_out() {
        let mut config = test_config("http://127.0.0.1:9");
        config.api_key = Secret::new(String::new());
        let client = FedaPayClient::new(config).unwrap();

        let err = client.get_transaction("tx_1").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotConfigured));
    }
}
