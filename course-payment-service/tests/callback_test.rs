mod common;

use common::{sign, TestApp};
use course_payment_service::models::{EnrollmentStatus, PaymentStatus, ReconciliationChannel};
use course_payment_service::services::PaymentStore;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn approved_callback_completes_payment() {
    let app = TestApp::spawn().await;
    let enrollment = app.seed_enrollment(dec!(5000)).await;
    app.checkout_tx_1(&enrollment.id).await;
    app.mock_transaction_status("tx_1", "approved").await;

    let response = app
        .client
        .get(app.url("/payments/callback?id=tx_1&status=approved"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 303);
    assert_eq!(response.headers()["location"], "/student/courses");

    let payment = app.store.get_payment_by_transaction("tx_1").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.reconciled_via, Some(ReconciliationChannel::Callback));
    let stored = app.store.get_enrollment(&enrollment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EnrollmentStatus::Active);

    let messages = app.flash_messages().await;
    assert_eq!(messages[0]["level"], "success");
}

#[tokio::test]
async fn callback_falls_back_to_session_transaction() {
    let app = TestApp::spawn().await;
    let enrollment = app.seed_enrollment(dec!(5000)).await;
    // Same client, so the checkout's session cookie is sent back.
    app.checkout_tx_1(&enrollment.id).await;
    app.mock_transaction_status("tx_1", "Approved").await;

    let response = app
        .client
        .get(app.url("/payments/callback"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 303);
    let payment = app.store.get_payment_by_transaction("tx_1").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn pending_gateway_status_changes_nothing() {
    let app = TestApp::spawn().await;
    let enrollment = app.seed_enrollment(dec!(5000)).await;
    app.checkout_tx_1(&enrollment.id).await;
    app.mock_transaction_status("tx_1", "pending").await;

    let response = app
        .client
        .get(app.url("/payments/callback?transaction_id=tx_1"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 303);
    assert_eq!(response.headers()["location"], "/student/courses");
    let payment = app.store.get_payment_by_transaction("tx_1").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    let messages = app.flash_messages().await;
    assert_eq!(messages[0]["level"], "info");
}

#[tokio::test]
async fn unknown_transaction_is_a_silent_noop() {
    let app = TestApp::spawn().await;
    app.mock_transaction_status("tx_unknown", "approved").await;

    let response = app
        .client
        .get(app.url("/payments/callback?trans_id=tx_unknown"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 303);
    assert_eq!(app.store.payment_count().await, 0);
    assert_eq!(app.store.enrollment_count().await, 0);
    // Ids this service never issued are not forwarded to the gateway.
    assert!(app.fedapay.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn path_like_transaction_id_never_reaches_gateway() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/payments/callback?id=..%2Fcustomers"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 303);
    assert!(app.fedapay.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn callback_cannot_reopen_webhook_declined_payment() {
    let app = TestApp::spawn().await;
    let enrollment = app.seed_enrollment(dec!(5000)).await;
    app.checkout_tx_1(&enrollment.id).await;

    let declined = json!({"name": "transaction.declined", "entity": {"id": "tx_1", "status": "declined"}})
        .to_string();
    let response = app.post_webhook(&declined, Some(&sign(&declined))).await;
    assert_eq!(response.status().as_u16(), 200);

    // The gateway now claims approval, but the webhook decline stands.
    app.mock_transaction_status("tx_1", "approved").await;
    let response = app
        .client
        .get(app.url("/payments/callback?id=tx_1"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 303);

    let payment = app.store.get_payment_by_transaction("tx_1").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.reconciled_via, Some(ReconciliationChannel::Webhook));
    let stored = app.store.get_enrollment(&enrollment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EnrollmentStatus::Pending);

    let messages = app.flash_messages().await;
    assert_eq!(messages[0]["level"], "info");
}

#[tokio::test]
async fn gateway_failure_still_redirects() {
    let app = TestApp::spawn().await;
    let enrollment = app.seed_enrollment(dec!(5000)).await;
    app.checkout_tx_1(&enrollment.id).await;
    Mock::given(method("GET"))
        .and(path("/v1/transactions/tx_1"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&app.fedapay)
        .await;

    let response = app
        .client
        .get(app.url("/payments/callback?id=tx_1"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 303);
    assert_eq!(response.headers()["location"], "/student/courses");
    let payment = app.store.get_payment_by_transaction("tx_1").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
}
