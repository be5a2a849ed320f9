mod common;

use checkout_callbacks::config::PaymeConfig;
use checkout_callbacks::domain::payme_state::{PaymeSessionState, PaymeTxState};
use checkout_callbacks::domain::ports::{Gateway, PaymentSessionStore};
use chrono::Utc;
use common::{PAYME_KEY, basic_auth, fixture, fixture_with, payme_auth, rpc};
use serde_json::{Value, json};

const SESSION: (&str, &str, i64) = ("s-1", "order-1", 500_000);

async fn call(f: &common::Fixture, method: &str, params: Value) -> Value {
    let auth = payme_auth();
    let response = f.payme.handle(Some(&auth), &rpc(method, params, 1)).await;
    serde_json::to_value(response).unwrap()
}

fn create_params(id: &str, time: i64) -> Value {
    json!({
        "id": id,
        "time": time,
        "amount": 500_000,
        "account": {"order_id": "order-1"}
    })
}

#[tokio::test]
async fn test_full_happy_path_stamps_marker_and_fires_once() {
    let f = fixture(&[SESSION]).await;

    let allowed = call(
        &f,
        "CheckPerformTransaction",
        json!({"amount": 500_000, "account": {"order_id": "order-1"}}),
    )
    .await;
    assert_eq!(allowed["result"], json!({"allow": true}));

    let created = call(&f, "CreateTransaction", create_params("p-1", 1_714_564_000_000)).await;
    assert_eq!(
        created["result"],
        json!({"create_time": 1_714_564_000_000_i64, "transaction": "s-1", "state": 1})
    );

    f.clock.set(1_714_564_900_000);
    let performed = call(&f, "PerformTransaction", json!({"id": "s-1"})).await;
    assert_eq!(
        performed["result"],
        json!({"transaction": "s-1", "perform_time": 1_714_564_900_000_i64, "state": 2})
    );

    let checked = call(&f, "CheckTransaction", json!({"id": "s-1"})).await;
    assert_eq!(checked["result"]["state"], json!(2));
    assert_eq!(checked["result"]["perform_time"], json!(1_714_564_900_000_i64));
    assert_eq!(checked["result"]["reason"], Value::Null);

    let session = f.store.get("s-1").await.unwrap().unwrap();
    assert_eq!(session.state_blob.transaction_marker(), Some("p-1"));
    let state = PaymeSessionState::load(&session.state_blob).unwrap().unwrap();
    assert_eq!(state.state, PaymeTxState::Performed);

    let events = f.effects.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].gateway, Gateway::Payme);
    assert_eq!(events[0].provider_doc_id.as_deref(), Some("p-1"));
}

#[tokio::test]
async fn test_perform_twice_returns_same_perform_time() {
    let f = fixture(&[SESSION]).await;
    call(&f, "CreateTransaction", create_params("p-1", 1_714_564_000_000)).await;

    f.clock.set(1_714_564_100_000);
    let first = call(&f, "PerformTransaction", json!({"id": "s-1"})).await;
    f.clock.set(1_714_564_200_000);
    let second = call(&f, "PerformTransaction", json!({"id": "s-1"})).await;

    assert_eq!(first, second);
    assert_eq!(f.effects.count(), 1);
}

#[tokio::test]
async fn test_perform_on_unknown_or_idle_session() {
    let f = fixture(&[SESSION]).await;

    let response = call(&f, "PerformTransaction", json!({"id": "s-404"})).await;
    assert_eq!(response["error"]["code"], json!(-31003));

    let response = call(&f, "PerformTransaction", json!({"id": "s-1"})).await;
    assert_eq!(response["error"]["code"], json!(-31008));
    assert_eq!(f.effects.count(), 0);

    let response = call(&f, "CheckTransaction", json!({"id": "s-1"})).await;
    assert_eq!(response["error"]["code"], json!(-31003));
    let response = call(&f, "CancelTransaction", json!({"id": "s-1", "reason": 1})).await;
    assert_eq!(response["error"]["code"], json!(-31003));
}

#[tokio::test]
async fn test_perform_on_completed_session_skips_effects() {
    let f = fixture(&[SESSION]).await;
    call(&f, "CreateTransaction", create_params("p-1", 1_714_564_000_000)).await;
    f.store.mark_completed("s-1", Utc::now()).await.unwrap();

    let performed = call(&f, "PerformTransaction", json!({"id": "s-1"})).await;
    assert_eq!(performed["result"]["state"], json!(2));
    assert_eq!(f.effects.count(), 0);

    let session = f.store.get("s-1").await.unwrap().unwrap();
    assert_eq!(session.state_blob.transaction_marker(), Some("p-1"));
}

#[tokio::test]
async fn test_create_conflict_and_idempotency() {
    let f = fixture(&[SESSION]).await;
    let first = call(&f, "CreateTransaction", create_params("p-1", 1_714_564_000_000)).await;
    let replay = call(&f, "CreateTransaction", create_params("p-1", 1_714_564_999_000)).await;
    assert_eq!(first, replay);

    let conflict = call(&f, "CreateTransaction", create_params("p-2", 1_714_564_000_000)).await;
    assert_eq!(conflict["error"]["code"], json!(-31008));
    let state = PaymeSessionState::load(&f.store.get("s-1").await.unwrap().unwrap().state_blob)
        .unwrap()
        .unwrap();
    assert_eq!(state.gateway_txn_id, "p-1");
}

#[tokio::test]
async fn test_create_validates_account_and_amount() {
    let f = fixture(&[SESSION]).await;

    let response = call(
        &f,
        "CreateTransaction",
        json!({"id": "p-1", "time": 1, "amount": 500_000, "account": {"order_id": "order-9"}}),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-31050));
    assert_eq!(response["error"]["data"], json!("order_id"));

    let response = call(
        &f,
        "CreateTransaction",
        json!({"id": "p-1", "time": 1, "amount": 499_000, "account": {"order_id": "order-1"}}),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-31001));
    assert_eq!(response["error"]["message"]["en"], json!("Invalid amount"));
}

#[tokio::test]
async fn test_out_of_range_amount_is_invalid() {
    let f = fixture(&[SESSION]).await;
    let amount = "-79228162514264337593543950335";

    let response = call(
        &f,
        "CheckPerformTransaction",
        json!({"amount": amount, "account": {"order_id": "order-1"}}),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-31001));

    let response = call(
        &f,
        "CreateTransaction",
        json!({"id": "p-1", "time": 1, "amount": amount, "account": {"order_id": "order-1"}}),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-31001));
    assert!(f.store.get("s-1").await.unwrap().unwrap().state_blob.is_empty());
}

#[tokio::test]
async fn test_cancel_then_check() {
    let f = fixture(&[SESSION]).await;
    call(&f, "CreateTransaction", create_params("p-1", 1_714_564_000_000)).await;

    f.clock.set(1_714_564_500_000);
    let cancelled = call(&f, "CancelTransaction", json!({"id": "s-1", "reason": 3})).await;
    assert_eq!(
        cancelled["result"],
        json!({"transaction": "s-1", "cancel_time": 1_714_564_500_000_i64, "state": -1})
    );

    f.clock.set(1_714_564_600_000);
    let again = call(&f, "CancelTransaction", json!({"id": "s-1", "reason": 3})).await;
    assert_eq!(again, cancelled);

    let checked = call(&f, "CheckTransaction", json!({"id": "s-1"})).await;
    assert_eq!(
        checked["result"],
        json!({
            "create_time": 1_714_564_000_000_i64,
            "perform_time": 0,
            "cancel_time": 1_714_564_500_000_i64,
            "transaction": "s-1",
            "state": -1,
            "reason": 3
        })
    );

    let response = call(&f, "PerformTransaction", json!({"id": "s-1"})).await;
    assert_eq!(response["error"]["code"], json!(-31008));
}

#[tokio::test]
async fn test_refund_disallowed_by_config() {
    let config = PaymeConfig::new(PAYME_KEY).with_cancel_after_perform(false);
    let f = fixture_with(&[SESSION], config).await;
    call(&f, "CreateTransaction", create_params("p-1", 1_714_564_000_000)).await;
    call(&f, "PerformTransaction", json!({"id": "s-1"})).await;

    let response = call(&f, "CancelTransaction", json!({"id": "s-1", "reason": 5})).await;
    assert_eq!(response["error"]["code"], json!(-31007));
    let session = f.store.get("s-1").await.unwrap().unwrap();
    assert_eq!(session.state_blob.transaction_marker(), Some("p-1"));
}

#[tokio::test]
async fn test_credentials_are_checked_first() {
    let f = fixture(&[SESSION]).await;
    let body = rpc("CreateTransaction", create_params("p-1", 1), 5);

    for header in [
        basic_auth("Paycom", "wrong"),
        basic_auth("Other", PAYME_KEY),
        "Bearer token".to_owned(),
    ] {
        let response = f.payme.handle(Some(&header), &body).await;
        assert_eq!(response.error_code(), Some(-32504));
        assert_eq!(response.id, json!(5));
    }

    let session = f.store.get("s-1").await.unwrap().unwrap();
    assert!(session.state_blob.is_empty());
}

#[tokio::test]
async fn test_envelope_errors() {
    let f = fixture(&[SESSION]).await;
    let auth = payme_auth();

    let response = f.payme.handle(Some(&auth), b"not json").await;
    assert_eq!(response.error_code(), Some(-32700));

    let response = f
        .payme
        .handle(Some(&auth), &rpc("ChangePassword", json!({"password": "x"}), 2))
        .await;
    assert_eq!(response.error_code(), Some(-32601));
    assert_eq!(response.id, json!(2));

    let response = f
        .payme
        .handle(Some(&auth), &rpc("CancelTransaction", json!({"id": "s-1"}), 3))
        .await;
    assert_eq!(response.error_code(), Some(-32600));
}

#[tokio::test]
async fn test_foreign_state_keys_survive() {
    let f = fixture(&[SESSION]).await;
    let mut blob = f.store.get("s-1").await.unwrap().unwrap().state_blob;
    blob.set("shipping", json!({"zone": 2}));
    f.store.replace_state("s-1", 0, blob).await.unwrap();

    call(&f, "CreateTransaction", create_params("p-1", 1_714_564_000_000)).await;
    call(&f, "PerformTransaction", json!({"id": "s-1"})).await;

    let session = f.store.get("s-1").await.unwrap().unwrap();
    assert_eq!(session.state_blob.get("shipping"), Some(&json!({"zone": 2})));
}
