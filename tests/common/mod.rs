#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use checkout_callbacks::application::click::ClickProtocol;
use checkout_callbacks::application::payme::PaymeProtocol;
use checkout_callbacks::config::{ClickConfig, EngineConfig, PaymeConfig};
use checkout_callbacks::domain::ports::{
    Clock, PaymentSessionStore, PostSuccessEffects, SessionStoreRef, SignatureVerifier,
    SuccessEvent,
};
use checkout_callbacks::domain::session::{MinorUnits, PaymentSession};
use checkout_callbacks::error::Result;
use checkout_callbacks::infrastructure::in_memory::InMemorySessionStore;
use checkout_callbacks::infrastructure::signature::Md5SignatureVerifier;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub const CLICK_SECRET: &str = "click-secret";
pub const CLICK_SERVICE_ID: &str = "77";
pub const PAYME_KEY: &str = "payme-key";
pub const SIGN_TIME: &str = "2024-05-01 12:00:00";

/// Remembers every success event it receives.
#[derive(Default)]
pub struct RecordingEffects {
    events: Mutex<Vec<SuccessEvent>>,
}

impl RecordingEffects {
    pub fn events(&self) -> Vec<SuccessEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.events().len()
    }
}

#[async_trait]
impl PostSuccessEffects for RecordingEffects {
    async fn on_success(&self, event: &SuccessEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}

/// Clock pinned to a settable Unix millisecond value.
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn at(millis: i64) -> Self {
        Self(AtomicI64::new(millis))
    }

    pub fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0.load(Ordering::SeqCst))
            .single()
            .unwrap_or_default()
    }
}

/// Both engines wired to one in-memory store.
pub struct Fixture {
    pub store: InMemorySessionStore,
    pub effects: Arc<RecordingEffects>,
    pub clock: Arc<FixedClock>,
    pub click: Arc<ClickProtocol>,
    pub payme: Arc<PaymeProtocol>,
}

pub async fn fixture(sessions: &[(&str, &str, i64)]) -> Fixture {
    fixture_with(sessions, PaymeConfig::new(PAYME_KEY)).await
}

pub async fn fixture_with(sessions: &[(&str, &str, i64)], payme: PaymeConfig) -> Fixture {
    let store = InMemorySessionStore::new();
    for (id, correlation_id, amount) in sessions {
        store
            .insert(PaymentSession::new(
                *id,
                *correlation_id,
                MinorUnits(*amount),
                "uzs",
            ))
            .await
            .unwrap();
    }

    let shared: SessionStoreRef = Arc::new(store.clone());
    let effects = Arc::new(RecordingEffects::default());
    let clock = Arc::new(FixedClock::at(1_714_564_800_000));
    let engine = EngineConfig::default();

    let click = ClickProtocol::new(
        ClickConfig::new(CLICK_SECRET).with_service_id(CLICK_SERVICE_ID),
        shared.clone(),
        Arc::new(Md5SignatureVerifier::new()),
        effects.clone(),
        &engine,
    );
    let payme = PaymeProtocol::new(payme, shared, clock.clone(), effects.clone(), &engine);

    Fixture {
        store,
        effects,
        clock,
        click: Arc::new(click),
        payme: Arc::new(payme),
    }
}

/// Signed Prepare body.
pub fn click_prepare(click_trans_id: &str, merchant_trans_id: &str, amount: &str) -> Value {
    let sign = Md5SignatureVerifier::new().sign(&[
        click_trans_id,
        CLICK_SERVICE_ID,
        CLICK_SECRET,
        merchant_trans_id,
        amount,
        "0",
        SIGN_TIME,
    ]);
    json!({
        "click_trans_id": click_trans_id,
        "service_id": CLICK_SERVICE_ID,
        "click_paydoc_id": format!("doc-{}", click_trans_id),
        "merchant_trans_id": merchant_trans_id,
        "amount": amount,
        "action": 0,
        "sign_time": SIGN_TIME,
        "sign_string": sign,
    })
}

/// Signed Complete body carrying Click's own `error` code.
pub fn click_complete(
    click_trans_id: &str,
    merchant_trans_id: &str,
    prepare_id: &str,
    amount: &str,
    error: i64,
) -> Value {
    let sign = Md5SignatureVerifier::new().sign(&[
        click_trans_id,
        CLICK_SERVICE_ID,
        CLICK_SECRET,
        merchant_trans_id,
        prepare_id,
        amount,
        "1",
        SIGN_TIME,
    ]);
    json!({
        "click_trans_id": click_trans_id,
        "service_id": CLICK_SERVICE_ID,
        "click_paydoc_id": format!("doc-{}", click_trans_id),
        "merchant_trans_id": merchant_trans_id,
        "merchant_prepare_id": prepare_id,
        "amount": amount,
        "action": 1,
        "error": error,
        "sign_time": SIGN_TIME,
        "sign_string": sign,
    })
}

pub fn basic_auth(login: &str, key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", login, key)))
}

pub fn payme_auth() -> String {
    basic_auth("Paycom", PAYME_KEY)
}

pub fn rpc(method: &str, params: Value, id: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({"method": method, "params": params, "id": id})).unwrap()
}
