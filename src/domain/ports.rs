use super::session::{MinorUnits, PaymentSession, StateBlob};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Read/write access to checkout sessions.
///
/// `replace_state` is the only write the protocol engines perform. It must be
/// atomic: when the stored version differs from `expected_version` the store
/// returns [`crate::error::PaymentError::VersionConflict`] and changes nothing.
#[async_trait]
pub trait PaymentSessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>>;
    async fn find_by_correlation_id(&self, correlation_id: &str)
    -> Result<Option<PaymentSession>>;
    async fn replace_state(
        &self,
        session_id: &str,
        expected_version: u64,
        state_blob: StateBlob,
    ) -> Result<PaymentSession>;

    /// Creates or replaces a session. Called by the checkout subsystem.
    async fn insert(&self, session: PaymentSession) -> Result<()>;
    /// Stamps `completed_at`. Called by the checkout completion effect.
    async fn mark_completed(&self, session_id: &str, at: DateTime<Utc>) -> Result<()>;
}

pub type SessionStoreRef = Arc<dyn PaymentSessionStore>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Click,
    Payme,
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gateway::Click => f.write_str("click"),
            Gateway::Payme => f.write_str("payme"),
        }
    }
}

/// Emitted once when a transaction reaches its terminal success state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessEvent {
    pub gateway: Gateway,
    pub session_id: String,
    pub correlation_id: String,
    pub provider_doc_id: Option<String>,
    pub amount: MinorUnits,
}

/// Order completion and fiscal receipt submission.
#[async_trait]
pub trait PostSuccessEffects: Send + Sync {
    async fn on_success(&self, event: &SuccessEvent) -> Result<()>;
}

pub type EffectsRef = Arc<dyn PostSuccessEffects>;

/// Keyed digest over an ordered list of request fields.
pub trait SignatureVerifier: Send + Sync {
    /// Lower-case hex digest of the concatenated parts.
    fn sign(&self, parts: &[&str]) -> String;
    /// Case-insensitive comparison of `signature` against [`Self::sign`].
    fn verify(&self, parts: &[&str], signature: &str) -> bool;
}

pub type VerifierRef = Arc<dyn SignatureVerifier>;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

pub type ClockRef = Arc<dyn Clock>;
