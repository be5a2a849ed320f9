//! Gateway and engine settings.
//!
//! Values are injected by the caller; this crate does not read files or the
//! environment itself (the binary maps its CLI arguments onto these types).

use std::time::Duration;

/// Settings for the Click Prepare/Complete endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickConfig {
    /// Shared secret mixed into every request signature.
    pub secret_key: String,
    /// When set, requests for any other service id are rejected.
    pub service_id: Option<String>,
}

impl ClickConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            service_id: None,
        }
    }

    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }
}

/// Payme's default login in the Basic credential.
pub const DEFAULT_PAYME_LOGIN: &str = "Paycom";
/// Payme cancels created transactions that were not performed within 12 hours.
pub const DEFAULT_PAYME_TIMEOUT_MS: i64 = 43_200_000;

/// Settings for the Payme JSON-RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymeConfig {
    pub login: String,
    pub key: String,
    pub transaction_timeout_ms: i64,
    /// Whether a performed transaction may still be cancelled (refunded).
    pub allow_cancel_after_perform: bool,
}

impl PaymeConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            login: DEFAULT_PAYME_LOGIN.to_owned(),
            key: key.into(),
            transaction_timeout_ms: DEFAULT_PAYME_TIMEOUT_MS,
            allow_cancel_after_perform: true,
        }
    }

    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = login.into();
        self
    }

    pub fn with_transaction_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.transaction_timeout_ms = timeout_ms;
        self
    }

    pub fn with_cancel_after_perform(mut self, allow: bool) -> Self {
        self.allow_cancel_after_perform = allow;
        self
    }
}

/// Settings shared by both protocol engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound for a single post-success effect call.
    pub effects_timeout: Duration,
    /// How many times a state transition is re-evaluated after losing a race.
    pub max_update_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            effects_timeout: Duration::from_secs(5),
            max_update_attempts: 5,
        }
    }
}
