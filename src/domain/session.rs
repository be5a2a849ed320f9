use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of minor units (tiyin) in one major unit (sum).
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Key of the proof-of-payment marker read by the checkout subsystem.
pub const TRANSACTION_MARKER_KEY: &str = "transaction_id";

/// Represents a monetary value in the minor currency unit.
///
/// Sessions always store amounts in minor units. Gateways that speak major
/// units (decimal sums) convert through [`MinorUnits::from_major`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinorUnits(pub i64);

impl MinorUnits {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Converts a major-unit decimal into minor units.
    ///
    /// Returns `None` when the value carries a fraction of a minor unit or
    /// does not fit into an `i64`.
    pub fn from_major(amount: Decimal) -> Option<Self> {
        let minor = amount.checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))?;
        if !minor.fract().is_zero() {
            return None;
        }
        minor.to_i64().map(Self)
    }

    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Compares against an inbound minor-unit amount with an absolute slack.
    ///
    /// An inbound value too far out of range to subtract never matches.
    pub fn matches_within(&self, inbound: Decimal, tolerance: Decimal) -> bool {
        inbound
            .checked_sub(Decimal::from(self.0))
            .is_some_and(|diff| diff.abs() <= tolerance)
    }
}

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Open key/value record embedded in a session.
///
/// The checkout subsystem owns the record; this crate only reads and writes
/// its own namespaced keys and leaves every other key untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateBlob(Map<String, Value>);

impl StateBlob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_owned(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes the typed value stored under `key`, if any.
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| PaymentError::StateBlobError(format!("key '{}': {}", key, e))),
        }
    }

    /// Encodes `value` under `key`, replacing whatever was there.
    pub fn encode<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_value(value)
            .map_err(|e| PaymentError::StateBlobError(format!("key '{}': {}", key, e)))?;
        self.0.insert(key.to_owned(), encoded);
        Ok(())
    }

    /// Returns the proof-of-payment marker, when one has been stamped.
    pub fn transaction_marker(&self) -> Option<&str> {
        self.0.get(TRANSACTION_MARKER_KEY).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for StateBlob {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One checkout attempt, as seen by the callback engines.
///
/// Owned by the checkout subsystem. The engines write only `state_blob`, and
/// every write goes through a compare-and-swap on `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Opaque identifier, stable for the life of the checkout attempt.
    pub id: String,
    /// Cart or order id used by gateways to locate the session.
    pub correlation_id: String,
    /// Amount due, in minor units.
    pub amount: MinorUnits,
    /// Lower-cased currency code.
    pub currency_code: String,
    /// Gateway protocol state.
    #[serde(default)]
    pub state_blob: StateBlob,
    /// Set by the checkout completion effect only.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every write.
    #[serde(default)]
    pub version: u64,
}

impl PaymentSession {
    pub fn new(
        id: impl Into<String>,
        correlation_id: impl Into<String>,
        amount: MinorUnits,
        currency_code: &str,
    ) -> Self {
        Self {
            id: id.into(),
            correlation_id: correlation_id.into(),
            amount,
            currency_code: currency_code.trim().to_lowercase(),
            state_blob: StateBlob::new(),
            completed_at: None,
            version: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}
