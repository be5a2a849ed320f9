use super::session::{StateBlob, TRANSACTION_MARKER_KEY};
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State blob key owned by the Payme protocol.
pub const PAYME_STATE_KEY: &str = "payme";

/// Cancellation reason Payme defines for transactions that expired before Perform.
pub const REASON_TIMEOUT: i32 = 4;

/// Payme transaction state, serialized as its numeric protocol code.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(try_from = "i8", into = "i8")]
pub enum PaymeTxState {
    #[default]
    None,
    Created,
    Performed,
    CancelledFromCreated,
    CancelledFromPerformed,
}

impl PaymeTxState {
    pub fn code(&self) -> i8 {
        match self {
            PaymeTxState::None => 0,
            PaymeTxState::Created => 1,
            PaymeTxState::Performed => 2,
            PaymeTxState::CancelledFromCreated => -1,
            PaymeTxState::CancelledFromPerformed => -2,
        }
    }

    /// Created or performed; blocks a second transaction on the same session.
    pub fn is_active(&self) -> bool {
        matches!(self, PaymeTxState::Created | PaymeTxState::Performed)
    }
}

impl From<PaymeTxState> for i8 {
    fn from(state: PaymeTxState) -> Self {
        state.code()
    }
}

impl TryFrom<i8> for PaymeTxState {
    type Error = PaymentError;

    fn try_from(code: i8) -> Result<Self> {
        match code {
            0 => Ok(PaymeTxState::None),
            1 => Ok(PaymeTxState::Created),
            2 => Ok(PaymeTxState::Performed),
            -1 => Ok(PaymeTxState::CancelledFromCreated),
            -2 => Ok(PaymeTxState::CancelledFromPerformed),
            other => Err(PaymentError::StateBlobError(format!(
                "unknown Payme state {}",
                other
            ))),
        }
    }
}

/// Payme protocol state for one session.
///
/// Times are Unix milliseconds; zero means "not reached", as Payme expects.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct PaymeSessionState {
    pub state: PaymeTxState,
    pub gateway_txn_id: String,
    pub create_time: i64,
    #[serde(default)]
    pub perform_time: i64,
    #[serde(default)]
    pub cancel_time: i64,
    #[serde(default)]
    pub reason: Option<i32>,
}

impl PaymeSessionState {
    pub fn created(gateway_txn_id: &str, create_time: i64) -> Self {
        Self {
            state: PaymeTxState::Created,
            gateway_txn_id: gateway_txn_id.to_owned(),
            create_time,
            perform_time: 0,
            cancel_time: 0,
            reason: None,
        }
    }

    pub fn load(blob: &StateBlob) -> Result<Option<Self>> {
        blob.decode(PAYME_STATE_KEY)
    }

    pub fn save(&self, blob: &mut StateBlob) -> Result<()> {
        blob.encode(PAYME_STATE_KEY, self)
    }

    /// Whether a created transaction has outlived the gateway timeout.
    pub fn is_expired(&self, now: i64, timeout_ms: i64) -> bool {
        self.state == PaymeTxState::Created && now.saturating_sub(self.create_time) > timeout_ms
    }

    /// Moves a created transaction to performed and stamps the payment marker.
    pub fn perform(&mut self, now: i64, blob: &mut StateBlob) -> Result<()> {
        if self.state != PaymeTxState::Created {
            return Err(PaymentError::ValidationError(format!(
                "cannot perform from state {}",
                self.state.code()
            )));
        }
        self.state = PaymeTxState::Performed;
        self.perform_time = now;
        blob.set(
            TRANSACTION_MARKER_KEY,
            Value::String(self.gateway_txn_id.clone()),
        );
        self.save(blob)
    }

    /// Cancels a created or performed transaction.
    ///
    /// Cancelling a performed transaction is a refund and revokes the
    /// payment marker.
    pub fn cancel(&mut self, now: i64, reason: i32, blob: &mut StateBlob) -> Result<()> {
        self.state = match self.state {
            PaymeTxState::Created => PaymeTxState::CancelledFromCreated,
            PaymeTxState::Performed => {
                blob.remove(TRANSACTION_MARKER_KEY);
                PaymeTxState::CancelledFromPerformed
            }
            other => {
                return Err(PaymentError::ValidationError(format!(
                    "cannot cancel from state {}",
                    other.code()
                )));
            }
        };
        self.cancel_time = now;
        self.reason = Some(reason);
        self.save(blob)
    }
}
