use super::session::StateBlob;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// State blob key owned by the Click protocol.
pub const CLICK_STATE_KEY: &str = "click";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClickStatus {
    #[default]
    Pending,
    Prepared,
    Completed,
    Cancelled,
    Error,
}

/// Click protocol state for one session.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ClickSessionState {
    pub state: ClickStatus,
    pub click_trans_id: String,
    pub prepare_id: String,
    pub click_paydoc_id: String,
    pub sign_time: String,
    /// Click's own error code from the last Complete call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_note: Option<String>,
}

impl ClickSessionState {
    /// Builds the state recorded by a successful Prepare.
    ///
    /// The prepare id is the Click transaction id itself.
    pub fn prepared(click_trans_id: &str, click_paydoc_id: &str, sign_time: &str) -> Self {
        Self {
            state: ClickStatus::Prepared,
            click_trans_id: click_trans_id.to_owned(),
            prepare_id: click_trans_id.to_owned(),
            click_paydoc_id: click_paydoc_id.to_owned(),
            sign_time: sign_time.to_owned(),
            error: None,
            error_note: None,
        }
    }

    pub fn load(blob: &StateBlob) -> Result<Option<Self>> {
        blob.decode(CLICK_STATE_KEY)
    }

    pub fn save(&self, blob: &mut StateBlob) -> Result<()> {
        blob.encode(CLICK_STATE_KEY, self)
    }

    /// Records the outcome of a Complete call.
    pub fn conclude(&mut self, status: ClickStatus, error: i64, error_note: Option<String>) {
        self.state = status;
        self.error = Some(error);
        self.error_note = error_note;
    }

    pub fn is_completed_cleanly(&self) -> bool {
        self.state == ClickStatus::Completed && self.error.unwrap_or(0) == 0
    }
}
