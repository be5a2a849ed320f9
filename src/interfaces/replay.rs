//! JSON-lines callback replay, one recorded gateway request per line.

use crate::application::click::ClickProtocol;
use crate::application::payme::PaymeProtocol;
use crate::error::{PaymentError, Result};
use crate::interfaces::click::ClickPhase;
use serde::Deserialize;
use serde_json::Value;
use std::io::BufRead;
use tracing::debug;

/// A recorded inbound callback.
///
/// A Click `body` given as a JSON string is treated as an urlencoded form;
/// a Payme `body` given as a string is sent verbatim, which allows replaying
/// malformed payloads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "gateway", rename_all = "lowercase")]
pub enum ReplayRecord {
    Click {
        phase: ClickPhase,
        body: Value,
    },
    Payme {
        #[serde(default)]
        authorization: Option<String>,
        body: Value,
    },
}

/// Reads replay records line by line, skipping blank lines.
pub struct ReplayReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> ReplayReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn records(self) -> impl Iterator<Item = Result<ReplayRecord>> {
        self.source
            .lines()
            .enumerate()
            .filter(|(_, line)| !matches!(line, Ok(text) if text.trim().is_empty()))
            .map(|(index, line)| -> Result<ReplayRecord> {
                let line = line?;
                serde_json::from_str(&line).map_err(|e| {
                    PaymentError::ValidationError(format!("line {}: {}", index + 1, e))
                })
            })
    }
}

/// Feeds replay records through the protocol engines.
pub struct Replayer {
    click: ClickProtocol,
    payme: PaymeProtocol,
}

impl Replayer {
    pub fn new(click: ClickProtocol, payme: PaymeProtocol) -> Self {
        Self { click, payme }
    }

    /// Returns the response the gateway would have received.
    pub async fn replay(&self, record: &ReplayRecord) -> Result<Value> {
        match record {
            ReplayRecord::Click { phase, body } => {
                debug!(?phase, "Replaying Click callback");
                let response = match body {
                    Value::String(form) => self.click.handle_form(*phase, form).await,
                    other => self.click.handle_json(*phase, other).await,
                };
                Ok(serde_json::to_value(response)?)
            }
            ReplayRecord::Payme {
                authorization,
                body,
            } => {
                debug!("Replaying Payme callback");
                let raw = match body {
                    Value::String(text) => text.clone().into_bytes(),
                    other => serde_json::to_vec(other)?,
                };
                let response = self.payme.handle(authorization.as_deref(), &raw).await;
                Ok(serde_json::to_value(response)?)
            }
        }
    }
}
