use crate::domain::session::{MinorUnits, PaymentSession};
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

/// One CSV row; `amount` is in minor units.
#[derive(Debug, Deserialize)]
struct SessionRecord {
    id: String,
    correlation_id: String,
    amount: i64,
    currency: String,
}

impl SessionRecord {
    fn into_session(self) -> Result<PaymentSession> {
        if self.id.is_empty() || self.correlation_id.is_empty() {
            return Err(PaymentError::ValidationError(
                "session id and correlation id are required".into(),
            ));
        }
        if self.amount <= 0 {
            return Err(PaymentError::ValidationError(format!(
                "session {} has a non-positive amount",
                self.id
            )));
        }
        Ok(PaymentSession::new(
            self.id,
            self.correlation_id,
            MinorUnits(self.amount),
            &self.currency,
        ))
    }
}

/// Reads checkout sessions from a CSV source.
///
/// Whitespace around fields is trimmed, so hand-written seed files with
/// aligned columns are accepted.
pub struct SessionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SessionReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily yields one session per row.
    pub fn sessions(self) -> impl Iterator<Item = Result<PaymentSession>> {
        self.reader
            .into_deserialize::<SessionRecord>()
            .map(|result| result.map_err(PaymentError::from).and_then(SessionRecord::into_session))
    }
}
