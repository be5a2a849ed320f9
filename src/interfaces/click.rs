//! Click Prepare/Complete wire format.

use crate::domain::normalize::NormalizedFields;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

pub const ACTION_PREPARE: &str = "0";
pub const ACTION_COMPLETE: &str = "1";

/// Click's own `error` value on a Complete call for a successful payment.
pub const CLICK_SUCCESS: i64 = 0;
/// Click's own `error` value on a Complete call for a cancelled payment.
pub const CLICK_CANCELLED: i64 = -5017;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickPhase {
    Prepare,
    Complete,
}

impl ClickPhase {
    pub fn action(&self) -> &'static str {
        match self {
            ClickPhase::Prepare => ACTION_PREPARE,
            ClickPhase::Complete => ACTION_COMPLETE,
        }
    }

    /// Name of the merchant-side id field in the response.
    pub fn id_field(&self) -> &'static str {
        match self {
            ClickPhase::Prepare => "merchant_prepare_id",
            ClickPhase::Complete => "merchant_confirm_id",
        }
    }
}

/// Merchant error codes defined by the Click contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickErrorCode {
    Success,
    SignCheckFailed,
    IncorrectAmount,
    ActionNotFound,
    AlreadyPaid,
    UserNotFound,
    TransactionNotFound,
    UpdateFailed,
    BadRequest,
    TransactionCancelled,
}

impl ClickErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            ClickErrorCode::Success => 0,
            ClickErrorCode::SignCheckFailed => -1,
            ClickErrorCode::IncorrectAmount => -2,
            ClickErrorCode::ActionNotFound => -3,
            ClickErrorCode::AlreadyPaid => -4,
            ClickErrorCode::UserNotFound => -5,
            ClickErrorCode::TransactionNotFound => -6,
            ClickErrorCode::UpdateFailed => -7,
            ClickErrorCode::BadRequest => -8,
            ClickErrorCode::TransactionCancelled => -9,
        }
    }

    pub fn note(&self) -> &'static str {
        match self {
            ClickErrorCode::Success => "Success",
            ClickErrorCode::SignCheckFailed => "SIGN CHECK FAILED!",
            ClickErrorCode::IncorrectAmount => "Incorrect parameter amount",
            ClickErrorCode::ActionNotFound => "Action not found",
            ClickErrorCode::AlreadyPaid => "Already paid",
            ClickErrorCode::UserNotFound => "User does not exist",
            ClickErrorCode::TransactionNotFound => "Transaction does not exist",
            ClickErrorCode::UpdateFailed => "Failed to update user",
            ClickErrorCode::BadRequest => "Error in request from click",
            ClickErrorCode::TransactionCancelled => "Transaction cancelled",
        }
    }
}

/// A validated Prepare or Complete request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickRequest {
    pub phase: ClickPhase,
    pub click_trans_id: String,
    pub service_id: String,
    pub click_paydoc_id: String,
    pub merchant_trans_id: String,
    /// Complete only.
    pub merchant_prepare_id: Option<String>,
    /// Decimal amount in sums, exactly as sent (it is part of the signature).
    pub amount: String,
    pub action: String,
    pub sign_time: String,
    pub sign_string: String,
    /// Click's own outcome code, Complete only.
    pub error: i64,
    pub error_note: Option<String>,
}

impl ClickRequest {
    /// Checks that every required field is present.
    pub fn parse(phase: ClickPhase, fields: &NormalizedFields) -> Result<Self, ClickErrorCode> {
        let required = |key: &str| {
            fields
                .get(key)
                .map(str::to_owned)
                .ok_or(ClickErrorCode::BadRequest)
        };

        let merchant_prepare_id = match phase {
            ClickPhase::Prepare => None,
            ClickPhase::Complete => Some(required("merchant_prepare_id")?),
        };
        let error = match (phase, fields.get("error")) {
            (ClickPhase::Complete, Some(raw)) => {
                raw.parse::<i64>().map_err(|_| ClickErrorCode::BadRequest)?
            }
            _ => CLICK_SUCCESS,
        };

        Ok(Self {
            phase,
            click_trans_id: required("click_trans_id")?,
            service_id: required("service_id")?,
            click_paydoc_id: required("click_paydoc_id")?,
            merchant_trans_id: required("merchant_trans_id")?,
            merchant_prepare_id,
            amount: required("amount")?,
            action: required("action")?,
            sign_time: required("sign_time")?,
            sign_string: required("sign_string")?,
            error,
            error_note: fields.get("error_note").map(str::to_owned),
        })
    }

    /// Fields covered by `sign_string`, in signing order.
    pub fn signed_parts<'a>(&'a self, secret_key: &'a str) -> Vec<&'a str> {
        let mut parts = vec![
            self.click_trans_id.as_str(),
            self.service_id.as_str(),
            secret_key,
            self.merchant_trans_id.as_str(),
        ];
        if let Some(prepare_id) = &self.merchant_prepare_id {
            parts.push(prepare_id);
        }
        parts.extend([
            self.amount.as_str(),
            self.action.as_str(),
            self.sign_time.as_str(),
        ]);
        parts
    }
}

/// Flat response returned for every Click call, success or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickResponse {
    pub phase: ClickPhase,
    pub click_trans_id: Option<String>,
    pub merchant_trans_id: Option<String>,
    /// Prepare id on Prepare, confirm id on Complete.
    pub merchant_id: Option<String>,
    pub error: i64,
    pub error_note: String,
}

impl ClickResponse {
    /// Starts a response echoing whatever identifiers the request carried.
    pub fn echo(phase: ClickPhase, fields: &NormalizedFields) -> Self {
        Self {
            phase,
            click_trans_id: fields.get("click_trans_id").map(str::to_owned),
            merchant_trans_id: fields.get("merchant_trans_id").map(str::to_owned),
            merchant_id: None,
            error: ClickErrorCode::Success.code(),
            error_note: ClickErrorCode::Success.note().to_owned(),
        }
    }

    pub fn with_code(mut self, code: ClickErrorCode) -> Self {
        self.error = code.code();
        self.error_note = code.note().to_owned();
        self
    }

    pub fn with_error(mut self, error: i64, error_note: impl Into<String>) -> Self {
        self.error = error;
        self.error_note = error_note.into();
        self
    }

    pub fn with_merchant_id(mut self, merchant_id: &str) -> Self {
        self.merchant_id = Some(merchant_id.to_owned());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error == ClickErrorCode::Success.code()
    }
}

/// Integral ids go back as JSON numbers, the way Click sends them.
///
/// Only ids whose text survives the round trip are converted, so `"007"`
/// stays a string.
fn wire_id(id: Option<&String>) -> Value {
    match id {
        None => Value::Null,
        Some(id) => match id.parse::<i64>() {
            Ok(n) if n.to_string() == *id => Value::from(n),
            _ => Value::from(id.as_str()),
        },
    }
}

impl Serialize for ClickResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("click_trans_id", &wire_id(self.click_trans_id.as_ref()))?;
        map.serialize_entry("merchant_trans_id", &self.merchant_trans_id)?;
        map.serialize_entry(self.phase.id_field(), &wire_id(self.merchant_id.as_ref()))?;
        map.serialize_entry("error", &self.error)?;
        map.serialize_entry("error_note", &self.error_note)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prepare_fields() -> NormalizedFields {
        [
            ("click_trans_id", "1001"),
            ("service_id", "77"),
            ("click_paydoc_id", "5001"),
            ("merchant_trans_id", "order-1"),
            ("amount", "1000.00"),
            ("action", "0"),
            ("sign_time", "2024-01-01 10:00:00"),
            ("sign_string", "abc"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_parse_prepare() {
        let request = ClickRequest::parse(ClickPhase::Prepare, &prepare_fields()).unwrap();
        assert_eq!(request.click_trans_id, "1001");
        assert_eq!(request.merchant_prepare_id, None);
        assert_eq!(request.error, 0);
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let mut fields = prepare_fields();
        fields.insert("sign_string", "");
        assert_eq!(
            ClickRequest::parse(ClickPhase::Prepare, &fields),
            Err(ClickErrorCode::BadRequest)
        );
    }

    #[test]
    fn test_complete_requires_prepare_id() {
        let mut fields = prepare_fields();
        fields.insert("action", "1");
        assert_eq!(
            ClickRequest::parse(ClickPhase::Complete, &fields),
            Err(ClickErrorCode::BadRequest)
        );

        fields.insert("merchant_prepare_id", "1001");
        fields.insert("error", "-5017");
        let request = ClickRequest::parse(ClickPhase::Complete, &fields).unwrap();
        assert_eq!(request.error, CLICK_CANCELLED);
    }

    #[test]
    fn test_complete_rejects_non_numeric_error() {
        let mut fields = prepare_fields();
        fields.insert("merchant_prepare_id", "1001");
        fields.insert("error", "oops");
        assert_eq!(
            ClickRequest::parse(ClickPhase::Complete, &fields),
            Err(ClickErrorCode::BadRequest)
        );
    }

    #[test]
    fn test_signed_parts_order() {
        let mut fields = prepare_fields();
        fields.insert("merchant_prepare_id", "1001");
        let request = ClickRequest::parse(ClickPhase::Complete, &fields).unwrap();
        assert_eq!(
            request.signed_parts("secret"),
            vec![
                "1001",
                "77",
                "secret",
                "order-1",
                "1001",
                "1000.00",
                "0",
                "2024-01-01 10:00:00"
            ]
        );
    }

    #[test]
    fn test_response_shape() {
        let response = ClickResponse::echo(ClickPhase::Prepare, &prepare_fields())
            .with_merchant_id("1001");
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "click_trans_id": 1001,
                "merchant_trans_id": "order-1",
                "merchant_prepare_id": 1001,
                "error": 0,
                "error_note": "Success"
            })
        );

        let failed = ClickResponse::echo(ClickPhase::Complete, &NormalizedFields::default())
            .with_code(ClickErrorCode::BadRequest);
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({
                "click_trans_id": null,
                "merchant_trans_id": null,
                "merchant_confirm_id": null,
                "error": -8,
                "error_note": "Error in request from click"
            })
        );
    }

    #[test]
    fn test_response_keeps_non_canonical_ids_as_text() {
        let mut fields = prepare_fields();
        fields.insert("click_trans_id", "007");
        let response = ClickResponse::echo(ClickPhase::Prepare, &fields).with_merchant_id("+7");
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["click_trans_id"], json!("007"));
        assert_eq!(value["merchant_prepare_id"], json!("+7"));
    }
}
