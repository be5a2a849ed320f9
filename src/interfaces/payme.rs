//! Payme Merchant API wire format: JSON-RPC envelopes, method params and results,
//! and the protocol's error catalogue.

use crate::domain::normalize::deserialize_normalized;
use crate::domain::payme_state::PaymeTxState;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const INSUFFICIENT_PRIVILEGE: i32 = -32504;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const INTERNAL_ERROR: i32 = -32400;
pub const INVALID_AMOUNT: i32 = -31001;
pub const TRANSACTION_NOT_FOUND: i32 = -31003;
pub const COULD_NOT_CANCEL: i32 = -31007;
pub const COULD_NOT_PERFORM: i32 = -31008;
pub const INVALID_ACCOUNT: i32 = -31050;

/// Payme expects every error message in three languages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedMessage {
    pub ru: String,
    pub uz: String,
    pub en: String,
}

impl LocalizedMessage {
    pub fn new(ru: &str, uz: &str, en: &str) -> Self {
        Self {
            ru: ru.to_owned(),
            uz: uz.to_owned(),
            en: en.to_owned(),
        }
    }
}

/// Error member of a JSON-RPC response.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Payme error {}: {}", .code, .message.en)]
pub struct PaymeError {
    pub code: i32,
    pub message: LocalizedMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl PaymeError {
    pub fn new(code: i32, message: LocalizedMessage) -> Self {
        Self {
            code,
            message,
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn insufficient_privilege() -> Self {
        Self::new(
            INSUFFICIENT_PRIVILEGE,
            LocalizedMessage::new(
                "Недостаточно привилегий для выполнения метода",
                "Usulni bajarish uchun imtiyozlar yetarli emas",
                "Insufficient privilege to perform this method",
            ),
        )
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            METHOD_NOT_FOUND,
            LocalizedMessage::new("Метод не найден", "Usul topilmadi", "Method not found"),
        )
        .with_data(method)
    }

    pub fn parse_error() -> Self {
        Self::new(
            PARSE_ERROR,
            LocalizedMessage::new(
                "Ошибка разбора JSON",
                "JSON tahlil xatosi",
                "JSON parse error",
            ),
        )
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(
            INVALID_REQUEST,
            LocalizedMessage::new("Неверный запрос", "Noto'g'ri so'rov", "Invalid request"),
        )
        .with_data(detail)
    }

    pub fn invalid_amount() -> Self {
        Self::new(
            INVALID_AMOUNT,
            LocalizedMessage::new("Неверная сумма", "Noto'g'ri summa", "Invalid amount"),
        )
    }

    pub fn transaction_not_found() -> Self {
        Self::new(
            TRANSACTION_NOT_FOUND,
            LocalizedMessage::new(
                "Транзакция не найдена",
                "Tranzaksiya topilmadi",
                "Transaction not found",
            ),
        )
    }

    pub fn could_not_cancel() -> Self {
        Self::new(
            COULD_NOT_CANCEL,
            LocalizedMessage::new(
                "Невозможно отменить транзакцию",
                "Tranzaksiyani bekor qilib bo'lmaydi",
                "Could not cancel transaction",
            ),
        )
    }

    pub fn could_not_perform() -> Self {
        Self::new(
            COULD_NOT_PERFORM,
            LocalizedMessage::new(
                "Невозможно выполнить операцию",
                "Amalni bajarib bo'lmaydi",
                "Could not perform this operation",
            ),
        )
    }

    pub fn active_transaction_exists() -> Self {
        Self::new(
            COULD_NOT_PERFORM,
            LocalizedMessage::new(
                "Невозможно выполнить операцию: по заказу уже есть активная транзакция",
                "Amalni bajarib bo'lmaydi: buyurtma bo'yicha faol tranzaksiya mavjud",
                "Could not perform this operation: an active transaction exists",
            ),
        )
    }

    pub fn invalid_account() -> Self {
        Self::new(
            INVALID_ACCOUNT,
            LocalizedMessage::new(
                "Неверный номер заказа",
                "Buyurtma raqami noto'g'ri",
                "Invalid account",
            ),
        )
        .with_data("order_id")
    }

    pub fn internal() -> Self {
        Self::new(
            INTERNAL_ERROR,
            LocalizedMessage::new(
                "Внутренняя ошибка системы",
                "Tizimning ichki xatosi",
                "Internal system error",
            ),
        )
    }
}

/// A JSON-RPC call as received from Payme.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Value,
    pub id: Value,
}

impl RpcRequest {
    /// Parses the raw body; failures come back as ready-to-send responses.
    pub fn parse(body: &[u8]) -> Result<Self, RpcResponse> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| RpcResponse::failure(Value::Null, PaymeError::parse_error()))?;
        let Value::Object(mut object) = value else {
            return Err(RpcResponse::failure(
                Value::Null,
                PaymeError::invalid_request("body must be an object"),
            ));
        };

        let id = object.remove("id").unwrap_or(Value::Null);
        let Some(Value::String(method)) = object.remove("method") else {
            return Err(RpcResponse::failure(
                id,
                PaymeError::invalid_request("method"),
            ));
        };
        let params = object
            .remove("params")
            .unwrap_or_else(|| Value::Object(Map::new()));

        Ok(Self { method, params, id })
    }

    pub fn params<T: DeserializeOwned>(&self) -> Result<T, PaymeError> {
        serde_json::from_value(self.params.clone())
            .map_err(|e| PaymeError::invalid_request(e.to_string()))
    }
}

/// A JSON-RPC response carrying either `result` or `error`, plus the echoed id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PaymeError>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: PaymeError) -> Self {
        Self {
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn from_result(id: Value, result: Result<Value, PaymeError>) -> Self {
        match result {
            Ok(result) => Self::success(id, result),
            Err(error) => Self::failure(id, error),
        }
    }

    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Decodes `Basic base64(login:key)` into its two halves.
pub fn decode_basic_credentials(header: &str) -> Option<(String, String)> {
    let encoded = header.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (login, key) = text.split_once(':')?;
    Some((login.to_owned(), key.to_owned()))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    #[serde(deserialize_with = "deserialize_normalized")]
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckPerformParams {
    /// Tiyin.
    pub amount: Decimal,
    pub account: Account,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateParams {
    #[serde(deserialize_with = "deserialize_normalized")]
    pub id: String,
    pub time: i64,
    pub amount: Decimal,
    pub account: Account,
}

/// Params of Perform and Check; `id` is the session id handed out by Create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionParams {
    #[serde(deserialize_with = "deserialize_normalized")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CancelParams {
    #[serde(deserialize_with = "deserialize_normalized")]
    pub id: String,
    pub reason: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatementParams {
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckPerformResult {
    pub allow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateResult {
    pub create_time: i64,
    pub transaction: String,
    pub state: PaymeTxState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformResult {
    pub transaction: String,
    pub perform_time: i64,
    pub state: PaymeTxState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelResult {
    pub transaction: String,
    pub cancel_time: i64,
    pub state: PaymeTxState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub create_time: i64,
    pub perform_time: i64,
    pub cancel_time: i64,
    pub transaction: String,
    pub state: PaymeTxState,
    pub reason: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementResult {
    pub transactions: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let body = br#"{"method":"CheckTransaction","params":{"id":"s-1"},"id":42}"#;
        let request = RpcRequest::parse(body).unwrap();
        assert_eq!(request.method, "CheckTransaction");
        assert_eq!(request.id, json!(42));
        let params: TransactionParams = request.params().unwrap();
        assert_eq!(params.id, "s-1");
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        let response = RpcRequest::parse(b"{not json").unwrap_err();
        assert_eq!(response.error_code(), Some(PARSE_ERROR));
        assert_eq!(response.id, Value::Null);
    }

    #[test]
    fn test_missing_method_keeps_id() {
        let response = RpcRequest::parse(br#"{"params":{},"id":7}"#).unwrap_err();
        assert_eq!(response.error_code(), Some(INVALID_REQUEST));
        assert_eq!(response.id, json!(7));
    }

    #[test]
    fn test_ill_typed_params() {
        let request =
            RpcRequest::parse(br#"{"method":"CancelTransaction","params":{"id":"s-1"},"id":1}"#)
                .unwrap();
        let params: Result<CancelParams, PaymeError> = request.params();
        assert_eq!(params.unwrap_err().code, INVALID_REQUEST);
    }

    #[test]
    fn test_account_accepts_numeric_order_id() {
        let params: CreateParams = serde_json::from_value(json!({
            "id": "5305e3bab097f420a62ced0b",
            "time": 1399114284039_i64,
            "amount": 500000,
            "account": {"order_id": 1001}
        }))
        .unwrap();
        assert_eq!(params.account.order_id, "1001");
        assert_eq!(params.amount, Decimal::from(500000));
    }

    #[test]
    fn test_error_response_shape() {
        let response = RpcResponse::failure(json!(3), PaymeError::invalid_account());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "error": {
                    "code": -31050,
                    "message": {
                        "ru": "Неверный номер заказа",
                        "uz": "Buyurtma raqami noto'g'ri",
                        "en": "Invalid account"
                    },
                    "data": "order_id"
                },
                "id": 3
            })
        );
    }

    #[test]
    fn test_decode_basic_credentials() {
        let header = format!("Basic {}", STANDARD.encode("Paycom:secret:with:colons"));
        assert_eq!(
            decode_basic_credentials(&header),
            Some(("Paycom".to_owned(), "secret:with:colons".to_owned()))
        );
        assert_eq!(decode_basic_credentials("Bearer abc"), None);
        assert_eq!(decode_basic_credentials("Basic !!!"), None);
    }
}
