use crate::application::effects::EffectsDispatcher;
use crate::application::update::{Outcome, SessionKey, SessionUpdater};
use crate::config::{EngineConfig, PaymeConfig};
use crate::domain::payme_state::{PaymeSessionState, PaymeTxState, REASON_TIMEOUT};
use crate::domain::ports::{ClockRef, EffectsRef, Gateway, SessionStoreRef, SuccessEvent};
use crate::domain::session::PaymentSession;
use crate::error::{PaymentError, Result};
use crate::interfaces::payme::{
    CancelParams, CancelResult, CheckPerformParams, CheckPerformResult, CheckResult,
    CreateParams, CreateResult, PaymeError, PerformResult, RpcRequest, RpcResponse,
    StatementParams, StatementResult, TransactionParams, decode_basic_credentials,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

/// Payme may round amounts by one tiyin.
const AMOUNT_TOLERANCE: Decimal = Decimal::ONE;

type MethodResult<T> = std::result::Result<T, PaymeError>;

/// Merchant side of the Payme Merchant API.
///
/// `CreateTransaction` answers with the session's own id as the transaction
/// id. Payme echoes that value back as `id` in every later call, so Perform,
/// Cancel and Check locate the session directly by id.
pub struct PaymeProtocol {
    config: PaymeConfig,
    updater: SessionUpdater,
    clock: ClockRef,
    effects: EffectsDispatcher,
}

impl PaymeProtocol {
    pub fn new(
        config: PaymeConfig,
        store: SessionStoreRef,
        clock: ClockRef,
        effects: EffectsRef,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            config,
            updater: SessionUpdater::new(store, engine.max_update_attempts),
            clock,
            effects: EffectsDispatcher::new(effects, engine.effects_timeout),
        }
    }

    /// Handles one JSON-RPC call end to end.
    ///
    /// `authorization` is the raw `Authorization` header value, if any.
    pub async fn handle(&self, authorization: Option<&str>, body: &[u8]) -> RpcResponse {
        let request = match RpcRequest::parse(body) {
            Ok(request) => request,
            Err(response) => {
                warn!(code = ?response.error_code(), "Rejected malformed Payme request");
                return response;
            }
        };

        if !self.is_authorized(authorization) {
            warn!(method = %request.method, "Payme credential check failed");
            return RpcResponse::failure(request.id, PaymeError::insufficient_privilege());
        }

        let result = self.dispatch(&request).await;
        if let Err(e) = &result {
            debug!(method = %request.method, code = e.code, "Payme call answered with error");
        }
        RpcResponse::from_result(request.id, result)
    }

    /// Exact match of both halves of the Basic credential.
    pub fn is_authorized(&self, authorization: Option<&str>) -> bool {
        let Some((login, key)) = authorization.and_then(decode_basic_credentials) else {
            return false;
        };
        let login_ok: bool = login.as_bytes().ct_eq(self.config.login.as_bytes()).into();
        let key_ok: bool = key.as_bytes().ct_eq(self.config.key.as_bytes()).into();
        login_ok & key_ok
    }

    pub async fn dispatch(&self, request: &RpcRequest) -> MethodResult<Value> {
        match request.method.as_str() {
            "CheckPerformTransaction" => {
                into_value(self.check_perform_transaction(request.params()?).await?)
            }
            "CreateTransaction" => into_value(self.create_transaction(request.params()?).await?),
            "PerformTransaction" => {
                into_value(self.perform_transaction(request.params()?).await?)
            }
            "CancelTransaction" => into_value(self.cancel_transaction(request.params()?).await?),
            "CheckTransaction" => into_value(self.check_transaction(request.params()?).await?),
            "GetStatement" => into_value(self.get_statement(request.params()?)),
            other => Err(PaymeError::method_not_found(other)),
        }
    }

    pub async fn check_perform_transaction(
        &self,
        params: CheckPerformParams,
    ) -> MethodResult<CheckPerformResult> {
        let key = SessionKey::Correlation(params.account.order_id.clone());
        let session = self
            .updater
            .load(&key)
            .await
            .map_err(internal)?
            .ok_or_else(PaymeError::invalid_account)?;

        if !session.amount.matches_within(params.amount, AMOUNT_TOLERANCE) {
            return Err(PaymeError::invalid_amount());
        }
        Ok(CheckPerformResult { allow: true })
    }

    pub async fn create_transaction(&self, params: CreateParams) -> MethodResult<CreateResult> {
        let key = SessionKey::Correlation(params.account.order_id.clone());
        let applied = self
            .updater
            .run(&key, |session| decide_create(&params, session))
            .await
            .map_err(internal)?;

        if applied.reply.is_ok() {
            info!(
                payme_txn_id = %params.id,
                order_id = %params.account.order_id,
                "Payme transaction created"
            );
        }
        applied.reply
    }

    pub async fn perform_transaction(
        &self,
        params: TransactionParams,
    ) -> MethodResult<PerformResult> {
        let now = self.clock.now_millis();
        let timeout_ms = self.config.transaction_timeout_ms;
        let key = SessionKey::Id(params.id.clone());
        let applied = self
            .updater
            .run(&key, |session| decide_perform(now, timeout_ms, session))
            .await
            .map_err(internal)?;

        if let Some(event) = &applied.effect {
            info!(session_id = %params.id, "Payme transaction performed");
            self.effects.dispatch(event).await;
        }
        applied.reply
    }

    pub async fn cancel_transaction(&self, params: CancelParams) -> MethodResult<CancelResult> {
        let now = self.clock.now_millis();
        let allow_refund = self.config.allow_cancel_after_perform;
        let key = SessionKey::Id(params.id.clone());
        let applied = self
            .updater
            .run(&key, |session| {
                decide_cancel(now, params.reason, allow_refund, session)
            })
            .await
            .map_err(internal)?;

        if let Ok(result) = &applied.reply {
            info!(
                session_id = %params.id,
                state = result.state.code(),
                reason = params.reason,
                "Payme transaction cancelled"
            );
        }
        applied.reply
    }

    /// Read-only view of the transaction stored on a session.
    pub async fn check_transaction(&self, params: TransactionParams) -> MethodResult<CheckResult> {
        let session = self
            .updater
            .load(&SessionKey::Id(params.id.clone()))
            .await
            .map_err(internal)?
            .ok_or_else(PaymeError::transaction_not_found)?;
        let state = PaymeSessionState::load(&session.state_blob)
            .map_err(internal)?
            .filter(|s| s.state != PaymeTxState::None)
            .ok_or_else(PaymeError::transaction_not_found)?;

        Ok(CheckResult {
            create_time: state.create_time,
            perform_time: state.perform_time,
            cancel_time: state.cancel_time,
            transaction: session.id,
            state: state.state,
            reason: state.reason,
        })
    }

    /// Reconciliation statements are not kept by this engine.
    pub fn get_statement(&self, params: StatementParams) -> StatementResult {
        debug!(from = params.from, to = params.to, "Payme statement requested");
        StatementResult {
            transactions: Vec::new(),
        }
    }
}

fn into_value<T: Serialize>(result: T) -> MethodResult<Value> {
    serde_json::to_value(result).map_err(|e| internal(e.into()))
}

fn internal(e: PaymentError) -> PaymeError {
    error!(error = %e, "Payme call failed internally");
    PaymeError::internal()
}

fn decide_create(
    params: &CreateParams,
    session: Option<&PaymentSession>,
) -> Result<Outcome<MethodResult<CreateResult>>> {
    let Some(session) = session else {
        return Ok(Outcome::Reply(Err(PaymeError::invalid_account())));
    };

    if let Some(current) = PaymeSessionState::load(&session.state_blob)? {
        if current.gateway_txn_id == params.id {
            debug!(session_id = %session.id, "Replaying Payme create");
            return Ok(Outcome::Reply(Ok(CreateResult {
                create_time: current.create_time,
                transaction: session.id.clone(),
                state: current.state,
            })));
        }
        if current.state.is_active() {
            return Ok(Outcome::Reply(Err(PaymeError::active_transaction_exists())));
        }
    }

    if !session.amount.matches_within(params.amount, AMOUNT_TOLERANCE) {
        return Ok(Outcome::Reply(Err(PaymeError::invalid_amount())));
    }

    let state = PaymeSessionState::created(&params.id, params.time);
    let mut state_blob = session.state_blob.clone();
    state.save(&mut state_blob)?;

    Ok(Outcome::Write {
        state_blob,
        reply: Ok(CreateResult {
            create_time: params.time,
            transaction: session.id.clone(),
            state: PaymeTxState::Created,
        }),
        effect: None,
    })
}

fn decide_perform(
    now: i64,
    timeout_ms: i64,
    session: Option<&PaymentSession>,
) -> Result<Outcome<MethodResult<PerformResult>>> {
    let Some(session) = session else {
        return Ok(Outcome::Reply(Err(PaymeError::transaction_not_found())));
    };
    // No stored transaction is state 0.
    let Some(mut state) = PaymeSessionState::load(&session.state_blob)? else {
        return Ok(Outcome::Reply(Err(PaymeError::could_not_perform())));
    };

    match state.state {
        PaymeTxState::Performed => {
            debug!(session_id = %session.id, "Replaying Payme perform");
            Ok(Outcome::Reply(Ok(PerformResult {
                transaction: session.id.clone(),
                perform_time: state.perform_time,
                state: state.state,
            })))
        }
        PaymeTxState::Created if state.is_expired(now, timeout_ms) => {
            warn!(session_id = %session.id, "Payme transaction expired before perform");
            let mut state_blob = session.state_blob.clone();
            state.cancel(now, REASON_TIMEOUT, &mut state_blob)?;
            Ok(Outcome::Write {
                state_blob,
                reply: Err(PaymeError::could_not_perform()),
                effect: None,
            })
        }
        PaymeTxState::Created => {
            let mut state_blob = session.state_blob.clone();
            state.perform(now, &mut state_blob)?;
            let effect = (!session.is_completed()).then(|| SuccessEvent {
                gateway: Gateway::Payme,
                session_id: session.id.clone(),
                correlation_id: session.correlation_id.clone(),
                provider_doc_id: Some(state.gateway_txn_id.clone()),
                amount: session.amount,
            });
            Ok(Outcome::Write {
                state_blob,
                reply: Ok(PerformResult {
                    transaction: session.id.clone(),
                    perform_time: now,
                    state: PaymeTxState::Performed,
                }),
                effect,
            })
        }
        _ => Ok(Outcome::Reply(Err(PaymeError::could_not_perform()))),
    }
}

fn decide_cancel(
    now: i64,
    reason: i32,
    allow_refund: bool,
    session: Option<&PaymentSession>,
) -> Result<Outcome<MethodResult<CancelResult>>> {
    let not_found = || Ok(Outcome::Reply(Err(PaymeError::transaction_not_found())));

    let Some(session) = session else {
        return not_found();
    };
    let Some(mut state) = PaymeSessionState::load(&session.state_blob)? else {
        return not_found();
    };

    match state.state {
        PaymeTxState::CancelledFromCreated | PaymeTxState::CancelledFromPerformed => {
            debug!(session_id = %session.id, "Replaying Payme cancel");
            Ok(Outcome::Reply(Ok(CancelResult {
                transaction: session.id.clone(),
                cancel_time: state.cancel_time,
                state: state.state,
            })))
        }
        PaymeTxState::Performed if !allow_refund => {
            Ok(Outcome::Reply(Err(PaymeError::could_not_cancel())))
        }
        PaymeTxState::Created | PaymeTxState::Performed => {
            let mut state_blob = session.state_blob.clone();
            state.cancel(now, reason, &mut state_blob)?;
            Ok(Outcome::Write {
                state_blob,
                reply: Ok(CancelResult {
                    transaction: session.id.clone(),
                    cancel_time: now,
                    state: state.state,
                }),
                effect: None,
            })
        }
        PaymeTxState::None => not_found(),
    }
}
