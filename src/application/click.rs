use crate::application::effects::EffectsDispatcher;
use crate::application::update::{Outcome, SessionKey, SessionUpdater};
use crate::config::{ClickConfig, EngineConfig};
use crate::domain::click_state::{ClickSessionState, ClickStatus};
use crate::domain::normalize::NormalizedFields;
use crate::domain::ports::{EffectsRef, Gateway, SessionStoreRef, SuccessEvent, VerifierRef};
use crate::domain::session::{MinorUnits, PaymentSession};
use crate::error::Result;
use crate::interfaces::click::{
    CLICK_CANCELLED, CLICK_SUCCESS, ClickErrorCode, ClickPhase, ClickRequest, ClickResponse,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Merchant side of Click's Prepare/Complete handshake.
///
/// Every call produces a [`ClickResponse`]; store failures and other internal
/// errors are reported to Click as `-7` rather than surfaced to the caller.
pub struct ClickProtocol {
    config: ClickConfig,
    updater: SessionUpdater,
    verifier: VerifierRef,
    effects: EffectsDispatcher,
}

impl ClickProtocol {
    pub fn new(
        config: ClickConfig,
        store: SessionStoreRef,
        verifier: VerifierRef,
        effects: EffectsRef,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            config,
            updater: SessionUpdater::new(store, engine.max_update_attempts),
            verifier,
            effects: EffectsDispatcher::new(effects, engine.effects_timeout),
        }
    }

    pub async fn handle(&self, phase: ClickPhase, fields: &NormalizedFields) -> ClickResponse {
        match phase {
            ClickPhase::Prepare => self.prepare(fields).await,
            ClickPhase::Complete => self.complete(fields).await,
        }
    }

    /// Handles a JSON body; anything but an object is a malformed request.
    pub async fn handle_json(&self, phase: ClickPhase, body: &Value) -> ClickResponse {
        let fields = match body {
            Value::Object(object) => NormalizedFields::from_json(object),
            _ => NormalizedFields::default(),
        };
        self.handle(phase, &fields).await
    }

    /// Handles an `application/x-www-form-urlencoded` body.
    pub async fn handle_form(&self, phase: ClickPhase, body: &str) -> ClickResponse {
        self.handle(phase, &NormalizedFields::from_form(body)).await
    }

    pub async fn prepare(&self, fields: &NormalizedFields) -> ClickResponse {
        let echo = ClickResponse::echo(ClickPhase::Prepare, fields);
        let (request, amount) = match self.validate(ClickPhase::Prepare, fields) {
            Ok(validated) => validated,
            Err(code) => return echo.with_code(code),
        };

        let key = SessionKey::Correlation(request.merchant_trans_id.clone());
        let applied = self
            .updater
            .run(&key, |session| decide_prepare(&request, amount, session, &echo))
            .await;

        match applied {
            Ok(applied) => {
                info!(
                    click_trans_id = %request.click_trans_id,
                    merchant_trans_id = %request.merchant_trans_id,
                    error = applied.reply.error,
                    "Click prepare handled"
                );
                applied.reply
            }
            Err(e) => {
                error!(
                    click_trans_id = %request.click_trans_id,
                    error = %e,
                    "Click prepare failed"
                );
                echo.with_code(ClickErrorCode::UpdateFailed)
            }
        }
    }

    pub async fn complete(&self, fields: &NormalizedFields) -> ClickResponse {
        let echo = ClickResponse::echo(ClickPhase::Complete, fields);
        let (request, amount) = match self.validate(ClickPhase::Complete, fields) {
            Ok(validated) => validated,
            Err(code) => return echo.with_code(code),
        };

        let key = SessionKey::Correlation(request.merchant_trans_id.clone());
        let applied = self
            .updater
            .run(&key, |session| decide_complete(&request, amount, session, &echo))
            .await;

        match applied {
            Ok(applied) => {
                info!(
                    click_trans_id = %request.click_trans_id,
                    merchant_trans_id = %request.merchant_trans_id,
                    error = applied.reply.error,
                    "Click complete handled"
                );
                if let Some(event) = &applied.effect {
                    self.effects.dispatch(event).await;
                }
                applied.reply
            }
            Err(e) => {
                error!(
                    click_trans_id = %request.click_trans_id,
                    error = %e,
                    "Click complete failed"
                );
                echo.with_code(ClickErrorCode::UpdateFailed)
            }
        }
    }

    /// Checks that run before any session is read: required fields, service
    /// id, signature, action code and amount syntax.
    ///
    /// The amount is `None` when it is a valid decimal that cannot be
    /// expressed in whole minor units; such an amount never reconciles.
    fn validate(
        &self,
        phase: ClickPhase,
        fields: &NormalizedFields,
    ) -> std::result::Result<(ClickRequest, Option<MinorUnits>), ClickErrorCode> {
        let request = ClickRequest::parse(phase, fields)?;

        if let Some(expected) = &self.config.service_id
            && request.service_id != *expected
        {
            warn!(
                service_id = %request.service_id,
                "Click request for a foreign service id"
            );
            return Err(ClickErrorCode::BadRequest);
        }

        let parts = request.signed_parts(&self.config.secret_key);
        if !self.verifier.verify(&parts, &request.sign_string) {
            warn!(
                click_trans_id = %request.click_trans_id,
                merchant_trans_id = %request.merchant_trans_id,
                "Click signature check failed"
            );
            return Err(ClickErrorCode::SignCheckFailed);
        }

        if request.action != phase.action() {
            return Err(ClickErrorCode::ActionNotFound);
        }

        let amount = Decimal::from_str(&request.amount).map_err(|_| ClickErrorCode::BadRequest)?;
        Ok((request, MinorUnits::from_major(amount)))
    }
}

fn decide_prepare(
    request: &ClickRequest,
    amount: Option<MinorUnits>,
    session: Option<&PaymentSession>,
    echo: &ClickResponse,
) -> Result<Outcome<ClickResponse>> {
    let reply = |code: ClickErrorCode| Ok(Outcome::Reply(echo.clone().with_code(code)));

    let Some(session) = session else {
        return reply(ClickErrorCode::UserNotFound);
    };
    if session.is_completed() {
        return reply(ClickErrorCode::AlreadyPaid);
    }
    if amount != Some(session.amount) {
        return reply(ClickErrorCode::IncorrectAmount);
    }

    if let Some(current) = ClickSessionState::load(&session.state_blob)? {
        let same_transaction = current.click_trans_id == request.click_trans_id;
        match current.state {
            ClickStatus::Completed => return reply(ClickErrorCode::AlreadyPaid),
            ClickStatus::Prepared if same_transaction => {
                debug!(session_id = %session.id, "Replaying Click prepare");
                return Ok(Outcome::Reply(
                    echo.clone().with_merchant_id(&current.prepare_id),
                ));
            }
            ClickStatus::Cancelled if same_transaction => {
                return reply(ClickErrorCode::TransactionCancelled);
            }
            _ => {}
        }
    }

    let state = ClickSessionState::prepared(
        &request.click_trans_id,
        &request.click_paydoc_id,
        &request.sign_time,
    );
    let mut state_blob = session.state_blob.clone();
    state.save(&mut state_blob)?;

    Ok(Outcome::Write {
        state_blob,
        reply: echo.clone().with_merchant_id(&state.prepare_id),
        effect: None,
    })
}

fn decide_complete(
    request: &ClickRequest,
    amount: Option<MinorUnits>,
    session: Option<&PaymentSession>,
    echo: &ClickResponse,
) -> Result<Outcome<ClickResponse>> {
    let reply = |code: ClickErrorCode| Ok(Outcome::Reply(echo.clone().with_code(code)));

    let Some(session) = session else {
        return reply(ClickErrorCode::UserNotFound);
    };
    if amount != Some(session.amount) {
        return reply(ClickErrorCode::IncorrectAmount);
    }

    let Some(mut state) = ClickSessionState::load(&session.state_blob)? else {
        return reply(ClickErrorCode::TransactionNotFound);
    };
    if request.merchant_prepare_id.as_deref() != Some(state.prepare_id.as_str())
        || request.click_trans_id != state.click_trans_id
    {
        return reply(ClickErrorCode::TransactionNotFound);
    }

    if state.state == ClickStatus::Completed {
        if request.error == CLICK_SUCCESS && state.is_completed_cleanly() {
            debug!(session_id = %session.id, "Replaying Click complete");
            return Ok(Outcome::Reply(
                echo.clone().with_merchant_id(&state.prepare_id),
            ));
        }
        return reply(ClickErrorCode::AlreadyPaid);
    }
    if session.is_completed() {
        return reply(ClickErrorCode::AlreadyPaid);
    }

    let (status, note) = match request.error {
        CLICK_SUCCESS => (
            ClickStatus::Completed,
            ClickErrorCode::Success.note().to_owned(),
        ),
        CLICK_CANCELLED => (
            ClickStatus::Cancelled,
            request
                .error_note
                .clone()
                .unwrap_or_else(|| ClickErrorCode::TransactionCancelled.note().to_owned()),
        ),
        other => (
            ClickStatus::Error,
            request
                .error_note
                .clone()
                .unwrap_or_else(|| format!("Click reported error {}", other)),
        ),
    };

    state.conclude(status, request.error, request.error_note.clone());
    let mut state_blob = session.state_blob.clone();
    state.save(&mut state_blob)?;

    let effect = (status == ClickStatus::Completed).then(|| SuccessEvent {
        gateway: Gateway::Click,
        session_id: session.id.clone(),
        correlation_id: session.correlation_id.clone(),
        provider_doc_id: Some(state.click_paydoc_id.clone()),
        amount: session.amount,
    });

    Ok(Outcome::Write {
        state_blob,
        reply: echo
            .clone()
            .with_error(request.error, note)
            .with_merchant_id(&state.prepare_id),
        effect,
    })
}
