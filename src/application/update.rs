use crate::domain::ports::{SessionStoreRef, SuccessEvent};
use crate::domain::session::{PaymentSession, StateBlob};
use crate::error::{PaymentError, Result};
use std::fmt;
use tracing::{debug, warn};

/// How a callback locates its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKey {
    Id(String),
    Correlation(String),
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Id(id) => write!(f, "id={}", id),
            SessionKey::Correlation(id) => write!(f, "correlation_id={}", id),
        }
    }
}

/// What a protocol step decided after looking at the current session.
pub enum Outcome<R> {
    /// Answer without writing anything.
    Reply(R),
    /// Persist `state_blob`, then answer with `reply`. `effect` fires only if
    /// this write wins.
    Write {
        state_blob: StateBlob,
        reply: R,
        effect: Option<SuccessEvent>,
    },
}

/// Result of a committed (or read-only) protocol step.
#[derive(Debug)]
pub struct Applied<R> {
    pub reply: R,
    pub effect: Option<SuccessEvent>,
}

/// Runs read-decide-write cycles against the session store.
///
/// Each cycle reads the session, lets the caller decide, and writes with the
/// version it read. Losing a race re-runs the whole decision on fresh state,
/// so a concurrent duplicate sees the winner's write and takes its
/// idempotent-replay branch instead of transitioning twice.
pub struct SessionUpdater {
    store: SessionStoreRef,
    max_attempts: u32,
}

impl SessionUpdater {
    pub fn new(store: SessionStoreRef, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn load(&self, key: &SessionKey) -> Result<Option<PaymentSession>> {
        match key {
            SessionKey::Id(id) => self.store.get(id).await,
            SessionKey::Correlation(id) => self.store.find_by_correlation_id(id).await,
        }
    }

    pub async fn run<R, F>(&self, key: &SessionKey, mut decide: F) -> Result<Applied<R>>
    where
        F: FnMut(Option<&PaymentSession>) -> Result<Outcome<R>>,
    {
        for attempt in 1..=self.max_attempts {
            let session = self.load(key).await?;
            match decide(session.as_ref())? {
                Outcome::Reply(reply) => return Ok(Applied { reply, effect: None }),
                Outcome::Write {
                    state_blob,
                    reply,
                    effect,
                } => {
                    let session =
                        session.ok_or_else(|| PaymentError::SessionNotFound(key.to_string()))?;
                    match self
                        .store
                        .replace_state(&session.id, session.version, state_blob)
                        .await
                    {
                        Ok(_) => return Ok(Applied { reply, effect }),
                        Err(PaymentError::VersionConflict(id)) => {
                            debug!(session_id = %id, attempt, "Lost update race, re-evaluating");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        warn!(%key, attempts = self.max_attempts, "Giving up after repeated update conflicts");
        Err(PaymentError::VersionConflict(key.to_string()))
    }
}
