use crate::domain::ports::{EffectsRef, SuccessEvent};
use std::time::Duration;
use tracing::{error, info, warn};

/// Runs post-success effects with a time bound.
///
/// Failures and timeouts are logged and swallowed: by the time an effect runs
/// the gateway has already been promised a success response.
pub struct EffectsDispatcher {
    effects: EffectsRef,
    timeout: Duration,
}

impl EffectsDispatcher {
    pub fn new(effects: EffectsRef, timeout: Duration) -> Self {
        Self { effects, timeout }
    }

    /// Returns whether the effect completed successfully in time.
    pub async fn dispatch(&self, event: &SuccessEvent) -> bool {
        match tokio::time::timeout(self.timeout, self.effects.on_success(event)).await {
            Ok(Ok(())) => {
                info!(
                    gateway = %event.gateway,
                    session_id = %event.session_id,
                    "Post-success effects completed"
                );
                true
            }
            Ok(Err(e)) => {
                error!(
                    gateway = %event.gateway,
                    session_id = %event.session_id,
                    error = %e,
                    "Post-success effects failed"
                );
                false
            }
            Err(_) => {
                warn!(
                    gateway = %event.gateway,
                    session_id = %event.session_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Post-success effects timed out"
                );
                false
            }
        }
    }
}
