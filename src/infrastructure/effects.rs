use crate::domain::ports::{ClockRef, PostSuccessEffects, SessionStoreRef, SuccessEvent};
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Local stand-in for the checkout completion pipeline.
///
/// Marks the session completed and logs the fiscal receipt that the real
/// pipeline would submit.
pub struct CheckoutCompletion {
    store: SessionStoreRef,
    clock: ClockRef,
}

impl CheckoutCompletion {
    pub fn new(store: SessionStoreRef, clock: ClockRef) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl PostSuccessEffects for CheckoutCompletion {
    async fn on_success(&self, event: &SuccessEvent) -> Result<()> {
        self.store
            .mark_completed(&event.session_id, self.clock.now())
            .await?;
        info!(
            gateway = %event.gateway,
            session_id = %event.session_id,
            correlation_id = %event.correlation_id,
            provider_doc_id = ?event.provider_doc_id,
            amount = %event.amount.to_major(),
            "Order completed, fiscal receipt queued"
        );
        Ok(())
    }
}
