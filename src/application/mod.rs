//! Application layer containing the gateway callback engines.
//!
//! `ClickProtocol` and `PaymeProtocol` turn validated gateway requests into
//! session state transitions. Both write through `SessionUpdater`, which
//! re-evaluates a decision whenever a concurrent callback wins the race for
//! the same session.

pub mod click;
pub mod effects;
pub mod payme;
pub mod update;
