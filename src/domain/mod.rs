//! Domain types shared by both gateway protocols: the checkout session, its
//! open state blob, the typed per-gateway states decoded from that blob, and
//! the ports the protocols depend on.

pub mod click_state;
pub mod normalize;
pub mod payme_state;
pub mod ports;
pub mod session;
