//! Message routing: access policy, built-in commands, trigger dispatch,
//! and the reasoning-engine fallback, behind a transport trait.

pub mod router;
pub mod transport;

pub use {
    router::{MessageRouter, RouterConfig},
    transport::{MessageId, ThreadMessage, Transport},
};
