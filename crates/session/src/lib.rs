//! Reasoning-engine sessions.
//!
//! Each conversation maps to a resumable engine session. The store keeps
//! the resume tokens and serializes turns per conversation; the engine
//! module drives one subprocess turn and parses its stream-JSON output.

pub mod engine;
pub mod store;

pub use {
    engine::{EngineError, EngineReply, EngineSession, Progress, ProgressFn},
    store::SessionStore,
};
