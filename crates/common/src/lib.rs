//! Types shared across the huddle crates.

pub mod types;

pub use types::ChatMessage;
