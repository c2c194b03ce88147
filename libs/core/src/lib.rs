//! Core of `send-mq-message`: configuration, correlation ids, the request/reply exchange client
//! and the batch dispatcher that feeds it from CLI arguments or a resource directory.
//!
//! The queue transport itself lives in `smq-bus`; this crate only depends on its traits, so the
//! whole pipeline runs unchanged against the in-memory broker in tests.
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod log;
pub mod source;

pub use config::*;
pub use correlation::*;
pub use dispatch::*;
pub use error::*;
pub use exchange::*;
pub use log::*;
pub use source::*;

/// Returns the semantic version advertised by this crate.
///
/// ```
/// assert_eq!(smq_core::version(), "0.1.0");
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
