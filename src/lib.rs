//! Anthropic Messages <-> `OpenAI` Chat Completions conversion engine.
//!
//! Requests are translated one-shot; responses (plain JSON or buffered SSE)
//! are decoded, folded into one logical message and re-emitted in the
//! Anthropic response or event-stream shape.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod repair;
pub mod stream;

pub(crate) mod json_scan;
mod util;

pub use engine::{should_convert, ConversionContext, Converter, EndpointInfo};
pub use error::ConversionError;
