//! Relay Core Library
//!
//! An OpenAI Chat Completions compatible gateway core. Each request is
//! resolved to one of several template-driven upstream providers, translated
//! into the provider's wire format, and the answer (single or streamed) is
//! translated back into OpenAI completions or SSE chunks.
//!
//! ```no_run
//! use relay_core::config::load_from_yaml;
//! use relay_core::gateway::Gateway;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = load_from_yaml("relay.yaml")?;
//! let gateway = Gateway::from_config(&settings)?;
//! println!("providers: {:?}", gateway.registry().names());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod gateway;
pub mod http;
pub mod protocol;
pub mod providers;

pub use gateway::{ChatOutcome, Gateway};
pub use providers::{GatewayError, GatewayResult};

/// Returns the version of the Relay Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
