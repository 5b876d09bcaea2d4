//! Client for the e-signature provider's signed HTTP API
pub mod client;
pub mod transport;
pub mod types;

pub use client::{ProviderClient, RETRYABLE_CODES, is_retryable, parse_response};
pub use transport::{HttpTransport, Transport};
pub use types::{FlowTemplate, FormField};
