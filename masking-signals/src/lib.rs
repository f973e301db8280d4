//! Contract with the external signal generation / mixing service, an HTTP
//! implementation of it, and a retrying wrapper.

pub mod error;
pub mod http;
pub mod retry;
pub mod service;

pub use error::SignalError;
pub use http::HttpSignalService;
pub use retry::{RetryPolicy, RetryingSignalService};
pub use service::{AudioPayload, GeneratedSignals, GenerationRequest, SignalService};
