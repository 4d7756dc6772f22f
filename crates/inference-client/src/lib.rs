//! `inference-client` — HTTP clients for the two external model services
//! the detection pipeline depends on.
//!
//! ```text
//! AnalyzerClient  ← POST {analyzer_url}/v1/analyze     (layout analysis)
//! DetectorClient  ← POST {endpoint_url}/invocations    (room detection)
//! ```
//!
//! Both clients translate transport failures and 429/5xx responses into
//! retryable errors; the pipeline wraps calls in the core backoff policy.

pub mod analyzer;
pub mod detector;
pub mod error;
pub mod types;

pub use analyzer::AnalyzerClient;
pub use detector::DetectorClient;
pub use error::ClientError;
pub use types::{DetectResponse, ModelInput};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClientError>;
