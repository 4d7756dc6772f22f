use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {service} failed: {source}")]
    Http {
        service: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} is unavailable (status {status})")]
    Unavailable {
        service: String,
        status: u16,
        retry_after: Option<u64>,
    },

    #[error("{service} rejected the request (status {status}): {message}")]
    Rejected {
        service: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode {service} response: {source}")]
    Decode {
        service: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    /// Transport failures and 429/5xx responses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Http { source, .. } => source.is_timeout() || source.is_connect(),
            _ => false,
        }
    }
}

impl From<ClientError> for locdet_core::DetectError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unavailable {
                service,
                retry_after,
                ..
            } => locdet_core::DetectError::ServiceUnavailable {
                service,
                retry_after,
            },
            ClientError::Http { service, source } if source.is_timeout() || source.is_connect() => {
                locdet_core::DetectError::ServiceUnavailable {
                    service,
                    retry_after: None,
                }
            }
            other => locdet_core::DetectError::Inference(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
