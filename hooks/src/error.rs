use payloads::Envelope;

/// Message used when a failed envelope carries no error text.
pub const DEFAULT_FAILURE_MESSAGE: &str = "API request failed";

/// Why a fetch failed.
///
/// Every variant displays as the bare message, which is what ends up in
/// [`crate::RequestState::error`]; the variant itself is kept for
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The producer answered with `success: false`.
    #[error("{0}")]
    Business(String),
    /// The producer failed without answering (connectivity, decoding, a
    /// panic inside the producer).
    #[error("{0}")]
    Unexpected(String),
    /// The producer answered `success: true` without data.
    #[error("{0}")]
    Malformed(String),
    /// The post-fetch transform rejected the data.
    #[error("{0}")]
    Transform(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Business(_) => "business_failure",
            FetchError::Unexpected(_) => "unexpected_fault",
            FetchError::Malformed(_) => "malformed_envelope",
            FetchError::Transform(_) => "transform_failure",
        }
    }

    /// Business failures are expected answers; everything else is a fault.
    pub fn is_unexpected(&self) -> bool {
        !matches!(self, FetchError::Business(_))
    }

    /// Open an envelope, classifying anything but `success` with data.
    pub fn check<T>(envelope: Envelope<T>) -> Result<T, FetchError> {
        match envelope {
            Envelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            Envelope {
                success: true,
                data: None,
                ..
            } => Err(FetchError::Malformed(
                "successful response carried no data".to_string(),
            )),
            Envelope {
                success: false,
                error,
                ..
            } => Err(FetchError::Business(
                error.unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            )),
        }
    }
}

/// How an awaited fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result was published to state.
    Success,
    /// The failure was published to state.
    Failed(FetchError),
    /// A newer request (or disposal) took over; nothing was published.
    Superseded,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh interval must be greater than zero")]
    ZeroInterval,
}
