use thiserror::Error;

/// Type alias for Result with OutreachError
pub type Result<T> = std::result::Result<T, OutreachError>;

/// Error types for the speaker outreach pipeline
#[derive(Error, Debug)]
pub enum OutreachError {
    /// AI provider quota or rate limit hit (HTTP 429 and friends)
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// AI provider returned a non-success status that is not a quota error
    #[error("AI API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Connection problems, timeouts, TLS failures
    #[error("Network error: {0}")]
    NetworkError(String),

    /// No AI client is configured for this run
    #[error("AI client disabled")]
    AiDisabled,

    /// AI reply could not be parsed into the expected shape
    #[error("Invalid AI response: {0}")]
    InvalidResponse(String),

    /// Retryable failures kept happening until the attempt budget ran out
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<OutreachError>,
    },

    /// Run was cancelled (Ctrl-C or deadline)
    #[error("Operation cancelled")]
    Cancelled,

    /// Speaker record failed field validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Speaker page could not be fetched or parsed
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl OutreachError {
    /// Check if the error should be retried with backoff.
    ///
    /// Only quota/rate-limit errors qualify. Server faults, network errors and
    /// malformed responses propagate immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OutreachError::QuotaExceeded(_))
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// True for errors raised at the AI boundary or by the retry wrapper.
    /// These are absorbed by the categorizer and generator fallbacks.
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            OutreachError::QuotaExceeded(_)
                | OutreachError::ApiError { .. }
                | OutreachError::NetworkError(_)
                | OutreachError::AiDisabled
                | OutreachError::InvalidResponse(_)
                | OutreachError::RetriesExhausted { .. }
                | OutreachError::Cancelled
        )
    }
}

impl From<reqwest::Error> for OutreachError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            let status_code = status.as_u16();
            if status_code == 429 {
                return OutreachError::QuotaExceeded(error.to_string());
            }
            return OutreachError::ApiError {
                status: status_code,
                message: error.to_string(),
            };
        }
        if error.is_decode() {
            return OutreachError::InvalidResponse(error.to_string());
        }
        OutreachError::NetworkError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let quota = OutreachError::QuotaExceeded("429 Too Many Requests".to_string());
        assert!(quota.is_retryable());
        assert!(!quota.is_permanent());
    }

    #[test]
    fn test_permanent_errors() {
        let server_error = OutreachError::ApiError {
            status: 500,
            message: "Internal Server Error".to_string(),
        };
        assert!(server_error.is_permanent());

        let network_error = OutreachError::NetworkError("Connection reset".to_string());
        assert!(network_error.is_permanent());

        let invalid = OutreachError::InvalidResponse("Unknown".to_string());
        assert!(invalid.is_permanent());

        // Exhaustion is terminal; the wrapper never retries it again
        let exhausted = OutreachError::RetriesExhausted {
            operation: "classify".to_string(),
            attempts: 3,
            source: Box::new(OutreachError::QuotaExceeded("quota".to_string())),
        };
        assert!(exhausted.is_permanent());
    }

    #[test]
    fn test_api_error_grouping() {
        assert!(OutreachError::AiDisabled.is_api_error());
        assert!(OutreachError::Cancelled.is_api_error());
        assert!(!OutreachError::ConfigError("bad".to_string()).is_api_error());
        assert!(!OutreachError::ValidationError("short".to_string()).is_api_error());
    }

    #[test]
    fn test_error_display() {
        let error = OutreachError::ApiError {
            status: 503,
            message: "Service unavailable".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("HTTP 503"));
        assert!(display.contains("Service unavailable"));

        let exhausted = OutreachError::RetriesExhausted {
            operation: "generate_email".to_string(),
            attempts: 3,
            source: Box::new(OutreachError::QuotaExceeded("daily limit".to_string())),
        };
        let display = format!("{}", exhausted);
        assert!(display.contains("generate_email failed after 3 attempts"));
        assert!(display.contains("daily limit"));
    }
}
