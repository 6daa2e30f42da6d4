//! Splat API Error Types
//!
//! Structured error handling for Splat API operations and the mirror step.
//! Every failure the resolver can hit is one of these variants, so callers
//! render a notice instead of propagating a fault.

/// Splat API error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP Error: {0}")]
    HttpStatus(u16),

    #[error("JSON Error: {0}")]
    Parse(String),

    #[error("{0}")]
    Validation(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Mirror failed: {0}")]
    Mirror(String),

    /// The API answered with `success: false`
    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    /// Message used when the API returns no usable `responseObject`
    pub const EMPTY_RESPONSE: &'static str = "Invalid response format or empty data";

    /// Error for a missing, zero or non-numeric asset ID
    pub fn invalid_id() -> Self {
        ApiError::Validation("No valid Splat ID provided.".to_string())
    }

    /// Error for a response that parsed but carried no usable data
    pub fn empty_response() -> Self {
        ApiError::Validation(Self::EMPTY_RESPONSE.to_string())
    }

    /// Whether a later attempt could succeed without changing the request
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::HttpStatus(status) => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ApiError::Parse(err.to_string());
        }
        if let Some(status) = err.status() {
            return ApiError::HttpStatus(status.as_u16());
        }
        ApiError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_message() {
        assert_eq!(ApiError::HttpStatus(404).to_string(), "HTTP Error: 404");
    }

    #[test]
    fn test_empty_response_message() {
        assert_eq!(
            ApiError::empty_response().to_string(),
            "Invalid response format or empty data"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Transport("dns".into()).is_transient());
        assert!(ApiError::HttpStatus(503).is_transient());
        assert!(ApiError::HttpStatus(429).is_transient());
        assert!(!ApiError::HttpStatus(404).is_transient());
        assert!(!ApiError::invalid_id().is_transient());
    }

    #[test]
    fn test_json_error_maps_to_parse() {
        let err: ApiError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, ApiError::Parse(_)));
    }
}
