pub mod backend;
pub mod dispatcher;
pub mod model;
pub mod repository;
pub mod response;
pub mod rules;
pub mod viator;
pub mod xml;

/// Stable error taxonomy returned to the distribution partner. These codes
/// are part of the wire contract and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Required-field validation failure
    MalformedElements,
    /// API key / host lookup failure
    InvalidApiKey,
    /// Login to the reservation engine failed
    BackendAuthFailed,
    /// Empty or absent backend result set
    NothingReturned,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::MalformedElements => "VRONERR001",
            ErrorCode::InvalidApiKey => "VRONERR002",
            ErrorCode::BackendAuthFailed => "VRONERR003",
            ErrorCode::NothingReturned => "VRONERR004",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::MalformedElements => "Malformed or missing elements",
            ErrorCode::InvalidApiKey => "Invalid API Key",
            ErrorCode::BackendAuthFailed => "Backend authentication failed",
            ErrorCode::NothingReturned => "Nothing returned",
        }
    }
}
