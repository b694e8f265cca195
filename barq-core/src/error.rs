//! Domain error kinds for the invocation engine
//!
//! One variant per error kind in the invocation engine's error table. Each
//! carries its own propagation rule; most are recovered or logged inside the
//! engine and never escape to an HTTP response (see `http_status`).

use serde::Serialize;
use thiserror::Error;

/// Error kinds produced anywhere in the invocation path.
#[derive(Debug, Error)]
pub enum BarqError {
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("function already exists: {0}")]
    FunctionAlreadyExists(String),

    #[error("unsupported runtime: {0}")]
    RuntimeUnsupported(String),

    #[error("invalid entrypoint: {0}")]
    InvalidHandler(String),

    #[error("warm dispatch failed: {0}")]
    WarmDispatchFailure(String),

    #[error("cold execution failed: {0}")]
    ColdExecFailure(String),

    #[error("warm-up failed: {0}")]
    WarmupFailure(String),

    #[error("telemetry sink failed: {0}")]
    TelemetrySinkFailure(String),

    #[error("pool at capacity with no idle container to evict: {0}")]
    PoolCapacityPressure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BarqError {
    /// HTTP status for the kinds that are ever surfaced to an API caller.
    ///
    /// Only `FunctionNotFound`, `FunctionAlreadyExists`, `RuntimeUnsupported`
    /// and `InvalidHandler` produce a non-2xx outer response; everything
    /// else is recovered internally (warm fallback, swallowed warm-up,
    /// logged telemetry failure) or reported inside a `success: false` body.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::FunctionNotFound(_) => 404,
            Self::FunctionAlreadyExists(_) => 409,
            Self::RuntimeUnsupported(_) | Self::InvalidHandler(_) => 400,
            Self::Io(_)
            | Self::WarmDispatchFailure(_)
            | Self::ColdExecFailure(_)
            | Self::WarmupFailure(_)
            | Self::TelemetrySinkFailure(_)
            | Self::PoolCapacityPressure(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::FunctionNotFound(_) => "FunctionNotFound",
            Self::FunctionAlreadyExists(_) => "FunctionAlreadyExists",
            Self::RuntimeUnsupported(_) => "RuntimeUnsupported",
            Self::InvalidHandler(_) => "InvalidHandler",
            Self::WarmDispatchFailure(_) => "WarmDispatchFailure",
            Self::ColdExecFailure(_) => "ColdExecFailure",
            Self::WarmupFailure(_) => "WarmupFailure",
            Self::TelemetrySinkFailure(_) => "TelemetrySinkFailure",
            Self::PoolCapacityPressure(_) => "PoolCapacityPressure",
            Self::Io(_) => "IoError",
        }
    }

    /// `success=false` structured JSON body for an error response.
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            success: bool,
            error: &'a str,
            code: &'a str,
        }

        let body = ErrorBody {
            success: false,
            error: &self.to_string(),
            code: self.code(),
        };

        serde_json::to_string(&body)
            .unwrap_or_else(|_| format!(r#"{{"success":false,"error":"{}"}}"#, self.code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_404() {
        let err = BarqError::FunctionNotFound("f1".to_string());
        assert_eq!(err.http_status(), 404);
        assert!(err.to_json().contains("\"success\":false"));
    }

    #[test]
    fn warm_dispatch_failure_is_internal() {
        let err = BarqError::WarmDispatchFailure("timeout".to_string());
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn code_round_trips_into_json_body() {
        let err = BarqError::RuntimeUnsupported("ruby3.2".to_string());
        assert!(err.to_json().contains("RuntimeUnsupported"));
    }
}
