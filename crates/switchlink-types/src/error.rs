//! The SDK error taxonomy.
//!
//! Every fallible SDK call reports failures through [`SdkError`]. Which of
//! the two shapes a given context produces is fixed once at construction
//! time ([`ErrorStyle`]): simple mode carries a message string only, while
//! advanced mode exposes the full [`ErrorKind`] taxonomy plus the module
//! and API that raised the error. Routine operational misses ("route not
//! found") are reported through `Ok(None)`/`false` returns instead, so an
//! `Err` always means the caller did something the contract forbids or the
//! session itself is unusable.

use crate::Severity;
use thiserror::Error;

/// Result type alias for SDK operations.
pub type SdkResult<T> = Result<T, SdkError>;

/// The fixed error code taxonomy. Not extensible by applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No error.
    Success,
    /// API used outside its documented contract.
    InvalidUsage,
    /// A parameter value is not valid for this call.
    InvalidArg,
    /// A required argument was absent.
    NullPtr,
    /// Does not exist.
    NotFound,
    /// Already exists.
    Exists,
    /// Empty case.
    Empty,
    /// A documented bound was exceeded.
    MaxLimit,
    /// Generic failure.
    Failure,
    /// Success, but more data remains.
    SuccessMore,
    /// Interrupted by a signal.
    Sigint,
    /// Out of memory.
    NoMem,
    /// Bad descriptor.
    BadFd,
    /// Unknown error.
    Unknown,
    /// Operation attempted while the remote session is down.
    RemoteDown,
    /// Object obtained before a remote reconnect was reused without a purge.
    StaleRemoteObjs,
}

impl ErrorKind {
    /// Stable numeric code, matching the wire enumeration order.
    pub fn code(&self) -> u32 {
        match self {
            ErrorKind::Success => 0,
            ErrorKind::InvalidUsage => 1,
            ErrorKind::InvalidArg => 2,
            ErrorKind::NullPtr => 3,
            ErrorKind::NotFound => 4,
            ErrorKind::Exists => 5,
            ErrorKind::Empty => 6,
            ErrorKind::MaxLimit => 7,
            ErrorKind::Failure => 8,
            ErrorKind::SuccessMore => 9,
            ErrorKind::Sigint => 10,
            ErrorKind::NoMem => 11,
            ErrorKind::BadFd => 12,
            ErrorKind::Unknown => 13,
            ErrorKind::RemoteDown => 14,
            ErrorKind::StaleRemoteObjs => 15,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Success => "success",
            ErrorKind::InvalidUsage => "invalid-usage",
            ErrorKind::InvalidArg => "invalid-argument",
            ErrorKind::NullPtr => "null-pointer",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Exists => "already-exists",
            ErrorKind::Empty => "empty",
            ErrorKind::MaxLimit => "max-limit-reached",
            ErrorKind::Failure => "failure",
            ErrorKind::SuccessMore => "success-more-data",
            ErrorKind::Sigint => "interrupted",
            ErrorKind::NoMem => "no-memory",
            ErrorKind::BadFd => "bad-fd",
            ErrorKind::Unknown => "unknown",
            ErrorKind::RemoteDown => "remote-session-down",
            ErrorKind::StaleRemoteObjs => "stale-remote-objects",
        }
    }
}

/// Error reporting mode, chosen once per SDK context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStyle {
    /// Message-only errors.
    Simple,
    /// Structured errors carrying kind, module, API and severity.
    Advanced,
}

/// Errors raised by SDK operations.
#[derive(Debug, Clone, Error)]
pub enum SdkError {
    /// Simple-mode error: a message and nothing else.
    #[error("{0}")]
    Simple(String),

    /// Advanced-mode error carrying the full taxonomy.
    #[error("{module}::{api}: {message} ({})", kind.as_str())]
    Detailed {
        /// Error code from the fixed taxonomy.
        kind: ErrorKind,
        /// Manager or subsystem that raised the error.
        module: &'static str,
        /// API name within the module.
        api: &'static str,
        /// Severity of the failure.
        severity: Severity,
        /// Human-readable reason.
        message: String,
    },
}

impl SdkError {
    /// Builds an error in the given style. Simple mode keeps only the
    /// message; advanced mode keeps everything.
    pub fn raise(
        style: ErrorStyle,
        kind: ErrorKind,
        module: &'static str,
        api: &'static str,
        message: impl Into<String>,
    ) -> Self {
        match style {
            ErrorStyle::Simple => SdkError::Simple(message.into()),
            ErrorStyle::Advanced => SdkError::Detailed {
                kind,
                module,
                api,
                severity: Severity::Error,
                message: message.into(),
            },
        }
    }

    /// Error code, if this error carries one. Simple-mode errors do not.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SdkError::Simple(_) => None,
            SdkError::Detailed { kind, .. } => Some(*kind),
        }
    }

    pub fn module(&self) -> Option<&'static str> {
        match self {
            SdkError::Simple(_) => None,
            SdkError::Detailed { module, .. } => Some(module),
        }
    }

    pub fn api(&self) -> Option<&'static str> {
        match self {
            SdkError::Simple(_) => None,
            SdkError::Detailed { api, .. } => Some(api),
        }
    }

    pub fn severity(&self) -> Option<Severity> {
        match self {
            SdkError::Simple(_) => None,
            SdkError::Detailed { severity, .. } => Some(*severity),
        }
    }

    /// Error reason string, in either mode.
    pub fn message(&self) -> &str {
        match self {
            SdkError::Simple(msg) => msg,
            SdkError::Detailed { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_mode_keeps_message_only() {
        let err = SdkError::raise(
            ErrorStyle::Simple,
            ErrorKind::InvalidArg,
            "rib",
            "get_l3_route",
            "bad mask length",
        );
        assert_eq!(err.kind(), None);
        assert_eq!(err.module(), None);
        assert_eq!(err.to_string(), "bad mask length");
    }

    #[test]
    fn test_advanced_mode_exposes_taxonomy() {
        let err = SdkError::raise(
            ErrorStyle::Advanced,
            ErrorKind::MaxLimit,
            "rib",
            "get_l3_route",
            "more than 10 uncollected route objects",
        );
        assert_eq!(err.kind(), Some(ErrorKind::MaxLimit));
        assert_eq!(err.module(), Some("rib"));
        assert_eq!(err.api(), Some("get_l3_route"));
        assert_eq!(err.severity(), Some(Severity::Error));
        assert!(err.to_string().contains("max-limit-reached"));
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(ErrorKind::Success.code(), 0);
        assert_eq!(ErrorKind::InvalidUsage.code(), 1);
        assert_eq!(ErrorKind::MaxLimit.code(), 7);
        assert_eq!(ErrorKind::StaleRemoteObjs.code(), 15);
    }
}
