use thiserror::Error;

/// Errors raised while translating a NetworkPolicy.
///
/// Port-level errors (`UnknownPortType`, `UnknownProtocol`) are handled locally by the rule
/// assembler: the port is logged and skipped. The others abort the policy translation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unknown port type: {0}")]
    UnknownPortType(String),

    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("invalid match expression values for key {key:?}: {reason}")]
    InvalidMatchExpressionValues { key: String, reason: String },

    #[error("negative match on set {0:?} is not supported by the windows dataplane")]
    UnsupportedNegativeMatch(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(&'static str),
}

impl Error {
    pub fn invalid_values(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMatchExpressionValues {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
