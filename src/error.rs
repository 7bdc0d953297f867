use std::fmt;

use thiserror::Error;

/// Errors surfaced by the advisor library.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no API key configured")]
    MissingCredential,

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("secret store error: {0}")]
    SecretStore(String),
}

/// Why a completion call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    RateLimited,
    Transport,
    Malformed,
    /// Any other non-success answer from the service.
    Service,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::Transport => "transport",
            ErrorKind::Malformed => "malformed response",
            ErrorKind::Service => "service error",
        };
        f.write_str(s)
    }
}

/// A failed call to the completion service. `Display` renders the underlying
/// failure description, which is what ends up in the transcript.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CompletionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
