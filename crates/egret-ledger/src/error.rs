//! Provider error types and the submission rejection taxonomy.

use thiserror::Error;

/// Why the ledger rejected a submitted transaction.
///
/// This is the closed classification the retry state machine dispatches on.
/// The raw node rejection text is parsed exactly once, in
/// [`SubmitRejection::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitRejection {
    /// Declared inputs/outputs/mint do not balance. Almost always a stale
    /// unspent-output cache.
    ValueNotConserved(String),
    /// A selected input was already spent: a race with another consumer of
    /// the address, or a stale cache.
    BadInputs(String),
    /// Anything else (transient network or protocol errors included).
    Other(String),
}

impl SubmitRejection {
    /// Map the node's rejection text onto the taxonomy.
    ///
    /// The node vocabulary names the failing ledger rule, so the substrings
    /// are matched against rule names, not message prose.
    pub fn classify(reason: &str) -> Self {
        if reason.contains("ValueNotConserved") {
            SubmitRejection::ValueNotConserved(reason.to_string())
        } else if reason.contains("BadInputs") {
            SubmitRejection::BadInputs(reason.to_string())
        } else {
            SubmitRejection::Other(reason.to_string())
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            SubmitRejection::ValueNotConserved(r)
            | SubmitRejection::BadInputs(r)
            | SubmitRejection::Other(r) => r,
        }
    }

    /// Whether the cache must be force-refreshed before the next attempt.
    pub fn needs_refresh(&self) -> bool {
        matches!(
            self,
            SubmitRejection::ValueNotConserved(_) | SubmitRejection::BadInputs(_)
        )
    }
}

impl std::fmt::Display for SubmitRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitRejection::ValueNotConserved(r) => write!(f, "value not conserved: {r}"),
            SubmitRejection::BadInputs(r) => write!(f, "bad inputs: {r}"),
            SubmitRejection::Other(r) => write!(f, "submit rejected: {r}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("HTTP error calling {path}: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("provider returned {status} for {path}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("provider authentication or rate-limit error ({status}) for {path}")]
    Auth { path: String, status: u16 },

    #[error("JSON decode error for {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed provider payload: {0}")]
    Payload(String),

    #[error("{0}")]
    Rejected(SubmitRejection),

    #[error("registry error: {0}")]
    Registry(String),
}

impl LedgerError {
    /// Transient failures are worth an in-client retry with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Http { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            LedgerError::Status { status, .. } => *status >= 500,
            LedgerError::Auth { status, .. } => *status == 429,
            _ => false,
        }
    }
}
