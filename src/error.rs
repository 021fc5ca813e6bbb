//! Error types for mail-cluster.

/// Top-level error type for a clustering request.
///
/// Every failure in the pipeline ends up as one of these kinds. The web
/// layer decides how each kind is shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Network(ImapError),

    #[error("No emails found with that subject filter.")]
    NoResults,

    #[error("{0}")]
    Clustering(#[from] ClusterError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Auth(_) => "auth",
            Error::Network(_) => "network",
            Error::NoResults => "no_results",
            Error::Clustering(_) => "clustering",
            Error::Config(_) => "config",
        }
    }
}

/// IMAP session errors.
#[derive(Debug, thiserror::Error)]
pub enum ImapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Invalid server name {host}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("IMAP command {command} failed: {response}")]
    CommandFailed { command: String, response: String },

    #[error("Malformed IMAP response: {0}")]
    Malformed(String),

    #[error("IMAP connection closed")]
    Closed,
}

/// Vectorization / clustering errors.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("empty vocabulary; the documents contain no terms of two or more characters")]
    EmptyVocabulary,

    #[error("Invalid cluster count {k}: must be at least 1")]
    InvalidClusterCount { k: usize },

    #[error("Need at least {k} documents to form {k} clusters, got {documents}")]
    TooFewDocuments { documents: usize, k: usize },
}

/// Configuration and request-parameter errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl From<ImapError> for Error {
    fn from(err: ImapError) -> Self {
        match err {
            ImapError::AuthFailed(reason) => Error::Auth(format!("Authentication failed: {reason}")),
            other => Error::Network(other),
        }
    }
}

/// Result type alias for mail-cluster.
pub type Result<T> = std::result::Result<T, Error>;
