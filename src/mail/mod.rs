//! Mail retrieval — IMAP over TLS, subject search, plain-text extraction.

pub mod extract;
pub mod imap;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;

use crate::config::ImapConfig;
use crate::error::{Error, ImapError};

pub use extract::{UNKNOWN_SENDER, extract_message};
pub use imap::fetch_matching;

/// A fetched email reduced to what clustering needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Normalized plain-text body.
    pub body: String,
    /// `From` header as displayed, or [`UNKNOWN_SENDER`].
    pub sender: String,
}

impl Message {
    pub fn new(body: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            sender: sender.into(),
        }
    }
}

/// Account and search parameters for one retrieval.
#[derive(Debug, Clone)]
pub struct MailQuery {
    pub username: String,
    pub password: SecretString,
    pub subject: String,
}

/// Something that can produce the messages matching a query.
#[async_trait]
pub trait MailSource: Send + Sync {
    async fn fetch(&self, query: &MailQuery) -> Result<Vec<Message>, Error>;
}

/// [`MailSource`] backed by a live IMAP server.
pub struct ImapSource {
    config: ImapConfig,
}

impl ImapSource {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailSource for ImapSource {
    async fn fetch(&self, query: &MailQuery) -> Result<Vec<Message>, Error> {
        let config = self.config.clone();
        let query = query.clone();
        let messages = tokio::task::spawn_blocking(move || fetch_matching(&config, &query))
            .await
            .map_err(|e| {
                Error::Network(ImapError::Io(std::io::Error::other(format!(
                    "IMAP task failed: {e}"
                ))))
            })??;
        Ok(messages)
    }
}
