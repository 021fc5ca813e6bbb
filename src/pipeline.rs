//! One clustering request: retrieve → cluster → render tree.

use secrecy::SecretString;
use tracing::{error, info};

use crate::cluster::{self, Outcome};
use crate::config::{ClusterParams, MAX_CLUSTERS, MIN_CLUSTERS};
use crate::error::{ConfigError, Error, Result};
use crate::mail::{MailQuery, MailSource, Message};
use crate::render::{ClusterView, View};

/// Parameters of one form submission.
#[derive(Debug, Clone)]
pub struct Query {
    pub username: String,
    pub password: SecretString,
    pub subject: String,
    pub clusters: usize,
}

impl Query {
    /// Only the cluster count is checked; the mail server judges the rest.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if (MIN_CLUSTERS..=MAX_CLUSTERS).contains(&self.clusters) {
            Ok(())
        } else {
            Err(ConfigError::InvalidValue {
                key: "clusters".into(),
                message: format!(
                    "{} is outside {MIN_CLUSTERS}..={MAX_CLUSTERS}",
                    self.clusters
                ),
            })
        }
    }

    fn mail_query(&self) -> MailQuery {
        MailQuery {
            username: self.username.clone(),
            password: self.password.clone(),
            subject: self.subject.clone(),
        }
    }
}

/// Run the whole request. Every failure becomes a [`View`]; nothing
/// escapes as an error.
pub async fn run(source: &dyn MailSource, query: &Query, params: &ClusterParams) -> View {
    match try_run(source, query, params).await {
        Ok(view) => view,
        Err(e) => {
            if !matches!(e, Error::NoResults) {
                error!(kind = e.kind(), "Cluster request failed: {e}");
            }
            View::from_error(&e)
        }
    }
}

async fn try_run(source: &dyn MailSource, query: &Query, params: &ClusterParams) -> Result<View> {
    query.validate()?;

    let messages = source.fetch(&query.mail_query()).await?;
    info!(count = messages.len(), subject = %query.subject, "Fetched emails");
    if messages.is_empty() {
        return Err(Error::NoResults);
    }

    let bodies: Vec<&str> = messages.iter().map(|m| m.body.as_str()).collect();
    let view = match cluster::cluster(&bodies, query.clusters, params)? {
        Outcome::TooFew { found, requested } => View::Flat {
            warning: format!("Only {found} emails found. Not enough for {requested} clusters."),
            messages,
        },
        Outcome::Clustered(clustering) => View::Clusters {
            clusters: clustering
                .groups()
                .into_iter()
                .map(|group| ClusterView {
                    title: format!("Cluster {}", group.label + 1),
                    keywords: group.keywords,
                    messages: group
                        .members
                        .iter()
                        .map(|&i| messages[i].clone())
                        .collect::<Vec<Message>>(),
                })
                .collect(),
        },
    };
    Ok(view)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ImapError;

    /// Returns a fixed batch (or error) and counts calls.
    struct StubSource {
        result: fn() -> std::result::Result<Vec<Message>, Error>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn new(result: fn() -> std::result::Result<Vec<Message>, Error>) -> Self {
            Self {
                result,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MailSource for StubSource {
        async fn fetch(&self, _query: &MailQuery) -> std::result::Result<Vec<Message>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn query(clusters: usize) -> Query {
        Query {
            username: "me@example.com".into(),
            password: SecretString::from("secret"),
            subject: "job".into(),
            clusters,
        }
    }

    fn job_mails() -> std::result::Result<Vec<Message>, Error> {
        Ok(vec![
            Message::new("interview schedule monday", "hr@acme.com"),
            Message::new("interview schedule tuesday", "hr@acme.com"),
            Message::new("salary negotiation offer", "boss@acme.com"),
            Message::new("salary offer details", "boss@acme.com"),
            Message::new("final interview round", "cto@acme.com"),
        ])
    }

    #[tokio::test]
    async fn clusters_job_mails() {
        let source = StubSource::new(job_mails);
        let view = run(&source, &query(2), &ClusterParams::default()).await;
        let View::Clusters { clusters } = view else {
            panic!("expected clusters");
        };
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].title, "Cluster 1");
        assert_eq!(clusters[1].title, "Cluster 2");
        let total: usize = clusters.iter().map(|c| c.messages.len()).sum();
        assert_eq!(total, 5);

        let salary = clusters
            .iter()
            .find(|c| c.messages.iter().any(|m| m.body == "salary offer details"))
            .unwrap();
        assert!(salary.keywords.contains(&"salary".to_string()));
        assert!(salary.messages.iter().all(|m| m.sender == "boss@acme.com"));
    }

    #[tokio::test]
    async fn too_few_mails_gives_flat_listing() {
        let source = StubSource::new(|| {
            Ok(vec![
                Message::new("interview monday", "a@acme.com"),
                Message::new("salary offer", "b@acme.com"),
            ])
        });
        let view = run(&source, &query(3), &ClusterParams::default()).await;
        match view {
            View::Flat { warning, messages } => {
                assert_eq!(warning, "Only 2 emails found. Not enough for 3 clusters.");
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].sender, "a@acme.com");
            }
            other => panic!("expected flat listing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_mails_is_no_results() {
        let source = StubSource::new(|| Ok(vec![]));
        let view = run(&source, &query(3), &ClusterParams::default()).await;
        assert!(matches!(view, View::NoResults { .. }));
    }

    #[tokio::test]
    async fn auth_failure_is_single_error_line() {
        let source = StubSource::new(|| {
            Err(ImapError::AuthFailed("[AUTHENTICATIONFAILED] Invalid credentials (Failure)".into()).into())
        });
        let view = run(&source, &query(3), &ClusterParams::default()).await;
        match view {
            View::Error { message } => {
                assert!(message.starts_with("❌ Error: "));
                assert!(message.contains("Invalid credentials"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn out_of_range_cluster_count_never_fetches() {
        let source = StubSource::new(job_mails);
        let view = run(&source, &query(11), &ClusterParams::default()).await;
        assert!(matches!(view, View::Error { .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn validate_accepts_slider_range() {
        assert!(query(2).validate().is_ok());
        assert!(query(10).validate().is_ok());
        assert!(query(1).validate().is_err());
    }
}
