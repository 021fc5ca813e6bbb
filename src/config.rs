//! Configuration types.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default subject filter shown in the form.
pub const DEFAULT_SUBJECT: &str = "job";
/// Default number of clusters shown in the form.
pub const DEFAULT_CLUSTERS: usize = 3;
/// Smallest cluster count the form accepts.
pub const MIN_CLUSTERS: usize = 2;
/// Largest cluster count the form accepts.
pub const MAX_CLUSTERS: usize = 10;

/// Mail server connection settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    /// Only the trailing `max_messages` search hits are fetched.
    pub max_messages: usize,
    pub read_timeout: Duration,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            max_messages: 20,
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Numeric parameters of the vectorizer and k-means.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    /// Seed for k-means++ initialization.
    pub seed: u64,
    /// Number of representative terms reported per cluster.
    pub top_terms: usize,
    /// Keep only the most frequent terms when set.
    pub max_features: Option<usize>,
    /// Lloyd iterations per run.
    pub max_iter: usize,
    /// Convergence tolerance, relative to the mean feature variance.
    pub tol: f64,
    /// Independent initializations; the lowest-inertia run wins.
    pub n_init: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            seed: 0,
            top_terms: 3,
            max_features: None,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
        }
    }
}

/// Application configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub imap: ImapConfig,
    pub cluster: ClusterParams,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8501)),
            imap: ImapConfig::default(),
            cluster: ClusterParams::default(),
        }
    }
}

impl AppConfig {
    /// Build config from `MAIL_CLUSTER_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults, except
    /// the bind address which must parse when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind = match lookup("MAIL_CLUSTER_BIND") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "MAIL_CLUSTER_BIND".into(),
                message: format!("{e}"),
            })?,
            None => defaults.bind,
        };

        let imap = ImapConfig {
            host: lookup("MAIL_CLUSTER_IMAP_HOST")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.imap.host),
            port: parse_var(&lookup, "MAIL_CLUSTER_IMAP_PORT").unwrap_or(defaults.imap.port),
            max_messages: parse_var(&lookup, "MAIL_CLUSTER_MAX_MESSAGES").unwrap_or(defaults.imap.max_messages),
            read_timeout: parse_var(&lookup, "MAIL_CLUSTER_READ_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.imap.read_timeout),
        };

        let cluster = ClusterParams {
            seed: parse_var(&lookup, "MAIL_CLUSTER_SEED").unwrap_or(defaults.cluster.seed),
            top_terms: parse_var(&lookup, "MAIL_CLUSTER_TOP_TERMS").unwrap_or(defaults.cluster.top_terms),
            max_features: parse_var(&lookup, "MAIL_CLUSTER_MAX_FEATURES").filter(|n: &usize| *n > 0),
            max_iter: parse_var(&lookup, "MAIL_CLUSTER_MAX_ITER").unwrap_or(defaults.cluster.max_iter),
            tol: parse_var(&lookup, "MAIL_CLUSTER_TOL")
                .filter(|t: &f64| t.is_finite() && *t >= 0.0)
                .unwrap_or(defaults.cluster.tol),
            n_init: parse_var(&lookup, "MAIL_CLUSTER_N_INIT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.cluster.n_init),
        };

        Ok(Self {
            bind,
            imap,
            cluster,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}
