//! Topic clustering of normalized email bodies.

pub mod kmeans;
pub mod tfidf;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ClusterParams;
use crate::error::ClusterError;

pub use kmeans::{KMeans, KMeansFit};
pub use tfidf::{TfidfMatrix, fit_transform, tokenize};

/// One cluster: its label, representative terms and member indices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub label: usize,
    pub keywords: Vec<String>,
    /// Indices into the input, ascending.
    pub members: Vec<usize>,
}

/// Cluster assignment for a batch of documents.
#[derive(Debug, Clone, Serialize)]
pub struct Clustering {
    /// `labels[i]` is the group of document `i`.
    pub labels: Vec<usize>,
    /// Top terms per group, by descending centroid weight.
    pub keywords: Vec<Vec<String>>,
    pub inertia: f64,
}

impl Clustering {
    /// Groups in label order, members in input order.
    pub fn groups(&self) -> Vec<Group> {
        self.keywords
            .iter()
            .enumerate()
            .map(|(label, keywords)| Group {
                label,
                keywords: keywords.clone(),
                members: self
                    .labels
                    .iter()
                    .enumerate()
                    .filter(|&(_, &l)| l == label)
                    .map(|(i, _)| i)
                    .collect(),
            })
            .collect()
    }
}

/// What the engine produced for a batch.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Fewer documents than requested clusters; nothing was clustered.
    TooFew { found: usize, requested: usize },
    Clustered(Clustering),
}

/// Vectorize `bodies` and split them into `k` clusters.
///
/// Fewer than `k` bodies is not an error: the caller gets
/// [`Outcome::TooFew`] and is expected to list the documents flat.
pub fn cluster<S: AsRef<str>>(
    bodies: &[S],
    k: usize,
    params: &ClusterParams,
) -> Result<Outcome, ClusterError> {
    if k == 0 {
        return Err(ClusterError::InvalidClusterCount { k });
    }
    if bodies.len() < k {
        warn!(found = bodies.len(), requested = k, "Not enough documents to cluster");
        return Ok(Outcome::TooFew {
            found: bodies.len(),
            requested: k,
        });
    }

    let matrix = fit_transform(bodies, params.max_features)?;
    let fit = KMeans {
        k,
        max_iter: params.max_iter,
        tol: params.tol,
        n_init: params.n_init,
        seed: params.seed,
    }
    .fit(&matrix.rows)?;

    debug!(
        documents = bodies.len(),
        terms = matrix.vocabulary.len(),
        k,
        inertia = fit.inertia,
        iterations = fit.iterations,
        "Clustering complete"
    );

    let keywords = fit
        .centroids
        .iter()
        .map(|c| top_terms(c, &matrix.vocabulary, params.top_terms))
        .collect();

    Ok(Outcome::Clustered(Clustering {
        labels: fit.labels,
        keywords,
        inertia: fit.inertia,
    }))
}

/// The `n` heaviest terms of a centroid; equal weights keep vocabulary
/// order.
pub fn top_terms(centroid: &[f64], vocabulary: &[String], n: usize) -> Vec<String> {
    let mut order: Vec<usize> = (0..centroid.len().min(vocabulary.len())).collect();
    order.sort_by(|&a, &b| centroid[b].total_cmp(&centroid[a]).then(a.cmp(&b)));
    order
        .into_iter()
        .take(n)
        .map(|i| vocabulary[i].clone())
        .collect()
}
