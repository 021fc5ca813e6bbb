//! Lloyd's k-means with greedy k-means++ seeding.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ClusterError;

/// k-means settings.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    pub max_iter: usize,
    /// Relative to the mean per-feature variance of the data.
    pub tol: f64,
    pub n_init: usize,
    pub seed: u64,
}

/// Result of the best run.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
            seed: 0,
        }
    }

    /// Partition `data` into `k` groups.
    ///
    /// Runs `n_init` seeded initializations and keeps the one with the
    /// lowest inertia. The same input and settings always give the same
    /// result.
    pub fn fit(&self, data: &[Vec<f64>]) -> Result<KMeansFit, ClusterError> {
        if self.k == 0 {
            return Err(ClusterError::InvalidClusterCount { k: self.k });
        }
        if data.len() < self.k {
            return Err(ClusterError::TooFewDocuments {
                documents: data.len(),
                k: self.k,
            });
        }

        let tol = self.tol * mean_variance(data);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;

        for _ in 0..self.n_init.max(1) {
            let centroids = kmeans_plus_plus(data, self.k, &mut rng);
            let fit = lloyd(data, centroids, self.max_iter, tol);
            if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }

        best.ok_or(ClusterError::InvalidClusterCount { k: self.k })
    }
}

/// Greedy k-means++: each new center is the best of `2 + ln k` candidates
/// sampled proportionally to squared distance.
fn kmeans_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = data.len();
    let trials = 2 + (k as f64).ln().floor() as usize;

    let first = rng.gen_range(0..n);
    let mut centers = vec![data[first].clone()];
    let mut closest: Vec<f64> = data.iter().map(|p| sq_dist(p, &data[first])).collect();
    let mut potential: f64 = closest.iter().sum();

    while centers.len() < k {
        let mut best: Option<(usize, f64, Vec<f64>)> = None;
        for _ in 0..trials {
            let candidate = if potential > 0.0 {
                sample_weighted(&closest, rng.r#gen::<f64>() * potential)
            } else {
                rng.gen_range(0..n)
            };
            let dists: Vec<f64> = data
                .iter()
                .zip(&closest)
                .map(|(p, &c)| c.min(sq_dist(p, &data[candidate])))
                .collect();
            let pot: f64 = dists.iter().sum();
            if best.as_ref().is_none_or(|(_, b, _)| pot < *b) {
                best = Some((candidate, pot, dists));
            }
        }
        if let Some((index, pot, dists)) = best {
            centers.push(data[index].clone());
            potential = pot;
            closest = dists;
        }
    }
    centers
}

/// Index whose cumulative weight first reaches `target`.
fn sample_weighted(weights: &[f64], target: f64) -> usize {
    let mut acc = 0.0;
    for (i, w) in weights.iter().enumerate() {
        acc += w;
        if acc >= target && *w > 0.0 {
            return i;
        }
    }
    weights.iter().rposition(|w| *w > 0.0).unwrap_or(0)
}

fn lloyd(data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iter: usize, tol: f64) -> KMeansFit {
    let mut labels = assign(data, &centroids);
    let mut iterations = 0;

    for _ in 0..max_iter {
        iterations += 1;
        let updated = update(data, &labels, &centroids);
        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(a, b)| sq_dist(a, b))
            .sum();
        centroids = updated;

        let next = assign(data, &centroids);
        let stable = next == labels;
        labels = next;
        if stable || shift <= tol {
            break;
        }
    }

    let inertia = data
        .iter()
        .zip(&labels)
        .map(|(p, &l)| sq_dist(p, &centroids[l]))
        .sum();

    KMeansFit {
        labels,
        centroids,
        inertia,
        iterations,
    }
}

/// Nearest centroid per point; ties go to the lower label.
fn assign(data: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    data.iter()
        .map(|p| {
            let mut best = 0;
            let mut best_d = f64::INFINITY;
            for (j, c) in centroids.iter().enumerate() {
                let d = sq_dist(p, c);
                if d < best_d {
                    best = j;
                    best_d = d;
                }
            }
            best
        })
        .collect()
}

/// Mean of each cluster. Empty clusters take over the point farthest from
/// its current centroid.
fn update(data: &[Vec<f64>], labels: &[usize], centroids: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let k = centroids.len();
    let dim = data.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; dim]; k];
    let mut counts = vec![0usize; k];

    for (p, &l) in data.iter().zip(labels) {
        counts[l] += 1;
        for (s, v) in sums[l].iter_mut().zip(p) {
            *s += v;
        }
    }

    let empty: Vec<usize> = (0..k).filter(|&j| counts[j] == 0).collect();
    if !empty.is_empty() {
        let mut far: Vec<(usize, f64)> = data
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(i, (p, &l))| (i, sq_dist(p, &centroids[l])))
            .collect();
        far.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut donors = far.into_iter();
        for j in empty {
            let donor = donors.by_ref().find(|&(i, _)| counts[labels[i]] > 1);
            if let Some((i, _)) = donor {
                let from = labels[i];
                counts[from] -= 1;
                for (s, v) in sums[from].iter_mut().zip(&data[i]) {
                    *s -= v;
                }
                sums[j] = data[i].clone();
                counts[j] = 1;
            }
        }
    }

    sums.into_iter()
        .zip(&counts)
        .zip(centroids)
        .map(|((sum, &count), old)| {
            if count == 0 {
                old.clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
}

fn mean_variance(data: &[Vec<f64>]) -> f64 {
    let n = data.len() as f64;
    let dim = data.first().map_or(0, Vec::len);
    if n == 0.0 || dim == 0 {
        return 0.0;
    }
    let total: f64 = (0..dim)
        .map(|d| {
            let mean = data.iter().map(|p| p[d]).sum::<f64>() / n;
            data.iter().map(|p| (p[d] - mean).powi(2)).sum::<f64>() / n
        })
        .sum();
    total / dim as f64
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
