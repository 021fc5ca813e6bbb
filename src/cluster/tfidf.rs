//! TF-IDF vectorization.
//!
//! Tokens are runs of two or more word characters. The vocabulary is the
//! sorted set of corpus terms, `idf(t) = ln((1 + n) / (1 + df(t))) + 1`,
//! and every document row is L2-normalized.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ClusterError;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is valid"));

/// Dense TF-IDF features for a small corpus.
#[derive(Debug, Clone)]
pub struct TfidfMatrix {
    /// Terms in column order (sorted).
    pub vocabulary: Vec<String>,
    /// Inverse document frequency per column.
    pub idf: Vec<f64>,
    /// One L2-normalized row per document.
    pub rows: Vec<Vec<f64>>,
}

/// Split `text` into lowercase tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

/// Build the vocabulary from `docs` and vectorize them.
///
/// With `max_features`, only that many terms with the highest corpus
/// frequency are kept.
pub fn fit_transform<S: AsRef<str>>(
    docs: &[S],
    max_features: Option<usize>,
) -> Result<TfidfMatrix, ClusterError> {
    let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d.as_ref())).collect();

    // term -> (document frequency, corpus frequency)
    let mut stats: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for tokens in &tokenized {
        let mut seen: Vec<&str> = Vec::new();
        for token in tokens {
            let entry = stats.entry(token.as_str()).or_insert((0, 0));
            entry.1 += 1;
            if !seen.contains(&token.as_str()) {
                seen.push(token.as_str());
                entry.0 += 1;
            }
        }
    }

    let mut terms: Vec<(&str, usize, usize)> = stats.into_iter().map(|(t, (df, tf))| (t, df, tf)).collect();
    if let Some(limit) = max_features
        && terms.len() > limit
    {
        terms.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)));
        terms.truncate(limit);
        terms.sort_by(|a, b| a.0.cmp(b.0));
    }
    if terms.is_empty() {
        return Err(ClusterError::EmptyVocabulary);
    }

    let n = docs.len() as f64;
    let vocabulary: Vec<String> = terms.iter().map(|(t, _, _)| t.to_string()).collect();
    let idf: Vec<f64> = terms
        .iter()
        .map(|&(_, df, _)| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
        .collect();
    let column: HashMap<&str, usize> = vocabulary
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let rows = tokenized
        .iter()
        .map(|tokens| {
            let mut row = vec![0.0; vocabulary.len()];
            for token in tokens {
                if let Some(&col) = column.get(token.as_str()) {
                    row[col] += 1.0;
                }
            }
            for (value, weight) in row.iter_mut().zip(&idf) {
                *value *= weight;
            }
            l2_normalize(&mut row);
            row
        })
        .collect();

    Ok(TfidfMatrix {
        vocabulary,
        idf,
        rows,
    })
}

fn l2_normalize(row: &mut [f64]) {
    let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in row.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn tokenizer_drops_single_characters() {
        assert_eq!(tokenize("a bb c dd2 x"), vec!["bb", "dd2"]);
    }

    #[test]
    fn tokenizer_lowercases() {
        assert_eq!(tokenize("Final Interview"), vec!["final", "interview"]);
    }

    #[test]
    fn vocabulary_is_sorted_and_deduplicated() {
        let m = fit_transform(&["offer salary", "salary details offer"], None).unwrap();
        assert_eq!(m.vocabulary, vec!["details", "offer", "salary"]);
    }

    #[test]
    fn idf_is_smoothed() {
        let m = fit_transform(&["alpha beta", "alpha gamma", "alpha"], None).unwrap();
        // alpha in all 3 docs, beta in 1
        assert!(close(m.idf[0], 1.0));
        assert!(close(m.idf[1], (4.0f64 / 2.0).ln() + 1.0));
    }

    #[test]
    fn rows_are_unit_length() {
        let m = fit_transform(&["interview schedule monday", "salary salary offer"], None).unwrap();
        for row in &m.rows {
            let norm: f64 = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!(close(norm, 1.0));
        }
    }

    #[test]
    fn term_frequency_counts_repeats() {
        let m = fit_transform(&["salary salary offer", "offer"], None).unwrap();
        let offer = m.vocabulary.iter().position(|t| t == "offer").unwrap();
        let salary = m.vocabulary.iter().position(|t| t == "salary").unwrap();
        assert!(m.rows[0][salary] > m.rows[0][offer]);
    }

    #[test]
    fn document_without_terms_is_zero_row() {
        let m = fit_transform(&["interview monday", "a b c"], None).unwrap();
        assert!(m.rows[1].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn empty_vocabulary_is_an_error() {
        let err = fit_transform(&["a b", "", "x"], None).unwrap_err();
        assert!(matches!(err, ClusterError::EmptyVocabulary));
    }

    #[test]
    fn max_features_keeps_most_frequent() {
        let m = fit_transform(&["offer offer offer salary salary zebra", "offer"], Some(2)).unwrap();
        assert_eq!(m.vocabulary, vec!["offer", "salary"]);
        assert_eq!(m.rows[0].len(), 2);
    }
}
