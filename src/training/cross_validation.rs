//! Train/test splitting and K-fold cross-validation

use crate::error::{Result, TripcastError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// K-fold splitter over row indices
#[derive(Debug, Clone)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    /// Unshuffled K-fold
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    /// Generate train/test splits; the first `n % k` folds get one extra row.
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        if self.n_splits < 2 {
            return Err(TripcastError::ConfigurationError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < self.n_splits {
            return Err(TripcastError::DataQualityError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, self.n_splits
            )));
        }

        let indices: Vec<usize> = (0..n_samples).collect();
        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut splits = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for fold_idx in 0..self.n_splits {
            let size = if fold_idx < remainder { base + 1 } else { base };
            let end = start + size;
            let test_indices = indices[start..end].to_vec();
            let train_indices = indices[..start]
                .iter()
                .chain(indices[end..].iter())
                .copied()
                .collect();
            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            start = end;
        }

        Ok(splits)
    }
}

/// Shuffle row indices with `seed` and hold out `ceil(test_size * n)` of them.
///
/// Returns `(train, test)`; both keep the shuffled order.
pub fn train_test_split(
    n_samples: usize,
    test_size: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TripcastError::ConfigurationError(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let n_test = (test_size * n_samples as f64).ceil() as usize;
    if n_test >= n_samples {
        return Err(TripcastError::DataQualityError(format!(
            "Not enough rows to split: {} rows, {} held out",
            n_samples, n_test
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Cross-validation results
#[derive(Debug, Clone)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len().max(1) as f64;
        let mean_score = scores.iter().sum::<f64>() / n_folds;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let splits = KFold::new(5).split(100).unwrap();
        assert_eq!(splits.len(), 5);

        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        // All indices should be covered exactly once in test sets
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_k_fold_uneven() {
        let splits = KFold::new(3).split(10).unwrap();
        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        // Unshuffled folds are contiguous
        assert_eq!(splits[0].test_indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_k_fold_too_few_rows() {
        assert!(matches!(
            KFold::new(3).split(2),
            Err(TripcastError::DataQualityError(_))
        ));
    }

    #[test]
    fn test_train_test_split() {
        let (train, test) = train_test_split(11, 0.2, 42).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);

        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort();
        assert_eq!(all, (0..11).collect::<Vec<_>>());

        let again = train_test_split(11, 0.2, 42).unwrap();
        assert_eq!(again, (train, test));
    }

    #[test]
    fn test_train_test_split_invalid() {
        assert!(train_test_split(10, 0.0, 42).is_err());
        assert!(train_test_split(1, 0.2, 42).is_err());
    }

    #[test]
    fn test_cv_results() {
        let r = CVResults::from_scores(vec![1.0, 2.0, 3.0]);
        assert_eq!(r.mean_score, 2.0);
        assert!((r.std_score - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
