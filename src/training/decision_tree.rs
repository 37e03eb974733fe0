//! Regression tree (variance reduction splits)

use super::Regressor;
use crate::error::{Result, TripcastError};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Below this many rows a node scans its features sequentially
const PARALLEL_SPLIT_MIN_ROWS: usize = 2048;

/// Decision tree node, stored in a flat arena (the root is node 0)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node: rows with `x[feature_idx] <= threshold` go to `left`
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
    },
}

/// Which child slot of a split a pending node fills
#[derive(Debug, Clone, Copy)]
enum Branch {
    Left,
    Right,
}

/// Node waiting to be grown
struct PendingNode {
    indices: Vec<usize>,
    depth: usize,
    parent: Option<(usize, Branch)>,
}

/// Best split found for one node
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    /// Reduction of the sum of squared errors
    gain: f64,
}

/// Decision tree regressor minimizing squared error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    /// Maximum depth (unbounded when `None`)
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    n_features: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            n_features: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(TripcastError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(TripcastError::TrainingError(
                "Cannot fit a tree on empty data".to_string(),
            ));
        }

        self.n_features = x.ncols();
        self.nodes = self.build_tree(x, y, (0..n_samples).collect());
        Ok(self)
    }

    /// Grow the tree depth-first from an explicit work stack.
    ///
    /// Nodes are numbered in pre-order: a split's left child directly follows it.
    fn build_tree(&self, x: &Array2<f64>, y: &Array1<f64>, indices: Vec<usize>) -> Vec<TreeNode> {
        let mut nodes = Vec::new();
        let mut stack = vec![PendingNode {
            indices,
            depth: 0,
            parent: None,
        }];

        while let Some(PendingNode {
            indices,
            depth,
            parent,
        }) = stack.pop()
        {
            let id = nodes.len();
            if let Some((parent_id, branch)) = parent {
                link_child(&mut nodes[parent_id], branch, id);
            }

            let n_samples = indices.len();
            let value = indices.iter().map(|&i| y[i]).sum::<f64>() / n_samples as f64;

            let should_stop = n_samples < self.min_samples_split
                || n_samples < 2 * self.min_samples_leaf
                || self.max_depth.map_or(false, |d| depth >= d)
                || is_constant(y, &indices);
            let best = if should_stop {
                None
            } else {
                self.find_best_split(x, y, &indices)
            };

            let Some(best) = best else {
                nodes.push(TreeNode::Leaf { value, n_samples });
                continue;
            };

            nodes.push(TreeNode::Split {
                feature_idx: best.feature_idx,
                threshold: best.threshold,
                left: id,
                right: id,
                n_samples,
            });

            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| x[[i, best.feature_idx]] <= best.threshold);

            // Right goes first so the left subtree is grown next
            stack.push(PendingNode {
                indices: right,
                depth: depth + 1,
                parent: Some((id, Branch::Right)),
            });
            stack.push(PendingNode {
                indices: left,
                depth: depth + 1,
                parent: Some((id, Branch::Left)),
            });
        }

        nodes
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
    ) -> Option<SplitCandidate> {
        let scan = |feature_idx: usize| self.best_split_for_feature(x, y, indices, feature_idx);

        let per_feature: Vec<Option<SplitCandidate>> =
            if indices.len() >= PARALLEL_SPLIT_MIN_ROWS {
                (0..self.n_features).into_par_iter().map(scan).collect()
            } else {
                (0..self.n_features).map(scan).collect()
            };

        // Strictly greater keeps the lowest feature index on ties
        per_feature.into_iter().flatten().fold(None, |best, cand| match best {
            Some(b) if cand.gain <= b.gain => Some(b),
            _ => Some(cand),
        })
    }

    /// Sort the node's rows by one feature and sweep prefix sums over every
    /// boundary between distinct values.
    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        feature_idx: usize,
    ) -> Option<SplitCandidate> {
        let mut pairs: Vec<(f64, f64)> = indices
            .iter()
            .map(|&i| (x[[i, feature_idx]], y[i]))
            .collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let n = pairs.len();
        let total_sum: f64 = pairs.iter().map(|p| p.1).sum();
        let parent_score = total_sum * total_sum / n as f64;

        let mut left_sum = 0.0;
        let mut best: Option<SplitCandidate> = None;

        for i in 0..n - 1 {
            left_sum += pairs[i].1;
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf {
                continue;
            }
            if n_right < self.min_samples_leaf {
                break;
            }
            if pairs[i].0 >= pairs[i + 1].0 {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let score =
                left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
            let gain = score - parent_score;

            if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                let mut threshold = (pairs[i].0 + pairs[i + 1].0) / 2.0;
                // Midpoint can round up to the right value for adjacent floats
                if threshold >= pairs[i + 1].0 {
                    threshold = pairs[i].0;
                }
                best = Some(SplitCandidate {
                    feature_idx,
                    threshold,
                    gain,
                });
            }
        }

        best
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.nodes.is_empty() {
            return Err(TripcastError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(TripcastError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows().into_iter().map(|row| self.predict_sample(row)).collect())
    }

    fn predict_sample(&self, sample: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    id = if sample[*feature_idx] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

impl Regressor for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        DecisionTree::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict(self, x)
    }
}

fn link_child(node: &mut TreeNode, branch: Branch, child: usize) {
    if let TreeNode::Split { left, right, .. } = node {
        match branch {
            Branch::Left => *left = child,
            Branch::Right => *right = child,
        }
    }
}

fn is_constant(y: &Array1<f64>, indices: &[usize]) -> bool {
    let first = y[indices[0]];
    indices.iter().all(|&i| (y[i] - first).abs() < 1e-10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Levels on the longest root-to-leaf path (a lone leaf has depth 1)
    fn depth(tree: &DecisionTree) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 1usize)];
        while let Some((id, level)) = stack.pop() {
            max_depth = max_depth.max(level);
            if let TreeNode::Split { left, right, .. } = &tree.nodes[id] {
                stack.push((*left, level + 1));
                stack.push((*right, level + 1));
            }
        }
        max_depth
    }

    fn n_leaves(tree: &DecisionTree) -> usize {
        tree.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    #[test]
    fn test_regressor_simple() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        // Unbounded depth memorizes distinct inputs
        let predictions = tree.predict(&x).unwrap();
        assert_eq!(predictions, y);
        assert_eq!(n_leaves(&tree), 5);
    }

    #[test]
    fn test_step_function_single_split() {
        let x = array![
            [0.0, 7.0],
            [1.0, 7.0],
            [2.0, 7.0],
            [10.0, 7.0],
            [11.0, 7.0],
            [12.0, 7.0]
        ];
        let y = array![5.0, 5.0, 5.0, 50.0, 50.0, 50.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        assert_eq!(depth(&tree), 2);
        match &tree.nodes[0] {
            TreeNode::Split { feature_idx, threshold, .. } => {
                assert_eq!(*feature_idx, 0);
                assert_eq!(*threshold, 6.0);
            }
            TreeNode::Leaf { .. } => panic!("expected a split"),
        }
        assert_eq!(tree.predict(&array![[4.0, 0.0]]).unwrap()[0], 5.0);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = array![1.0, 3.0, 2.0, 5.0, 4.0, 8.0, 6.0, 7.0];

        let mut tree = DecisionTree::new().with_max_depth(Some(2));
        tree.fit(&x, &y).unwrap();
        assert!(depth(&tree) <= 3);
        assert!(n_leaves(&tree) <= 4);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 100.0];

        let mut tree = DecisionTree::new().with_min_samples_leaf(2);
        tree.fit(&x, &y).unwrap();
        // The outlier cannot be isolated in its own leaf
        let p = tree.predict(&array![[5.0]]).unwrap()[0];
        assert!(p < 100.0);
    }

    #[test]
    fn test_constant_feature_yields_leaf() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();
        assert_eq!(n_leaves(&tree), 1);
        assert_eq!(tree.predict(&x).unwrap()[0], 2.0);
    }

    #[test]
    fn test_unbounded_chain_is_grown_without_recursion() {
        // Each level isolates the largest target, so the tree is a chain
        let n = 26;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(n, |i| 4f64.powi(i as i32));

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        assert_eq!(depth(&tree), n);
        assert_eq!(n_leaves(&tree), n);
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_nodes_are_numbered_in_pre_order() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| ((i * 7 + j * 13) % 17) as f64);
        let y = Array1::from_shape_fn(40, |i| ((i * 11) % 9) as f64);

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let mut seen = vec![false; tree.nodes.len()];
        seen[0] = true;
        for (id, node) in tree.nodes.iter().enumerate() {
            if let TreeNode::Split { left, right, .. } = node {
                assert_eq!(*left, id + 1);
                assert!(*right > *left);
                assert!(!seen[*left] && !seen[*right], "node reached twice");
                seen[*left] = true;
                seen[*right] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "unreachable node");
        assert_eq!(n_leaves(&tree), tree.nodes.len() / 2 + 1);
    }

    #[test]
    fn test_predict_not_fitted() {
        let tree = DecisionTree::new();
        assert!(matches!(tree.predict(&array![[1.0]]), Err(TripcastError::ModelNotFitted)));
    }
}
