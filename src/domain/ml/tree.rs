//! Arena-allocated regression tree with two split policies.
//!
//! Nodes live in a single `Vec<TreeNode>`; internal nodes reference their
//! children by index. Dropping the tree releases every node at once.

use rand::Rng;
use serde::{Deserialize, Serialize};

pub type NodeId = usize;

/// Gains at or below this are treated as "no split".
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitPolicy {
    /// Exhaustive scan over features and distinct midpoints.
    VarianceReduction,
    /// One random feature, one random threshold in its observed range.
    FullyRandomized,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 4,
            min_samples_split: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Internal {
        feature: usize,
        threshold: f64,
        left: NodeId,
        right: NodeId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    importance: Vec<f64>,
    depth: usize,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Borrowed training data; `rows[i]` pairs with `labels[i]`.
struct Samples<'a, R> {
    rows: &'a [R],
    labels: &'a [f64],
    n_features: usize,
}

impl DecisionTree {
    /// Fits a tree on the samples selected by `indices` (repeats allowed).
    pub fn fit<R, G>(
        rows: &[R],
        labels: &[f64],
        indices: &[usize],
        params: &TreeParams,
        policy: SplitPolicy,
        rng: &mut G,
    ) -> Self
    where
        R: AsRef<[f64]>,
        G: Rng,
    {
        let n_features = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let samples = Samples {
            rows,
            labels,
            n_features,
        };
        let mut tree = Self {
            nodes: Vec::new(),
            importance: vec![0.0; n_features],
            depth: 0,
        };
        let mut indices = indices.to_vec();
        tree.grow(&samples, &mut indices, 0, params, policy, rng);
        tree
    }

    /// Fits on every sample.
    pub fn fit_all<R, G>(
        rows: &[R],
        labels: &[f64],
        params: &TreeParams,
        policy: SplitPolicy,
        rng: &mut G,
    ) -> Self
    where
        R: AsRef<[f64]>,
        G: Rng,
    {
        let indices: Vec<usize> = (0..rows.len().min(labels.len())).collect();
        Self::fit(rows, labels, &indices, params, policy, rng)
    }

    fn grow<R, G>(
        &mut self,
        samples: &Samples<'_, R>,
        indices: &mut [usize],
        depth: usize,
        params: &TreeParams,
        policy: SplitPolicy,
        rng: &mut G,
    ) -> NodeId
    where
        R: AsRef<[f64]>,
        G: Rng,
    {
        self.depth = self.depth.max(depth);
        let value = mean_label(samples.labels, indices);

        if depth >= params.max_depth
            || indices.len() < params.min_samples_split.max(2)
            || samples.n_features == 0
        {
            return self.push(TreeNode::Leaf { value });
        }

        let split = match policy {
            SplitPolicy::VarianceReduction => best_variance_split(samples, indices),
            SplitPolicy::FullyRandomized => random_split(samples, indices, rng),
        };
        let Some(split) = split else {
            return self.push(TreeNode::Leaf { value });
        };

        // Partition in place: left block is `feature <= threshold`.
        let mut boundary = 0;
        for i in 0..indices.len() {
            if samples.rows[indices[i]].as_ref()[split.feature] <= split.threshold {
                indices.swap(i, boundary);
                boundary += 1;
            }
        }
        if boundary == 0 || boundary == indices.len() {
            return self.push(TreeNode::Leaf { value });
        }

        self.importance[split.feature] += split.gain;

        let node = self.push(TreeNode::Leaf { value });
        let (left_idx, right_idx) = indices.split_at_mut(boundary);
        let left = self.grow(samples, left_idx, depth + 1, params, policy, rng);
        let right = self.grow(samples, right_idx, depth + 1, params, policy, rng);
        self.nodes[node] = TreeNode::Internal {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node
    }

    fn push(&mut self, node: TreeNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Walks from the root to exactly one leaf. A walk longer than the
    /// arena (a cycle in a corrupted artifact) yields 0.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut id = 0;
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(id) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = features.get(*feature).copied().unwrap_or(0.0);
                    id = if x <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
        0.0
    }

    /// Number of edges on the path taken for `features`.
    pub fn path_length(&self, features: &[f64]) -> usize {
        let mut id = 0;
        let mut steps = 0;
        while let Some(TreeNode::Internal {
            feature,
            threshold,
            left,
            right,
        }) = self.nodes.get(id)
        {
            if steps >= self.nodes.len() {
                break;
            }
            let x = features.get(*feature).copied().unwrap_or(0.0);
            id = if x <= *threshold { *left } else { *right };
            steps += 1;
        }
        steps
    }

    /// Every child index lies after its parent and inside the arena, which
    /// is how `grow` lays nodes out.
    pub fn is_well_formed(&self) -> bool {
        self.nodes.iter().enumerate().all(|(id, node)| match node {
            TreeNode::Leaf { .. } => true,
            TreeNode::Internal { left, right, .. } => [*left, *right]
                .iter()
                .all(|&child| child > id && child < self.nodes.len()),
        })
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Realized gain per feature.
    pub fn importance(&self) -> &[f64] {
        &self.importance
    }
}

fn mean_label(labels: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| labels[i]).sum::<f64>() / indices.len() as f64
}

fn variance_of(sum: f64, sum_sq: f64, n: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

fn best_variance_split<R: AsRef<[f64]>>(
    samples: &Samples<'_, R>,
    indices: &[usize],
) -> Option<Split> {
    let n = indices.len() as f64;
    let total_sum: f64 = indices.iter().map(|&i| samples.labels[i]).sum();
    let total_sq: f64 = indices
        .iter()
        .map(|&i| samples.labels[i] * samples.labels[i])
        .sum();
    let parent_variance = variance_of(total_sum, total_sq, n);
    if parent_variance <= MIN_GAIN {
        return None;
    }

    let mut best: Option<Split> = None;
    let mut best_gain = MIN_GAIN;
    let mut column: Vec<(f64, f64)> = Vec::with_capacity(indices.len());

    for feature in 0..samples.n_features {
        column.clear();
        column.extend(
            indices
                .iter()
                .map(|&i| (samples.rows[i].as_ref()[feature], samples.labels[i])),
        );
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..column.len() - 1 {
            let (x, y) = column[k];
            left_sum += y;
            left_sq += y * y;
            let next = column[k + 1].0;
            if next <= x {
                continue;
            }
            let n_left = (k + 1) as f64;
            let n_right = n - n_left;
            let weighted = (n_left * variance_of(left_sum, left_sq, n_left)
                + n_right * variance_of(total_sum - left_sum, total_sq - left_sq, n_right))
                / n;
            let gain = parent_variance - weighted;
            // Strict comparison keeps the first feature/threshold on ties.
            if gain > best_gain {
                best_gain = gain;
                best = Some(Split {
                    feature,
                    threshold: (x + next) / 2.0,
                    gain,
                });
            }
        }
    }

    best
}

fn random_split<R, G>(samples: &Samples<'_, R>, indices: &[usize], rng: &mut G) -> Option<Split>
where
    R: AsRef<[f64]>,
    G: Rng,
{
    let feature = rng.random_range(0..samples.n_features);
    let (min, max) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, &i| {
        let x = samples.rows[i].as_ref()[feature];
        (acc.0.min(x), acc.1.max(x))
    });
    if !(max > min) {
        return None;
    }
    let threshold = rng.random_range(min..max);

    let n = indices.len() as f64;
    let (mut ls, mut lq, mut ln, mut rs, mut rq) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for &i in indices {
        let y = samples.labels[i];
        if samples.rows[i].as_ref()[feature] <= threshold {
            ls += y;
            lq += y * y;
            ln += 1.0;
        } else {
            rs += y;
            rq += y * y;
        }
    }
    let rn = n - ln;
    if ln == 0.0 || rn == 0.0 {
        return None;
    }
    let parent = variance_of(ls + rs, lq + rq, n);
    let weighted = (ln * variance_of(ls, lq, ln) + rn * variance_of(rs, rq, rn)) / n;
    let gain = parent - weighted;
    if gain <= MIN_GAIN {
        return None;
    }
    Some(Split {
        feature,
        threshold,
        gain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        // Feature 1 separates the labels; feature 0 is noise.
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let noise = ((i * 7) % 11) as f64;
            let signal = i as f64;
            rows.push(vec![noise, signal]);
            labels.push(if i >= 20 { 1.0 } else { 0.0 });
        }
        (rows, labels)
    }

    #[test]
    fn test_variance_split_finds_separating_feature() {
        let (rows, labels) = step_data();
        let mut rng = StdRng::seed_from_u64(1);
        let params = TreeParams {
            max_depth: 3,
            min_samples_split: 2,
        };
        let tree = DecisionTree::fit_all(
            &rows,
            &labels,
            &params,
            SplitPolicy::VarianceReduction,
            &mut rng,
        );

        match &tree.nodes()[0] {
            TreeNode::Internal {
                feature, threshold, ..
            } => {
                assert_eq!(*feature, 1);
                assert!((threshold - 19.5).abs() < 1e-12);
            }
            other => panic!("expected split at root, got {:?}", other),
        }
        assert_eq!(tree.predict(&[0.0, 5.0]), 0.0);
        assert_eq!(tree.predict(&[0.0, 35.0]), 1.0);
        assert!(tree.importance()[1] > 0.0);
        assert_eq!(tree.importance()[0], 0.0);
    }

    #[test]
    fn test_single_label_yields_one_leaf() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let labels = vec![1.0, 1.0, 1.0];
        let mut rng = StdRng::seed_from_u64(7);
        for policy in [SplitPolicy::VarianceReduction, SplitPolicy::FullyRandomized] {
            let tree = DecisionTree::fit_all(
                &rows,
                &labels,
                &TreeParams {
                    max_depth: 5,
                    min_samples_split: 2,
                },
                policy,
                &mut rng,
            );
            assert_eq!(tree.nodes().len(), 1);
            assert_eq!(tree.predict(&[0.0, 0.0]), 1.0);
            assert!(tree.importance().iter().all(|&g| g == 0.0));
        }
    }

    #[test]
    fn test_empty_training_set_yields_zero_leaf() {
        let rows: Vec<Vec<f64>> = Vec::new();
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit_all(
            &rows,
            &[],
            &TreeParams::default(),
            SplitPolicy::VarianceReduction,
            &mut rng,
        );
        assert_eq!(tree.nodes(), &[TreeNode::Leaf { value: 0.0 }]);
        assert!(tree.importance().is_empty());
    }

    #[test]
    fn test_depth_is_bounded_for_every_path() {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..200 {
            let a = ((i * 37) % 101) as f64 / 101.0;
            let b = ((i * 53) % 97) as f64 / 97.0;
            rows.push(vec![a, b, a * b]);
            labels.push(((i * 13) % 7) as f64 / 7.0);
        }
        let params = TreeParams {
            max_depth: 4,
            min_samples_split: 2,
        };
        let mut rng = StdRng::seed_from_u64(3);
        for policy in [SplitPolicy::VarianceReduction, SplitPolicy::FullyRandomized] {
            let tree = DecisionTree::fit_all(&rows, &labels, &params, policy, &mut rng);
            assert!(tree.depth() <= params.max_depth);
            for row in &rows {
                assert!(tree.path_length(row) <= params.max_depth);
            }
            assert!(tree.path_length(&[f64::MAX; 3]) <= params.max_depth);
        }
    }

    #[test]
    fn test_min_samples_split_stops_growth() {
        let (rows, labels) = step_data();
        let mut rng = StdRng::seed_from_u64(1);
        let tree = DecisionTree::fit_all(
            &rows,
            &labels,
            &TreeParams {
                max_depth: 8,
                min_samples_split: 41,
            },
            SplitPolicy::VarianceReduction,
            &mut rng,
        );
        assert_eq!(tree.leaf_count(), 1);
        assert!((tree.predict(&[0.0, 0.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_randomized_split_is_reproducible() {
        let (rows, labels) = step_data();
        let params = TreeParams {
            max_depth: 4,
            min_samples_split: 2,
        };
        let a = DecisionTree::fit_all(
            &rows,
            &labels,
            &params,
            SplitPolicy::FullyRandomized,
            &mut StdRng::seed_from_u64(99),
        );
        let b = DecisionTree::fit_all(
            &rows,
            &labels,
            &params,
            SplitPolicy::FullyRandomized,
            &mut StdRng::seed_from_u64(99),
        );
        assert_eq!(a.nodes(), b.nodes());
    }

    #[test]
    fn test_cyclic_tree_terminates() {
        let tree = DecisionTree {
            nodes: vec![
                TreeNode::Internal {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 1,
                },
                TreeNode::Internal {
                    feature: 0,
                    threshold: 0.5,
                    left: 0,
                    right: 0,
                },
            ],
            importance: vec![0.0],
            depth: 2,
        };
        assert!(!tree.is_well_formed());
        assert_eq!(tree.predict(&[1.0]), 0.0);
        assert_eq!(tree.path_length(&[1.0]), 2);
    }

    #[test]
    fn test_grown_trees_are_well_formed() {
        let (rows, labels) = step_data();
        let mut rng = StdRng::seed_from_u64(3);
        let params = TreeParams {
            max_depth: 4,
            min_samples_split: 2,
        };
        for policy in [SplitPolicy::VarianceReduction, SplitPolicy::FullyRandomized] {
            let tree = DecisionTree::fit_all(&rows, &labels, &params, policy, &mut rng);
            assert!(tree.is_well_formed());
        }
    }
}
