//! Bagged CART regression trees.
//!
//! Trees use a flat layout: internal nodes live in
//! parallel arrays and a negative child `c` points at leaf `-c - 1`.

use crate::error::{ImpactError, Result};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split; `None` considers all of them.
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionTree {
    split_features: Vec<usize>,
    thresholds: Vec<f64>,
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    leaf_values: Vec<f64>,
}

impl RegressionTree {
    pub fn predict(&self, features: &[f64]) -> f64 {
        if self.split_features.is_empty() {
            return self.leaf_values.first().copied().unwrap_or_default();
        }

        let mut node_idx = 0usize;
        loop {
            let feature_idx = self
                .split_features
                .get(node_idx)
                .copied()
                .unwrap_or_default();
            let threshold = self.thresholds.get(node_idx).copied().unwrap_or(0.0);
            let feature_value = features.get(feature_idx).copied().unwrap_or(0.0);
            let child = if feature_value <= threshold {
                self.left_child.get(node_idx).copied().unwrap_or(-1)
            } else {
                self.right_child.get(node_idx).copied().unwrap_or(-1)
            };

            if child < 0 {
                let leaf_idx = leaf_index(child);
                return self.leaf_values.get(leaf_idx).copied().unwrap_or_default();
            }

            node_idx = child as usize;
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.leaf_values.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(tree: &RegressionTree, child: i32) -> usize {
            if child < 0 {
                return 0;
            }
            let idx = child as usize;
            1 + walk(tree, tree.left_child[idx]).max(walk(tree, tree.right_child[idx]))
        }
        if self.split_features.is_empty() {
            0
        } else {
            walk(self, 0)
        }
    }

    /// Structural checks for a tree that came from untrusted bytes. Child
    /// nodes must come after their parent so traversal always terminates.
    fn validate(&self, feature_count: usize) -> std::result::Result<(), String> {
        let internal_nodes = self.split_features.len();
        if self.thresholds.len() != internal_nodes
            || self.left_child.len() != internal_nodes
            || self.right_child.len() != internal_nodes
        {
            return Err("split/child/threshold length mismatch".to_string());
        }
        if self.leaf_values.len() != internal_nodes + 1 {
            return Err(format!(
                "expected {} leaves for {} internal nodes, found {}",
                internal_nodes + 1,
                internal_nodes,
                self.leaf_values.len()
            ));
        }
        for node_idx in 0..internal_nodes {
            if self.split_features[node_idx] >= feature_count {
                return Err(format!(
                    "node {} splits on feature {} but only {} exist",
                    node_idx, self.split_features[node_idx], feature_count
                ));
            }
            for child in [self.left_child[node_idx], self.right_child[node_idx]] {
                if child < 0 {
                    if leaf_index(child) >= self.leaf_values.len() {
                        return Err(format!("node {node_idx} points at missing leaf {child}"));
                    }
                } else if child as usize <= node_idx || child as usize >= internal_nodes {
                    return Err(format!("node {node_idx} has invalid child {child}"));
                }
            }
        }
        Ok(())
    }
}

/// Leaf slot for a negative child reference; `!c` equals `-c - 1` without
/// overflowing at `i32::MIN`.
fn leaf_index(child: i32) -> usize {
    (!child) as usize
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    left_count: usize,
    gain: f64,
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    targets: &'a [f64],
    config: &'a ForestConfig,
    feature_count: usize,
    tree: RegressionTree,
    importances: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn new(
        rows: &'a [Vec<f64>],
        targets: &'a [f64],
        config: &'a ForestConfig,
        feature_count: usize,
    ) -> Self {
        Self {
            rows,
            targets,
            config,
            feature_count,
            tree: RegressionTree {
                split_features: Vec::new(),
                thresholds: Vec::new(),
                left_child: Vec::new(),
                right_child: Vec::new(),
                leaf_values: Vec::new(),
            },
            importances: vec![0.0; feature_count],
        }
    }

    fn push_leaf(&mut self, indices: &[usize]) -> i32 {
        let sum: f64 = indices.iter().map(|&idx| self.targets[idx]).sum();
        let value = if indices.is_empty() {
            0.0
        } else {
            sum / indices.len() as f64
        };
        self.tree.leaf_values.push(value);
        -(self.tree.leaf_values.len() as i32)
    }

    fn sum_squared_error(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        let (sum, sum_sq) = indices.iter().fold((0.0, 0.0), |(sum, sum_sq), &idx| {
            let y = self.targets[idx];
            (sum + y, sum_sq + y * y)
        });
        (sum_sq - sum * sum / indices.len() as f64).max(0.0)
    }

    fn candidate_features(&self, rng: &mut StdRng) -> Vec<usize> {
        let mut features: Vec<usize> = (0..self.feature_count).collect();
        match self.config.max_features {
            Some(limit) if limit > 0 && limit < self.feature_count => {
                features.shuffle(rng);
                features.truncate(limit);
                features.sort_unstable();
                features
            }
            _ => features,
        }
    }

    fn sort_by_feature(&self, indices: &mut [usize], feature: usize) {
        let rows = self.rows;
        indices.sort_by(|a, b| rows[*a][feature].total_cmp(&rows[*b][feature]));
    }

    fn best_split(
        &self,
        indices: &mut [usize],
        parent_sse: f64,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let total_sum: f64 = indices.iter().map(|&idx| self.targets[idx]).sum();
        let total_sq: f64 = indices
            .iter()
            .map(|&idx| self.targets[idx] * self.targets[idx])
            .sum();

        let mut best: Option<SplitCandidate> = None;
        for feature in self.candidate_features(rng) {
            self.sort_by_feature(indices, feature);

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..n - 1 {
                let y = self.targets[indices[pos]];
                left_sum += y;
                left_sq += y * y;

                let left_count = pos + 1;
                let right_count = n - left_count;
                if left_count < min_leaf || right_count < min_leaf {
                    continue;
                }

                let current = self.rows[indices[pos]][feature];
                let next = self.rows[indices[pos + 1]][feature];
                if current.total_cmp(&next).is_eq() || !current.is_finite() {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = (left_sq - left_sum * left_sum / left_count as f64).max(0.0);
                let right_sse = (right_sq - right_sum * right_sum / right_count as f64).max(0.0);
                let gain = parent_sse - left_sse - right_sse;

                if gain > EPSILON && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = current + (next - current) / 2.0;
                    if !threshold.is_finite() || threshold >= next {
                        threshold = current;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        left_count,
                        gain,
                    });
                }
            }
        }
        best
    }

    fn build(&mut self, indices: &mut [usize], depth: usize, rng: &mut StdRng) -> i32 {
        let n = indices.len();
        let parent_sse = self.sum_squared_error(indices);
        if depth >= self.config.max_depth
            || n < self.config.min_samples_split.max(2)
            || parent_sse <= EPSILON
        {
            return self.push_leaf(indices);
        }

        let Some(split) = self.best_split(indices, parent_sse, rng) else {
            return self.push_leaf(indices);
        };

        self.importances[split.feature] += split.gain;
        self.sort_by_feature(indices, split.feature);

        let node_idx = self.tree.split_features.len();
        self.tree.split_features.push(split.feature);
        self.tree.thresholds.push(split.threshold);
        self.tree.left_child.push(-1);
        self.tree.right_child.push(-1);

        let (left, right) = indices.split_at_mut(split.left_count);
        let left_ref = self.build(left, depth + 1, rng);
        let right_ref = self.build(right, depth + 1, rng);
        self.tree.left_child[node_idx] = left_ref;
        self.tree.right_child[node_idx] = right_ref;
        node_idx as i32
    }

    fn finish(mut self, indices: &mut [usize], rng: &mut StdRng) -> (RegressionTree, Vec<f64>) {
        self.build(indices, 0, rng);
        let total: f64 = self.importances.iter().sum();
        if total > 0.0 {
            for value in self.importances.iter_mut() {
                *value /= total;
            }
        }
        (self.tree, self.importances)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForestRegressor {
    config: ForestConfig,
    feature_count: usize,
    trees: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForestRegressor {
    pub fn fit(config: ForestConfig, rows: &[Vec<f64>], targets: &[f64]) -> Result<Self> {
        if rows.is_empty() || targets.is_empty() {
            return Err(ImpactError::EmptyDataset);
        }
        if rows.len() != targets.len() {
            return Err(ImpactError::FeatureMismatch {
                expected: rows.len(),
                actual: targets.len(),
            });
        }
        let feature_count = rows[0].len();
        if let Some(row) = rows.iter().find(|row| row.len() != feature_count) {
            return Err(ImpactError::FeatureMismatch {
                expected: feature_count,
                actual: row.len(),
            });
        }

        let n_trees = config.n_trees.max(1);
        let sample_count = rows.len();
        let fitted: Vec<(RegressionTree, Vec<f64>)> = (0..n_trees)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(tree_idx as u64));
                let mut indices: Vec<usize> = if config.bootstrap {
                    (0..sample_count)
                        .map(|_| rng.gen_range(0..sample_count))
                        .collect()
                } else {
                    (0..sample_count).collect()
                };
                TreeBuilder::new(rows, targets, &config, feature_count).finish(&mut indices, &mut rng)
            })
            .collect();

        let mut feature_importances = vec![0.0; feature_count];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, importances) in fitted {
            for (total, value) in feature_importances.iter_mut().zip(importances) {
                *total += value;
            }
            trees.push(tree);
        }
        let total: f64 = feature_importances.iter().sum();
        if total > 0.0 {
            for value in feature_importances.iter_mut() {
                *value /= total;
            }
        }

        debug!(
            "Fitted {} regression tree(s) on {} row(s); mean leaves={:.1}",
            trees.len(),
            sample_count,
            trees.iter().map(RegressionTree::num_leaves).sum::<usize>() as f64
                / trees.len() as f64
        );

        Ok(Self {
            config,
            feature_count,
            trees,
            feature_importances,
        })
    }

    /// Mean of the per-tree predictions.
    pub fn predict(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.predict(features)).sum();
        sum / self.trees.len() as f64
    }

    pub fn num_features(&self) -> usize {
        self.feature_count
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest contains no trees".to_string());
        }
        if self.feature_count == 0 {
            return Err("forest expects zero features".to_string());
        }
        if self.feature_importances.len() != self.feature_count {
            return Err(format!(
                "{} feature importance(s) recorded for {} feature(s)",
                self.feature_importances.len(),
                self.feature_count
            ));
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_count)
                .map_err(|reason| format!("tree {idx}: {reason}"))?;
        }
        Ok(())
    }
}
