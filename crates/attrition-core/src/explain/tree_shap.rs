//! Exact path-dependent TreeSHAP over a [`TreeEnsemble`].
//!
//! Contributions are computed in margin (log-odds) space and satisfy
//! `sum(phi) == margin - expected_value` for every row.
use std::sync::Arc;

use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use crate::models::tree::{Node, RegressionTree, TreeEnsemble};

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Tree attribution explainer bound to one ensemble.
#[derive(Debug, Clone)]
pub struct TreeExplainer {
    ensemble: Arc<TreeEnsemble>,
    expected_value: f64,
}

impl TreeExplainer {
    /// Fails when any tree lacks node covers.
    pub fn new(ensemble: Arc<TreeEnsemble>) -> Result<Self> {
        let mut expected_value = ensemble.base_margin;
        for (i, tree) in ensemble.trees.iter().enumerate() {
            let e = tree.expected_value();
            ensure!(
                e.is_some(),
                "tree {} has no positive node cover (sum_hessian); attribution needs it",
                i
            );
            expected_value += e.unwrap_or_default();
        }
        Ok(Self {
            ensemble,
            expected_value,
        })
    }

    /// Expected margin over the training distribution.
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    pub fn n_features(&self) -> usize {
        self.ensemble.n_features
    }

    /// Per-feature contributions for one row.
    pub fn shap_row(&self, row: ArrayView1<f64>) -> Vec<f64> {
        let mut phi = vec![0.0; self.ensemble.n_features];
        for tree in &self.ensemble.trees {
            tree_shap(tree, row, &mut phi, 0, &[], 1.0, 1.0, None);
        }
        phi
    }

    /// Contribution matrix with one row per input row, computed in parallel.
    pub fn shap_values(&self, x: &Array2<f64>) -> Array2<f64> {
        let n_features = self.ensemble.n_features;
        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.shap_row(x.row(i)))
            .collect();
        let mut out = Array2::zeros((x.nrows(), n_features));
        for (i, phi) in rows.into_iter().enumerate() {
            out.row_mut(i).assign(&ArrayView1::from(&phi[..]));
        }
        out
    }
}

#[allow(clippy::too_many_arguments)]
fn tree_shap(
    tree: &RegressionTree,
    row: ArrayView1<f64>,
    phi: &mut [f64],
    node_idx: usize,
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let mut path = parent_path.to_vec();
    extend_path(&mut path, zero_fraction, one_fraction, feature);

    let (split_feature, hot, cold, cover) = match tree.node(node_idx) {
        Node::Leaf { value, .. } => {
            for i in 1..path.len() {
                let w = unwound_path_sum(&path, i);
                let el = path[i];
                if let Some(f) = el.feature {
                    phi[f] += w * (el.one_fraction - el.zero_fraction) * value;
                }
            }
            return;
        }
        Node::Split {
            feature,
            left,
            right,
            cover,
            ..
        } => {
            let hot = tree.next_node(node_idx, row);
            let cold = if hot == *left { *right } else { *left };
            (*feature, hot, cold, cover.unwrap_or(1.0))
        }
    };

    let hot_zero = tree.node(hot).cover().unwrap_or(0.0) / cover;
    let cold_zero = tree.node(cold).cover().unwrap_or(0.0) / cover;
    let mut incoming_zero = 1.0;
    let mut incoming_one = 1.0;

    // Undo an earlier split on the same feature so it is counted once.
    if let Some(k) = path.iter().position(|el| el.feature == Some(split_feature)) {
        incoming_zero = path[k].zero_fraction;
        incoming_one = path[k].one_fraction;
        unwind_path(&mut path, k);
    }

    tree_shap(
        tree,
        row,
        phi,
        hot,
        &path,
        hot_zero * incoming_zero,
        incoming_one,
        Some(split_feature),
    );
    tree_shap(
        tree,
        row,
        phi,
        cold,
        &path,
        cold_zero * incoming_zero,
        0.0,
        Some(split_feature),
    );
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let d = depth as f64;
    for i in (0..depth).rev() {
        let fi = i as f64;
        path[i + 1].pweight += one_fraction * path[i].pweight * (fi + 1.0) / (d + 1.0);
        path[i].pweight = zero_fraction * path[i].pweight * (d - fi) / (d + 1.0);
    }
}

fn unwind_path(path: &mut Vec<PathElement>, path_index: usize) {
    let depth = path.len() - 1;
    let d = depth as f64;
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[depth].pweight;

    for i in (0..depth).rev() {
        let fi = i as f64;
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * (d + 1.0) / ((fi + 1.0) * one_fraction);
            next_one_portion = tmp - path[i].pweight * zero_fraction * (d - fi) / (d + 1.0);
        } else {
            path[i].pweight = path[i].pweight * (d + 1.0) / (zero_fraction * (d - fi));
        }
    }

    for i in path_index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

fn unwound_path_sum(path: &[PathElement], path_index: usize) -> f64 {
    let depth = path.len() - 1;
    let d = depth as f64;
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;

    if one_fraction != 0.0 {
        for i in (0..depth).rev() {
            let fi = i as f64;
            let tmp = next_one_portion / ((fi + 1.0) * one_fraction);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * (d - fi);
        }
    } else {
        for i in (0..depth).rev() {
            total += path[i].pweight / (zero_fraction * (d - i as f64));
        }
    }
    total * (d + 1.0)
}
