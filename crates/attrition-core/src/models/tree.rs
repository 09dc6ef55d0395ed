//! Gradient-boosted regression trees loaded from array dumps.
use anyhow::{bail, ensure, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};

/// One tree in the column-array layout used by gradient-boosting dumps.
///
/// `-1` in `left_children` / `right_children` marks a leaf, in which case
/// `split_conditions` holds the leaf value. `sum_hessian` is the node cover;
/// it is optional for prediction but required for attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDump {
    pub left_children: Vec<i64>,
    pub right_children: Vec<i64>,
    pub split_indices: Vec<usize>,
    pub split_conditions: Vec<f64>,
    #[serde(deserialize_with = "bool_or_int_vec")]
    pub default_left: Vec<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_hessian: Option<Vec<f64>>,
}

fn bool_or_int_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrInt {
        Bool(bool),
        Int(i64),
    }

    let raw = Vec::<BoolOrInt>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|v| match v {
            BoolOrInt::Bool(b) => b,
            BoolOrInt::Int(i) => i != 0,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf {
        value: f64,
        cover: Option<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        default_left: bool,
        cover: Option<f64>,
    },
}

impl Node {
    pub fn cover(&self) -> Option<f64> {
        match self {
            Node::Leaf { cover, .. } | Node::Split { cover, .. } => *cover,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Validate a dump and build the tree. Node 0 is the root.
    pub fn from_dump(dump: &TreeDump, n_features: usize) -> Result<Self> {
        let n = dump.left_children.len();
        ensure!(n > 0, "tree has no nodes");
        ensure!(
            dump.right_children.len() == n
                && dump.split_indices.len() == n
                && dump.split_conditions.len() == n
                && dump.default_left.len() == n,
            "tree arrays have mismatched lengths"
        );
        if let Some(h) = &dump.sum_hessian {
            ensure!(h.len() == n, "sum_hessian has {} entries, expected {}", h.len(), n);
            ensure!(
                h.iter().all(|v| v.is_finite() && *v >= 0.0),
                "sum_hessian must be finite and non-negative"
            );
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let value = dump.split_conditions[i];
            ensure!(value.is_finite(), "node {} has a non-finite split condition", i);
            let cover = dump.sum_hessian.as_ref().map(|h| h[i]);
            let (l, r) = (dump.left_children[i], dump.right_children[i]);

            if l == -1 && r == -1 {
                nodes.push(Node::Leaf { value, cover });
                continue;
            }
            ensure!(l >= 0 && r >= 0, "node {} has only one child", i);
            let (left, right) = (l as usize, r as usize);
            ensure!(left < n && right < n, "node {} points outside the tree", i);
            let feature = dump.split_indices[i];
            ensure!(
                feature < n_features,
                "node {} splits on feature {} but the model has {} features",
                i,
                feature,
                n_features
            );
            nodes.push(Node::Split {
                feature,
                threshold: value,
                left,
                right,
                default_left: dump.default_left[i],
                cover,
            });
        }

        check_reachability(&nodes)?;
        Ok(Self { nodes })
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    /// Whether every node carries a positive cover, as attribution needs.
    pub fn has_cover(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n.cover(), Some(c) if c > 0.0))
    }

    /// Leaf value reached by `row`.
    pub fn predict(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split { .. } => idx = self.next_node(idx, row),
            }
        }
    }

    /// Child of split node `idx` that `row` follows. Non-finite values are
    /// treated as missing and take the default direction.
    pub fn next_node(&self, idx: usize, row: ArrayView1<f64>) -> usize {
        match &self.nodes[idx] {
            Node::Split {
                feature,
                threshold,
                left,
                right,
                default_left,
                ..
            } => {
                let x = row[*feature];
                let go_left = if x.is_finite() { x < *threshold } else { *default_left };
                if go_left {
                    *left
                } else {
                    *right
                }
            }
            Node::Leaf { .. } => idx,
        }
    }

    /// Cover-weighted mean leaf value. `None` without cover.
    pub fn expected_value(&self) -> Option<f64> {
        if !self.has_cover() {
            return None;
        }
        Some(self.expected_from(0))
    }

    fn expected_from(&self, idx: usize) -> f64 {
        match &self.nodes[idx] {
            Node::Leaf { value, .. } => *value,
            Node::Split {
                left, right, cover, ..
            } => {
                let (cl, cr) = (
                    self.nodes[*left].cover().unwrap_or(0.0),
                    self.nodes[*right].cover().unwrap_or(0.0),
                );
                let total = cover.unwrap_or(cl + cr);
                (cl * self.expected_from(*left) + cr * self.expected_from(*right)) / total
            }
        }
    }
}

fn check_reachability(nodes: &[Node]) -> Result<()> {
    let mut visited = vec![false; nodes.len()];
    let mut stack = vec![0usize];
    while let Some(idx) = stack.pop() {
        if visited[idx] {
            bail!("node {} is reachable more than once", idx);
        }
        visited[idx] = true;
        if let Node::Split { left, right, .. } = &nodes[idx] {
            stack.push(*right);
            stack.push(*left);
        }
    }
    if let Some(orphan) = visited.iter().position(|v| !v) {
        bail!("node {} is not reachable from the root", orphan);
    }
    Ok(())
}

/// Binary-logistic tree ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsemble {
    pub trees: Vec<RegressionTree>,
    /// Log-odds of the training base score.
    pub base_margin: f64,
    pub n_features: usize,
}

impl TreeEnsemble {
    pub fn new(trees: Vec<RegressionTree>, base_score: f64, n_features: usize) -> Result<Self> {
        ensure!(
            base_score > 0.0 && base_score < 1.0,
            "base_score must lie strictly between 0 and 1, got {}",
            base_score
        );
        ensure!(!trees.is_empty(), "ensemble has no trees");
        Ok(Self {
            trees,
            base_margin: (base_score / (1.0 - base_score)).ln(),
            n_features,
        })
    }

    pub fn margin(&self, row: ArrayView1<f64>) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Raw margins for every row, computed in parallel.
    pub fn predict_margin(&self, x: &Array2<f64>) -> Array1<f64> {
        let margins: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.margin(x.row(i)))
            .collect();
        Array1::from(margins)
    }

    pub fn has_cover(&self) -> bool {
        self.trees.iter().all(|t| t.has_cover())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn stump_dump() -> TreeDump {
        TreeDump {
            left_children: vec![1, 3, -1, -1, -1],
            right_children: vec![2, 4, -1, -1, -1],
            split_indices: vec![0, 1, 0, 0, 0],
            split_conditions: vec![3.0, 1.0, -0.4, 0.9, 0.2],
            default_left: vec![true, true, false, false, false],
            sum_hessian: Some(vec![200.0, 50.0, 150.0, 20.0, 30.0]),
        }
    }

    #[test]
    fn routes_rows_and_handles_missing() {
        let tree = RegressionTree::from_dump(&stump_dump(), 2).unwrap();
        assert_eq!(tree.predict(array![1.0, 0.0].view()), 0.9);
        assert_eq!(tree.predict(array![1.0, 1.0].view()), 0.2);
        assert_eq!(tree.predict(array![3.0, 0.0].view()), -0.4);
        assert_eq!(tree.predict(array![f64::NAN, f64::NAN].view()), 0.9);
    }

    #[test]
    fn expected_value_is_cover_weighted() {
        let tree = RegressionTree::from_dump(&stump_dump(), 2).unwrap();
        let e = tree.expected_value().unwrap();
        assert!((e - (-0.18)).abs() < 1e-12);

        let mut dump = stump_dump();
        dump.sum_hessian = None;
        let tree = RegressionTree::from_dump(&dump, 2).unwrap();
        assert!(!tree.has_cover());
        assert_eq!(tree.expected_value(), None);
    }

    #[test]
    fn default_left_accepts_integers() {
        let json = r#"{
            "left_children": [1, -1, -1], "right_children": [2, -1, -1],
            "split_indices": [0, 0, 0], "split_conditions": [0.5, 1.0, -1.0],
            "default_left": [1, 0, 0]
        }"#;
        let dump: TreeDump = serde_json::from_str(json).unwrap();
        assert_eq!(dump.default_left, vec![true, false, false]);
        assert!(dump.sum_hessian.is_none());
    }

    #[test]
    fn rejects_malformed_trees() {
        let mut dump = stump_dump();
        dump.split_indices[0] = 7;
        assert!(RegressionTree::from_dump(&dump, 2).is_err());

        let mut dump = stump_dump();
        dump.left_children[1] = 1;
        assert!(RegressionTree::from_dump(&dump, 2).is_err());

        let mut dump = stump_dump();
        dump.right_children.pop();
        assert!(RegressionTree::from_dump(&dump, 2).is_err());

        let mut dump = stump_dump();
        dump.left_children[2] = 3;
        assert!(RegressionTree::from_dump(&dump, 2).is_err());
    }

    #[test]
    fn ensemble_margin_adds_base_log_odds() {
        let tree = RegressionTree::from_dump(&stump_dump(), 2).unwrap();
        let ensemble = TreeEnsemble::new(vec![tree], 0.5, 2).unwrap();
        let margins = ensemble.predict_margin(&array![[1.0, 0.0], [5.0, 0.0]]);
        assert!((margins[0] - 0.9).abs() < 1e-12);
        assert!((margins[1] - (-0.4)).abs() < 1e-12);
        assert!(TreeEnsemble::new(vec![], 0.5, 2).is_err());
        assert!(TreeEnsemble::new(vec![RegressionTree::from_dump(&stump_dump(), 2).unwrap()], 1.0, 2).is_err());
    }
}
