use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Column order the model was trained with. Artifacts must declare the same
/// names in the same order or they are rejected at load time.
pub const FEATURE_NAMES: [&str; 5] = [
    "storage_temperature",
    "storage_duration",
    "texture",
    "microbial_load",
    "weight_loss",
];

const LEAF: i32 = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionInput {
    pub storage_temperature: f64,
    pub storage_duration: i64,
    pub texture: f64,
    pub microbial_load: f64,
    pub weight_loss: f64,
}

impl PredictionInput {
    pub fn to_features(&self) -> [f64; 5] {
        [
            self.storage_temperature,
            self.storage_duration as f64,
            self.texture,
            self.microbial_load,
            self.weight_loss,
        ]
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("model path must be a file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("model read error: {0}")]
    Read(#[from] std::io::Error),
    #[error("model parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid model: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeNode {
    pub feature: usize,
    pub threshold: f64,
    pub left: i32,
    pub right: i32,
    pub value: f64,
}

impl TreeNode {
    fn is_leaf(&self) -> bool {
        self.left == LEAF && self.right == LEAF
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Walks the tree from the root. Samples with `feature <= threshold`
    /// descend left, everything else (including NaN) descends right.
    fn predict(&self, features: &[f64; 5]) -> f64 {
        let mut index = 0usize;
        loop {
            let node = &self.nodes[index];
            if node.is_leaf() {
                return node.value;
            }
            index = if features[node.feature] <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }
}

/// Random-forest regressor deserialized from a JSON artifact. Loaded once at
/// startup and read-only afterwards; prediction is the mean of the per-tree
/// leaf values.
#[derive(Debug, Clone, Deserialize)]
pub struct ForestModel {
    pub feature_names: Vec<String>,
    pub trees: Vec<DecisionTree>,
}

impl ForestModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }

        if path.is_dir() {
            return Err(ModelError::NotAFile(path.to_path_buf()));
        }

        let data = std::fs::read(path)?;
        let model: ForestModel = serde_json::from_slice(&data)?;
        model.validate()?;
        Ok(model)
    }

    /// Structural checks done once at load time so `predict` cannot index out
    /// of bounds or loop forever on a malformed artifact.
    fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Invalid("model has no trees".to_string()));
        }

        if self.feature_names.len() != FEATURE_NAMES.len()
            || self
                .feature_names
                .iter()
                .zip(FEATURE_NAMES.iter())
                .any(|(actual, expected)| actual != expected)
        {
            return Err(ModelError::Invalid(format!(
                "feature names {:?} do not match expected {:?}",
                self.feature_names, FEATURE_NAMES
            )));
        }

        for (tree_index, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ModelError::Invalid(format!(
                    "tree {} has no nodes",
                    tree_index
                )));
            }

            let node_count = tree.nodes.len() as i32;
            for (node_index, node) in tree.nodes.iter().enumerate() {
                if node.is_leaf() {
                    if !node.value.is_finite() {
                        return Err(ModelError::Invalid(format!(
                            "tree {} node {} has non-finite leaf value",
                            tree_index, node_index
                        )));
                    }
                    continue;
                }

                if node.left == LEAF || node.right == LEAF {
                    return Err(ModelError::Invalid(format!(
                        "tree {} node {} mixes leaf and split children",
                        tree_index, node_index
                    )));
                }

                if node.feature >= FEATURE_NAMES.len() {
                    return Err(ModelError::Invalid(format!(
                        "tree {} node {} splits on unknown feature {}",
                        tree_index, node_index, node.feature
                    )));
                }

                if !node.threshold.is_finite() {
                    return Err(ModelError::Invalid(format!(
                        "tree {} node {} has non-finite threshold",
                        tree_index, node_index
                    )));
                }

                // Children must come after their parent in the node array,
                // which rules out cycles.
                let parent = node_index as i32;
                for child in [node.left, node.right] {
                    if child <= parent || child >= node_count {
                        return Err(ModelError::Invalid(format!(
                            "tree {} node {} has out-of-range child {}",
                            tree_index, node_index, child
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn predict(&self, input: &PredictionInput) -> Result<f64, ModelError> {
        let features = input.to_features();

        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.predict(&features);
        }

        let prediction = total / self.trees.len() as f64;
        if !prediction.is_finite() {
            return Err(ModelError::Invalid(format!(
                "prediction is not finite: {}",
                prediction
            )));
        }

        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn leaf(value: f64) -> TreeNode {
        TreeNode {
            feature: 0,
            threshold: 0.0,
            left: LEAF,
            right: LEAF,
            value,
        }
    }

    fn split(feature: usize, threshold: f64, left: i32, right: i32) -> TreeNode {
        TreeNode {
            feature,
            threshold,
            left,
            right,
            value: 0.0,
        }
    }

    fn sample_input() -> PredictionInput {
        PredictionInput {
            storage_temperature: 4.0,
            storage_duration: 10,
            texture: 0.0,
            microbial_load: 0.0,
            weight_loss: 2.5,
        }
    }

    fn two_tree_forest() -> ForestModel {
        // Tree 1 splits on storage_temperature at 8.0, tree 2 is a stump.
        ForestModel {
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            trees: vec![
                DecisionTree {
                    nodes: vec![split(0, 8.0, 1, 2), leaf(12.0), leaf(4.0)],
                },
                DecisionTree {
                    nodes: vec![leaf(10.0)],
                },
            ],
        }
    }

    #[test]
    fn prediction_is_mean_of_tree_outputs() {
        let model = two_tree_forest();
        let prediction = model.predict(&sample_input()).unwrap();
        assert_eq!(prediction, (12.0 + 10.0) / 2.0);
    }

    #[test]
    fn split_routes_boundary_to_left_child() {
        let model = two_tree_forest();
        let mut input = sample_input();

        input.storage_temperature = 8.0;
        assert_eq!(model.predict(&input).unwrap(), 11.0);

        input.storage_temperature = 8.1;
        assert_eq!(model.predict(&input).unwrap(), 7.0);
    }

    #[test]
    fn prediction_is_deterministic() {
        let model = two_tree_forest();
        let input = sample_input();
        let first = model.predict(&input).unwrap();
        let second = model.predict(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn storage_duration_participates_as_float_feature() {
        let model = ForestModel {
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            trees: vec![DecisionTree {
                nodes: vec![split(1, 7.0, 1, 2), leaf(20.0), leaf(5.0)],
            }],
        };

        let mut input = sample_input();
        input.storage_duration = 7;
        assert_eq!(model.predict(&input).unwrap(), 20.0);

        input.storage_duration = 8;
        assert_eq!(model.predict(&input).unwrap(), 5.0);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = ForestModel::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(error, ModelError::NotFound(_)));
    }

    #[test]
    fn load_rejects_directory_path() {
        let dir = tempfile::tempdir().unwrap();
        let error = ForestModel::load(dir.path()).unwrap_err();
        assert!(matches!(error, ModelError::NotAFile(_)));
    }

    #[test]
    fn load_reports_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        let error = ForestModel::load(file.path()).unwrap_err();
        assert!(matches!(error, ModelError::Parse(_)));
    }

    #[test]
    fn load_rejects_empty_forest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"feature_names":["storage_temperature","storage_duration","texture","microbial_load","weight_loss"],"trees":[]}"#,
        )
        .unwrap();
        let error = ForestModel::load(file.path()).unwrap_err();
        assert!(matches!(error, ModelError::Invalid(_)));
    }

    #[test]
    fn load_rejects_wrong_feature_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"feature_names":["a","b","c","d","e"],"trees":[{"nodes":[{"feature":0,"threshold":0.0,"left":-1,"right":-1,"value":1.0}]}]}"#,
        )
        .unwrap();
        let error = ForestModel::load(file.path()).unwrap_err();
        assert!(matches!(error, ModelError::Invalid(_)));
    }

    #[test]
    fn load_accepts_valid_artifact() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"feature_names":["storage_temperature","storage_duration","texture","microbial_load","weight_loss"],"trees":[{"nodes":[{"feature":0,"threshold":6.0,"left":1,"right":2,"value":0.0},{"feature":0,"threshold":0.0,"left":-1,"right":-1,"value":9.0},{"feature":0,"threshold":0.0,"left":-1,"right":-1,"value":3.0}]}]}"#,
        )
        .unwrap();

        let model = ForestModel::load(file.path()).unwrap();
        assert_eq!(model.trees.len(), 1);
        assert_eq!(model.predict(&sample_input()).unwrap(), 9.0);
    }

    #[test]
    fn validate_rejects_out_of_range_child() {
        let model = ForestModel {
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            trees: vec![DecisionTree {
                nodes: vec![split(0, 1.0, 1, 5), leaf(1.0)],
            }],
        };
        assert!(matches!(model.validate(), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_backward_child_reference() {
        let model = ForestModel {
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            trees: vec![DecisionTree {
                nodes: vec![split(0, 1.0, 1, 2), split(0, 1.0, 0, 2), leaf(1.0)],
            }],
        };
        assert!(matches!(model.validate(), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_unknown_feature_index() {
        let model = ForestModel {
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            trees: vec![DecisionTree {
                nodes: vec![split(9, 1.0, 1, 2), leaf(1.0), leaf(2.0)],
            }],
        };
        assert!(matches!(model.validate(), Err(ModelError::Invalid(_))));
    }
}
