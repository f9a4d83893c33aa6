//! JSON classifier artifacts and the model families they describe.

use ndarray::{Array1, ArrayView1};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::{ArtifactError, Classifier};

/// On-disk classifier description
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
        #[serde(default)]
        training_run: Option<String>,
    },
    LinearSvm {
        coefficients: Vec<f64>,
        intercept: f64,
        #[serde(default)]
        training_run: Option<String>,
    },
    RandomForest {
        n_features: usize,
        trees: Vec<TreeArtifact>,
        #[serde(default)]
        training_run: Option<String>,
    },
    NearestCentroid {
        /// Class 0 centroid followed by class 1 centroid
        centroids: Vec<Vec<f64>>,
        #[serde(default)]
        training_run: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeArtifact {
    pub nodes: Vec<TreeNode>,
}

/// Node of a fitted decision tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// Go `left` when `x[feature] <= threshold`, else `right`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Weighted training counts per class
    Leaf { value: [f64; 2] },
}

/// Read and parse a JSON artifact, mapping failures onto [`ArtifactError`]
pub(crate) fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    if !path.exists() {
        return Err(ArtifactError::NotFound(path.to_path_buf()));
    }
    let corrupt = |reason: String| ArtifactError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))
}

/// Load a classifier artifact from disk
pub fn load_classifier(path: &Path) -> Result<Box<dyn Classifier>, ArtifactError> {
    let artifact: ModelArtifact = read_artifact(path)?;
    let classifier = build_classifier(artifact).map_err(|reason| ArtifactError::Corrupt {
        path: path.to_path_buf(),
        reason,
    })?;
    info!(
        "Loaded {} classifier ({} features) from {}",
        classifier.kind(),
        classifier.n_features(),
        path.display()
    );
    Ok(classifier)
}

/// Validate an artifact and turn it into a ready classifier
pub fn build_classifier(artifact: ModelArtifact) -> Result<Box<dyn Classifier>, String> {
    Ok(match artifact {
        ModelArtifact::LogisticRegression {
            coefficients,
            intercept,
            training_run,
        } => Box::new(LinearClassifier::new(
            coefficients,
            intercept,
            true,
            training_run,
        )?),
        ModelArtifact::LinearSvm {
            coefficients,
            intercept,
            training_run,
        } => Box::new(LinearClassifier::new(
            coefficients,
            intercept,
            false,
            training_run,
        )?),
        ModelArtifact::RandomForest {
            n_features,
            trees,
            training_run,
        } => Box::new(ForestClassifier::new(n_features, trees, training_run)?),
        ModelArtifact::NearestCentroid {
            centroids,
            training_run,
        } => Box::new(NearestCentroidClassifier::new(centroids, training_run)?),
    })
}

fn check_finite(values: &[f64], what: &str) -> Result<(), String> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(format!("{} contains non-finite values", what))
    }
}

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Linear model `w·x + b`; logistic regression also exposes probabilities
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    weights: Array1<f64>,
    intercept: f64,
    probabilistic: bool,
    training_run: Option<String>,
}

impl LinearClassifier {
    pub fn new(
        coefficients: Vec<f64>,
        intercept: f64,
        probabilistic: bool,
        training_run: Option<String>,
    ) -> Result<Self, String> {
        if coefficients.is_empty() {
            return Err("linear model has no coefficients".to_string());
        }
        check_finite(&coefficients, "coefficients")?;
        check_finite(&[intercept], "intercept")?;
        Ok(Self {
            weights: Array1::from(coefficients),
            intercept,
            probabilistic,
            training_run,
        })
    }

    fn score(&self, x: &[f64]) -> f64 {
        self.weights.dot(&ArrayView1::from(x)) + self.intercept
    }
}

impl Classifier for LinearClassifier {
    fn kind(&self) -> &'static str {
        if self.probabilistic {
            "logistic_regression"
        } else {
            "linear_svm"
        }
    }

    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn training_run(&self) -> Option<&str> {
        self.training_run.as_deref()
    }

    fn supports_probability(&self) -> bool {
        self.probabilistic
    }

    fn supports_decision_function(&self) -> bool {
        true
    }

    fn predict_probability(&self, x: &[f64]) -> Option<f64> {
        self.probabilistic.then(|| logistic(self.score(x)))
    }

    fn decision_function(&self, x: &[f64]) -> Option<f64> {
        Some(self.score(x))
    }

    fn predict_label(&self, x: &[f64]) -> u8 {
        u8::from(self.score(x) > 0.0)
    }
}

/// Averaged class fractions over a set of decision trees
#[derive(Debug, Clone)]
pub struct ForestClassifier {
    n_features: usize,
    trees: Vec<Vec<TreeNode>>,
    training_run: Option<String>,
}

impl ForestClassifier {
    pub fn new(
        n_features: usize,
        trees: Vec<TreeArtifact>,
        training_run: Option<String>,
    ) -> Result<Self, String> {
        if n_features == 0 {
            return Err("forest has zero features".to_string());
        }
        if trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (t, tree) in trees.iter().enumerate() {
            validate_tree(&tree.nodes, n_features).map_err(|e| format!("tree {}: {}", t, e))?;
        }
        debug!("Forest validated: {} trees", trees.len());
        Ok(Self {
            n_features,
            trees: trees.into_iter().map(|t| t.nodes).collect(),
            training_run,
        })
    }

    fn tree_probability(nodes: &[TreeNode], x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { value } => return value[1] / (value[0] + value[1]),
            }
        }
    }
}

/// Children must point strictly forward so traversal always terminates
fn validate_tree(nodes: &[TreeNode], n_features: usize) -> Result<(), String> {
    if nodes.is_empty() {
        return Err("no nodes".to_string());
    }
    for (i, node) in nodes.iter().enumerate() {
        match node {
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature >= n_features {
                    return Err(format!("node {} splits on feature {} of {}", i, feature, n_features));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {} has a non-finite threshold", i));
                }
                for child in [left, right] {
                    if *child <= i || *child >= nodes.len() {
                        return Err(format!("node {} has invalid child {}", i, child));
                    }
                }
            }
            TreeNode::Leaf { value } => {
                if value.iter().any(|v| !v.is_finite() || *v < 0.0) || value[0] + value[1] <= 0.0 {
                    return Err(format!("node {} has invalid leaf counts {:?}", i, value));
                }
            }
        }
    }
    Ok(())
}

impl Classifier for ForestClassifier {
    fn kind(&self) -> &'static str {
        "random_forest"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn training_run(&self) -> Option<&str> {
        self.training_run.as_deref()
    }

    fn supports_probability(&self) -> bool {
        true
    }

    fn predict_probability(&self, x: &[f64]) -> Option<f64> {
        let total: f64 = self
            .trees
            .iter()
            .map(|nodes| Self::tree_probability(nodes, x))
            .sum();
        Some(total / self.trees.len() as f64)
    }

    fn predict_label(&self, x: &[f64]) -> u8 {
        u8::from(self.predict_probability(x).is_some_and(|p| p > 0.5))
    }
}

/// Assigns the class of the closest centroid; offers no score
#[derive(Debug, Clone)]
pub struct NearestCentroidClassifier {
    centroids: [Array1<f64>; 2],
    training_run: Option<String>,
}

impl NearestCentroidClassifier {
    pub fn new(centroids: Vec<Vec<f64>>, training_run: Option<String>) -> Result<Self, String> {
        let [healthy, at_risk]: [Vec<f64>; 2] = centroids
            .try_into()
            .map_err(|c: Vec<Vec<f64>>| format!("expected 2 centroids, found {}", c.len()))?;
        if healthy.is_empty() || healthy.len() != at_risk.len() {
            return Err("centroids must be non-empty and of equal length".to_string());
        }
        check_finite(&healthy, "centroid 0")?;
        check_finite(&at_risk, "centroid 1")?;
        Ok(Self {
            centroids: [Array1::from(healthy), Array1::from(at_risk)],
            training_run,
        })
    }
}

impl Classifier for NearestCentroidClassifier {
    fn kind(&self) -> &'static str {
        "nearest_centroid"
    }

    fn n_features(&self) -> usize {
        self.centroids[0].len()
    }

    fn training_run(&self) -> Option<&str> {
        self.training_run.as_deref()
    }

    fn predict_label(&self, x: &[f64]) -> u8 {
        let x = ArrayView1::from(x);
        let dist = |c: &Array1<f64>| (&x - c).mapv(|d| d * d).sum();
        // Equidistant points fall to class 0
        u8::from(dist(&self.centroids[1]) < dist(&self.centroids[0]))
    }
}
