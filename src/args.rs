use serde::Deserialize;
use std::fs;

/// Output objective. Dispatched with a `match` in the update drivers so the
/// inner training loop stays branch-predictable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loss {
    /// Negative sampling against a unigram^1/2 table.
    Ns,
    /// Hierarchical softmax over a Huffman coding tree.
    Hs,
    /// Full softmax over the output vocabulary.
    Softmax,
}

/// Training regime. `Sup` averages the scattered gradient over the input
/// bag; the unsupervised modes scatter it unscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Sup,
    Cbow,
    Sg,
}

/// Engine configuration loaded from a TOML or JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Args {
    /// Hidden (embedding) dimension.
    #[serde(default = "default_dim")]
    pub dim: usize,
    /// Output objective.
    #[serde(default = "default_loss")]
    pub loss: Loss,
    /// Training regime.
    #[serde(default = "default_model")]
    pub model: ModelKind,
    /// Number of negative samples per positive in `ns` mode.
    #[serde(default = "default_neg")]
    pub neg: usize,
    /// Context window half-width; attention parameters cover positions
    /// `-ws ..= ws`.
    #[serde(default = "default_ws")]
    pub ws: usize,
}

fn default_dim() -> usize {
    100
}

fn default_loss() -> Loss {
    Loss::Ns
}

fn default_model() -> ModelKind {
    ModelKind::Cbow
}

fn default_neg() -> usize {
    5
}

fn default_ws() -> usize {
    5
}

impl Default for Args {
    fn default() -> Self {
        Self {
            dim: default_dim(),
            loss: default_loss(),
            model: default_model(),
            neg: default_neg(),
            ws: default_ws(),
        }
    }
}

impl Args {
    /// Load configuration from the given path.  Supports TOML or JSON based
    /// on the file extension. Returns `None` if parsing fails.
    pub fn from_path(path: &str) -> Option<Self> {
        let Ok(content) = fs::read_to_string(path) else {
            return None;
        };
        if path.ends_with(".json") {
            serde_json::from_str(&content).ok()
        } else {
            toml::from_str(&content).ok()
        }
    }
}
