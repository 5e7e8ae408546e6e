//! JSON model files.
//!
//! Layer kinds are stored as their snake_case tag and resolved on load, so a file
//! naming a kind this crate does not know fails with `UnsupportedLayerKind` instead
//! of a generic parse error.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Layer, LayerKind, Mlp, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

/// On-disk form of an [`Mlp`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub format_version: u32,
    pub layers: Vec<LayerRecord>,
}

/// One layer of a [`ModelFile`]; `weights` is row-major `(out_dim, in_dim)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// Free-form label such as `pre` or `h0`; ignored on load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: String,
    pub in_dim: usize,
    pub out_dim: usize,
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

impl LayerRecord {
    fn into_layer(self, idx: usize) -> Result<Layer> {
        let kind = self.kind.parse::<LayerKind>().map_err(|e| match e {
            Error::UnsupportedLayerKind(tag) => {
                Error::UnsupportedLayerKind(format!("layer {idx}: {tag}"))
            }
            other => other,
        })?;
        Layer::from_parts(self.in_dim, self.out_dim, kind, self.weights, self.biases)
    }
}

impl From<&Layer> for LayerRecord {
    fn from(layer: &Layer) -> Self {
        Self {
            name: None,
            kind: layer.kind().to_string(),
            in_dim: layer.in_dim(),
            out_dim: layer.out_dim(),
            weights: layer.weights().to_vec(),
            biases: layer.biases().to_vec(),
        }
    }
}

impl From<&Mlp> for ModelFile {
    fn from(model: &Mlp) -> Self {
        let layers = model
            .layers()
            .iter()
            .enumerate()
            .map(|(i, layer)| LayerRecord {
                name: Some(default_layer_name(i, model.num_layers())),
                ..LayerRecord::from(layer)
            })
            .collect();
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers,
        }
    }
}

/// `h0, h1, ..` for hidden layers and `y` for the output layer.
fn default_layer_name(idx: usize, num_layers: usize) -> String {
    if idx + 1 == num_layers {
        "y".to_owned()
    } else {
        format!("h{idx}")
    }
}

impl TryFrom<ModelFile> for Mlp {
    type Error = Error;

    fn try_from(file: ModelFile) -> std::result::Result<Self, Self::Error> {
        if file.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "model file has format_version {}, this build reads {MODEL_FORMAT_VERSION}",
                file.format_version
            )));
        }
        let layers = file
            .layers
            .into_iter()
            .enumerate()
            .map(|(i, record)| record.into_layer(i))
            .collect::<Result<Vec<_>>>()?;
        Mlp::from_layers(layers)
    }
}

impl Mlp {
    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&ModelFile::from(self))
            .map_err(|e| Error::InvalidData(format!("cannot encode model: {e}")))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let file: ModelFile = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("malformed model file: {e}")))?;
        Self::try_from(file)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json_string_pretty()?;
        std::fs::write(path, json)
            .map_err(|e| Error::InvalidData(format!("cannot write {}: {e}", path.display())))
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidData(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }
}
