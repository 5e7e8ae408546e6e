//! Model builder.
//!
//! Layers are declared by output size and kind; weights are drawn uniformly from
//! `[-irange, irange]` and biases start at zero.
//!
//! ```rust
//! use frame_window::{LayerKind, MlpBuilder};
//!
//! # fn main() -> frame_window::Result<()> {
//! let mlp = MlpBuilder::new(100)?
//!     .add_layer(513, LayerKind::Linear)?
//!     .add_layer(50, LayerKind::RectifiedLinear)?
//!     .add_layer(10, LayerKind::Softmax)?
//!     .build_with_seed(0)?;
//! assert_eq!(mlp.output_dim(), 10);
//! # Ok(())
//! # }
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Error, Layer, LayerKind, Mlp, Result, Standardizer};

/// Default half-width of the uniform weight initializer.
pub const DEFAULT_IRANGE: f32 = 0.1;

#[derive(Debug, Clone)]
enum LayerSpec {
    Dense {
        out_dim: usize,
        kind: LayerKind,
        irange: f32,
    },
    Fixed(Layer),
}

#[derive(Debug, Clone)]
pub struct MlpBuilder {
    input_dim: usize,
    out_dim: usize,
    irange: f32,
    layers: Vec<LayerSpec>,
}

impl MlpBuilder {
    /// Start building an MLP that accepts inputs of length `input_dim`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            out_dim: input_dim,
            irange: DEFAULT_IRANGE,
            layers: Vec::new(),
        })
    }

    /// Set the initializer range for layers added after this call.
    pub fn irange(mut self, irange: f32) -> Result<Self> {
        if !(irange.is_finite() && irange > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "irange must be finite and > 0, got {irange}"
            )));
        }
        self.irange = irange;
        Ok(self)
    }

    /// Add a randomly initialized dense layer.
    pub fn add_layer(mut self, out_dim: usize, kind: LayerKind) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer out_dim must be > 0".to_owned()));
        }
        self.layers.push(LayerSpec::Dense {
            out_dim,
            kind,
            irange: self.irange,
        });
        self.out_dim = out_dim;
        Ok(self)
    }

    /// Add a fixed standardization layer at the current position.
    pub fn add_pass_through(mut self, standardizer: &Standardizer) -> Result<Self> {
        if standardizer.dim() != self.out_dim {
            return Err(Error::ShapeMismatch(format!(
                "standardizer dim {} does not match previous output dim {}",
                standardizer.dim(),
                self.out_dim
            )));
        }
        self.layers.push(LayerSpec::Fixed(Layer::pass_through(standardizer)));
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Mlp> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Mlp> {
        let mut layers = Vec::with_capacity(self.layers.len());
        let mut in_dim = self.input_dim;
        for spec in self.layers {
            let layer = match spec {
                LayerSpec::Dense {
                    out_dim,
                    kind,
                    irange,
                } => Layer::new_with_rng(in_dim, out_dim, kind, irange, rng)?,
                LayerSpec::Fixed(layer) => layer,
            };
            in_dim = layer.out_dim();
            layers.push(layer);
        }
        Mlp::from_layers(layers)
    }
}
