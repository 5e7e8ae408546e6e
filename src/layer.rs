use rand::Rng;

use crate::{Error, LayerKind, Result, Standardizer};

/// A dense layer with a declared kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    kind: LayerKind,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    /// Build a layer from explicit parameters.
    ///
    /// Validates shapes and that all parameters are finite.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        kind: LayerKind,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::ShapeMismatch(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::ShapeMismatch(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "layer parameters must be finite".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            kind,
            weights,
            biases,
        })
    }

    /// Weights uniform in `[-irange, irange]`, biases zero.
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        kind: LayerKind,
        irange: f32,
        rng: &mut R,
    ) -> Result<Self> {
        if !(irange.is_finite() && irange > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "irange must be finite and > 0, got {irange}"
            )));
        }
        let weights = (0..in_dim * out_dim)
            .map(|_| rng.gen_range(-irange..=irange))
            .collect();
        Self::from_parts(in_dim, out_dim, kind, weights, vec![0.0; out_dim])
    }

    /// A fixed diagonal layer computing `(x - mean) / std`.
    pub fn pass_through(standardizer: &Standardizer) -> Self {
        let dim = standardizer.dim();
        let mut weights = vec![0.0; dim * dim];
        let mut biases = vec![0.0; dim];
        for (i, (&m, &s)) in standardizer
            .mean()
            .iter()
            .zip(standardizer.std())
            .enumerate()
        {
            weights[i * dim + i] = 1.0 / s;
            biases[i] = -m / s;
        }
        Self {
            in_dim: dim,
            out_dim: dim,
            kind: LayerKind::PassThrough,
            weights,
            biases,
        }
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    /// Row `o` of the weight matrix (the fan-in of output unit `o`).
    #[inline]
    pub fn weight_row(&self, o: usize) -> &[f32] {
        &self.weights[o * self.in_dim..(o + 1) * self.in_dim]
    }

    /// `z = W * inputs (+ b)`.
    ///
    /// Shape contract:
    /// - `inputs.len() == self.in_dim`
    /// - `out.len() == self.out_dim`
    #[inline]
    pub fn linear_into(&self, inputs: &[f32], with_bias: bool, out: &mut [f32]) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(out.len(), self.out_dim);

        for (o, z) in out.iter_mut().enumerate() {
            let mut sum = if with_bias { self.biases[o] } else { 0.0 };
            for (&w, &x) in self.weight_row(o).iter().zip(inputs) {
                sum = w.mul_add(x, sum);
            }
            *z = sum;
        }
    }

    /// Pre-activation `W * inputs + b`.
    pub fn pre_activation(&self, inputs: &[f32]) -> Vec<f32> {
        let mut z = vec![0.0; self.out_dim];
        self.linear_into(inputs, true, &mut z);
        z
    }

    /// Forward pass for a single sample: `kind(W * inputs + b)`.
    pub fn forward(&self, inputs: &[f32]) -> Vec<f32> {
        let mut y = self.pre_activation(inputs);
        self.kind.forward_in_place(&mut y);
        y
    }

    /// `W^T * d`, accumulated into a fresh `in_dim` vector.
    ///
    /// Shape contract: `d.len() == self.out_dim`.
    pub fn transpose_mul(&self, d: &[f32]) -> Vec<f32> {
        debug_assert_eq!(d.len(), self.out_dim);

        let mut out = vec![0.0; self.in_dim];
        for (o, &d_o) in d.iter().enumerate() {
            if d_o == 0.0 {
                continue;
            }
            for (acc, &w) in out.iter_mut().zip(self.weight_row(o)) {
                *acc = w.mul_add(d_o, *acc);
            }
        }
        out
    }
}
