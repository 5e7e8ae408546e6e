//! Layer kinds.
//!
//! A layer computes a pre-activation `z = W x + b` and then applies the kind's
//! nonlinearity. The backward pass only knows the derivative rules of `Linear`,
//! `RectifiedLinear` and `PassThrough`; a `Softmax` may only be the output layer.
//! `Tanh` and `Sigmoid` run forward (so foreign model files load) but have no
//! backward rule here.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Linear,
    RectifiedLinear,
    /// Fixed affine preprocessing (e.g. standardization) embedded in the model.
    PassThrough,
    Softmax,
    Tanh,
    Sigmoid,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Linear => "linear",
            LayerKind::RectifiedLinear => "rectified_linear",
            LayerKind::PassThrough => "pass_through",
            LayerKind::Softmax => "softmax",
            LayerKind::Tanh => "tanh",
            LayerKind::Sigmoid => "sigmoid",
        }
    }

    /// Apply the nonlinearity to a full pre-activation vector in place.
    pub(crate) fn forward_in_place(self, z: &mut [f32]) {
        match self {
            LayerKind::Linear | LayerKind::PassThrough => {}
            LayerKind::RectifiedLinear => z.iter_mut().for_each(|v| *v = v.max(0.0)),
            LayerKind::Tanh => z.iter_mut().for_each(|v| *v = v.tanh()),
            LayerKind::Sigmoid => z.iter_mut().for_each(|v| *v = sigmoid(*v)),
            LayerKind::Softmax => softmax_in_place(z),
        }
    }

    /// Derivative of a hidden layer's activation at pre-activation `z`.
    pub(crate) fn derivative(self, z: f32) -> Result<f32> {
        match self {
            LayerKind::Linear | LayerKind::PassThrough => Ok(1.0),
            LayerKind::RectifiedLinear => Ok(if z > 0.0 { 1.0 } else { 0.0 }),
            LayerKind::Softmax | LayerKind::Tanh | LayerKind::Sigmoid => {
                Err(self.unsupported())
            }
        }
    }

    /// The legacy rule table: linear kinds return `z` itself rather than 1.
    pub(crate) fn literal_derivative(self, z: f32) -> Result<f32> {
        match self {
            LayerKind::Linear | LayerKind::PassThrough => Ok(z),
            other => other.derivative(z),
        }
    }

    fn unsupported(self) -> Error {
        Error::UnsupportedLayerKind(format!(
            "no backward rule for a hidden {} layer",
            self.as_str()
        ))
    }
}

impl FromStr for LayerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(LayerKind::Linear),
            "rectified_linear" => Ok(LayerKind::RectifiedLinear),
            "pass_through" => Ok(LayerKind::PassThrough),
            "softmax" => Ok(LayerKind::Softmax),
            "tanh" => Ok(LayerKind::Tanh),
            "sigmoid" => Ok(LayerKind::Sigmoid),
            other => Err(Error::UnsupportedLayerKind(other.to_owned())),
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

fn softmax_in_place(z: &mut [f32]) {
    let max = z.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0_f32;
    for v in z.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    let inv = 1.0 / sum;
    z.iter_mut().for_each(|v| *v *= inv);
}

/// `log(sum(exp(z)))`, shifted by the max for stability.
pub(crate) fn log_sum_exp(z: &[f32]) -> f32 {
    let max = z.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = z.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}
