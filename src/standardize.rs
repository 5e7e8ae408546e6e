//! Per-feature standardization of flattened windows: `(x - mean) / std`.

use crate::space::{Batch, BatchTransform, Space};
use crate::{DatasetConfig, Error, Result};

/// Fixed mean/std statistics over the flattened sample dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Standardizer {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        if mean.is_empty() {
            return Err(Error::InvalidConfig(
                "standardizer mean must not be empty".to_owned(),
            ));
        }
        if mean.len() != std.len() {
            return Err(Error::InvalidConfig(format!(
                "standardizer mean has len {} but std has len {}",
                mean.len(),
                std.len()
            )));
        }
        if let Some(i) = mean.iter().position(|m| !m.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "standardizer mean[{i}] is not finite"
            )));
        }
        if let Some(i) = std.iter().position(|s| !(s.is_finite() && *s != 0.0)) {
            return Err(Error::InvalidConfig(format!(
                "standardizer std[{i}] = {} must be finite and non-zero",
                std[i]
            )));
        }
        Ok(Self { mean, std })
    }

    pub fn from_config(cfg: &DatasetConfig) -> Result<Self> {
        let stats = cfg.standardizer_stats()?;
        Self::new(stats.mean, stats.std)
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    #[inline]
    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    #[inline]
    pub fn std(&self) -> &[f32] {
        &self.std
    }

    #[inline]
    pub fn input_space(&self) -> Space {
        Space::Vector { dim: self.dim() }
    }

    #[inline]
    pub fn output_space(&self) -> Space {
        self.input_space()
    }

    /// Standardize every example of `batch`; the input is left untouched.
    pub fn apply(&self, batch: &Batch) -> Result<Batch> {
        self.map_rows(batch, |x, m, s| (x - m) / s)
    }

    /// Undo [`Standardizer::apply`]: `x * std + mean`.
    pub fn invert(&self, batch: &Batch) -> Result<Batch> {
        self.map_rows(batch, |x, m, s| x.mul_add(s, m))
    }

    fn map_rows(&self, batch: &Batch, f: impl Fn(f32, f32, f32) -> f32) -> Result<Batch> {
        self.input_space().validate(batch)?;

        let mut out = Vec::with_capacity(batch.data().len());
        for example in batch.data().chunks_exact(self.dim()) {
            out.extend(
                example
                    .iter()
                    .zip(&self.mean)
                    .zip(&self.std)
                    .map(|((&x, &m), &s)| f(x, m, s)),
            );
        }
        Batch::new(out, batch.shape().to_vec())
    }
}

impl BatchTransform for Standardizer {
    fn apply(&self, batch: &Batch) -> Result<Batch> {
        Standardizer::apply(self, batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standardizer() -> Standardizer {
        Standardizer::new(vec![1.0, -2.0, 0.5], vec![2.0, 0.5, 4.0]).unwrap()
    }

    #[test]
    fn apply_then_invert_round_trips() {
        let s = standardizer();
        let x = Batch::from_matrix(vec![3.0, -1.0, 0.5, -7.25, 10.0, 2.0], 3).unwrap();
        let z = s.apply(&x).unwrap();
        assert_eq!(z.shape(), x.shape());
        assert_eq!(&z.data()[..3], &[1.0, 2.0, 0.0]);

        let back = s.invert(&z).unwrap();
        for (a, b) in back.data().iter().zip(x.data()) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn mismatched_width_is_a_shape_error() {
        let s = standardizer();
        let x = Batch::from_matrix(vec![0.0; 8], 4).unwrap();
        assert!(matches!(s.apply(&x), Err(Error::ShapeMismatch(_))));
        assert!(matches!(s.invert(&x), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn zero_or_nan_std_is_rejected() {
        assert!(Standardizer::new(vec![0.0, 0.0], vec![1.0, 0.0]).is_err());
        assert!(Standardizer::new(vec![0.0], vec![f32::NAN]).is_err());
        assert!(Standardizer::new(vec![0.0], vec![1.0, 1.0]).is_err());
        assert!(Standardizer::new(vec![], vec![]).is_err());
    }

    #[test]
    fn works_as_a_batch_transform() {
        let s = standardizer();
        let t: &dyn BatchTransform = &s;
        let x = Batch::from_matrix(vec![1.0, -2.0, 0.5], 3).unwrap();
        assert_eq!(t.apply(&x).unwrap().data(), &[0.0, 0.0, 0.0]);
    }
}
