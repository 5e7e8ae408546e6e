use crate::activation::log_sum_exp;
use crate::{Error, Layer, LayerKind, Result};

/// An ordered stack of dense layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    layers: Vec<Layer>,
}

impl Mlp {
    /// Assemble a model, checking that each layer's `in_dim` matches the previous
    /// layer's `out_dim`.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidConfig(
                "mlp must have at least one layer".to_owned(),
            ));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[1].in_dim() != pair[0].out_dim() {
                return Err(Error::ShapeMismatch(format!(
                    "layer {} in_dim {} does not match layer {i} out_dim {}",
                    i + 1,
                    pair[1].in_dim(),
                    pair[0].out_dim()
                )));
            }
        }
        Ok(Self { layers })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub(crate) fn check_input(&self, input: &[f32]) -> Result<()> {
        if input.len() != self.input_dim() {
            return Err(Error::ShapeMismatch(format!(
                "input len {} does not match model input_dim {}",
                input.len(),
                self.input_dim()
            )));
        }
        Ok(())
    }

    /// Forward pass returning the output of every layer, first to last.
    pub fn forward_all(&self, input: &[f32]) -> Result<Vec<Vec<f32>>> {
        self.check_input(input)?;

        let mut outputs: Vec<Vec<f32>> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let x = outputs.last().map(Vec::as_slice).unwrap_or(input);
            let y = layer.forward(x);
            outputs.push(y);
        }
        Ok(outputs)
    }

    /// Forward pass returning only the final output.
    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>> {
        let mut outputs = self.forward_all(input)?;
        outputs
            .pop()
            .ok_or_else(|| Error::InvalidConfig("mlp has no layers".to_owned()))
    }

    /// `log p(label | input)` for a model whose last layer is a softmax.
    ///
    /// Computed as `z[label] - logsumexp(z)` from the output pre-activation.
    pub fn log_prob(&self, input: &[f32], label: usize) -> Result<f32> {
        let last = self.softmax_output()?;
        if label >= last.out_dim() {
            return Err(Error::OutOfRange(format!(
                "label {label} is not one of the {} output classes",
                last.out_dim()
            )));
        }

        self.check_input(input)?;
        let mut x = input.to_vec();
        for layer in &self.layers[..self.layers.len() - 1] {
            x = layer.forward(&x);
        }
        let z = last.pre_activation(&x);
        Ok(z[label] - log_sum_exp(&z))
    }

    /// Index of the most probable output class.
    pub fn predict_class(&self, input: &[f32]) -> Result<usize> {
        let y = self.forward(input)?;
        Ok(y.iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            })
            .0)
    }

    /// The output layer, if it is a softmax classifier.
    pub(crate) fn softmax_output(&self) -> Result<&Layer> {
        let last = &self.layers[self.layers.len() - 1];
        if last.kind() != LayerKind::Softmax {
            return Err(Error::UnsupportedLayerKind(format!(
                "output layer must be softmax, found {}",
                last.kind()
            )));
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Mlp {
        let h = Layer::from_parts(
            2,
            2,
            LayerKind::RectifiedLinear,
            vec![1.0, 0.0, 0.0, -1.0],
            vec![0.0, 0.0],
        )
        .unwrap();
        let y = Layer::from_parts(
            2,
            3,
            LayerKind::Softmax,
            vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            vec![0.0, 0.0, -1.0],
        )
        .unwrap();
        Mlp::from_layers(vec![h, y]).unwrap()
    }

    #[test]
    fn rejects_mismatched_layers() {
        let a = Layer::from_parts(2, 3, LayerKind::Linear, vec![0.0; 6], vec![0.0; 3]).unwrap();
        let b = Layer::from_parts(2, 1, LayerKind::Softmax, vec![0.0; 2], vec![0.0]).unwrap();
        assert!(matches!(
            Mlp::from_layers(vec![a, b]),
            Err(Error::ShapeMismatch(_))
        ));
        assert!(Mlp::from_layers(vec![]).is_err());
    }

    #[test]
    fn forward_all_captures_every_layer() {
        let m = model();
        let outs = m.forward_all(&[2.0, 3.0]).unwrap();
        assert_eq!(outs.len(), 2);
        // ReLU([2, -3]) = [2, 0]
        assert_eq!(outs[0], vec![2.0, 0.0]);
        let sum: f32 = outs[1].iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert_eq!(m.predict_class(&[2.0, 3.0]).unwrap(), 0);
    }

    #[test]
    fn log_prob_matches_softmax_output() {
        let m = model();
        let x = [0.7_f32, -0.2];
        let p = m.forward(&x).unwrap();
        for (label, &p_label) in p.iter().enumerate() {
            let lp = m.log_prob(&x, label).unwrap();
            assert!((lp - p_label.ln()).abs() < 1e-5);
        }
        assert!(matches!(m.log_prob(&x, 3), Err(Error::OutOfRange(_))));
        assert!(matches!(m.log_prob(&[0.0], 0), Err(Error::ShapeMismatch(_))));
    }
}
