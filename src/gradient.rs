//! Hand-written backward pass for `d log p(label | x) / d x`.
//!
//! The model must end in a softmax layer and every hidden layer must be `Linear`,
//! `RectifiedLinear` or `PassThrough`. With `h` the input of the softmax layer and
//! `p` its output, the signal at `h` is
//!
//! ```text
//! d log p_label / d h = W_out[label, :] - sum_k p_k * W_out[k, :]
//! ```
//!
//! and each hidden layer below turns the signal `g` at its output into
//! `W^T (f'(z) * g)` at its input.

use crate::{Error, Mlp, Result};

/// Which backward loop to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackwardMode {
    /// Visit every hidden layer, use `z = W x + b` and a derivative of 1 for linear
    /// kinds. The result is the gradient with respect to the model input.
    #[default]
    Corrected,
    /// The legacy analysis loop: stops before the first layer, drops the bias from
    /// `z`, and multiplies by `z` itself for linear kinds. Its result has the first
    /// layer's output width.
    Literal,
}

/// Gradient of `log p(label | input)` with respect to the input.
pub fn input_gradient(
    model: &Mlp,
    input: &[f32],
    label: usize,
    mode: BackwardMode,
) -> Result<Vec<f32>> {
    let out = model.softmax_output()?;
    if label >= out.out_dim() {
        return Err(Error::OutOfRange(format!(
            "label {label} is not one of the {} output classes",
            out.out_dim()
        )));
    }

    let activations = model.forward_all(input)?;
    let layers = model.layers();
    let last = layers.len() - 1;

    // Signal at the input of the softmax layer.
    let p = &activations[last];
    let mut grad = out.weight_row(label).to_vec();
    for (k, &p_k) in p.iter().enumerate() {
        for (g, &w) in grad.iter_mut().zip(out.weight_row(k)) {
            *g = (-p_k).mul_add(w, *g);
        }
    }

    let first = match mode {
        BackwardMode::Corrected => 0,
        BackwardMode::Literal => 1,
    };
    for n in (first..last).rev() {
        let layer = &layers[n];
        let x = if n == 0 {
            input
        } else {
            activations[n - 1].as_slice()
        };

        let mut z = vec![0.0; layer.out_dim()];
        layer.linear_into(x, mode == BackwardMode::Corrected, &mut z);
        for (z_o, &g_o) in z.iter_mut().zip(&grad) {
            let d = match mode {
                BackwardMode::Corrected => layer.kind().derivative(*z_o),
                BackwardMode::Literal => layer.kind().literal_derivative(*z_o),
            }
            .map_err(|e| match e {
                Error::UnsupportedLayerKind(msg) => {
                    Error::UnsupportedLayerKind(format!("layer {n}: {msg}"))
                }
                other => other,
            })?;
            *z_o = d * g_o;
        }
        grad = layer.transpose_mul(&z);
    }

    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Layer, LayerKind};

    fn linear_softmax() -> Mlp {
        let pre = Layer::from_parts(
            2,
            2,
            LayerKind::Linear,
            vec![1.0, 2.0, -1.0, 0.5],
            vec![0.3, -0.3],
        )
        .unwrap();
        let out = Layer::from_parts(
            2,
            3,
            LayerKind::Softmax,
            vec![1.0, 0.0, 0.0, 1.0, -1.0, 1.0],
            vec![0.0; 3],
        )
        .unwrap();
        Mlp::from_layers(vec![pre, out]).unwrap()
    }

    #[test]
    fn linear_then_softmax_matches_closed_form() {
        let m = linear_softmax();
        let x = [0.2_f32, -0.4];
        let p = m.forward(&x).unwrap();
        let label = 2;

        // d/dh = W_out[label] - p^T W_out; d/dx = W_pre^T d/dh.
        let w_out = [[1.0_f32, 0.0], [0.0, 1.0], [-1.0, 1.0]];
        let mut dh = w_out[label];
        for k in 0..3 {
            dh[0] -= p[k] * w_out[k][0];
            dh[1] -= p[k] * w_out[k][1];
        }
        let expected = [dh[0] - dh[1], 2.0 * dh[0] + 0.5 * dh[1]];

        let g = input_gradient(&m, &x, label, BackwardMode::Corrected).unwrap();
        assert_eq!(g.len(), 2);
        for (a, b) in g.iter().zip(expected) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn dead_relu_blocks_the_signal() {
        let h = Layer::from_parts(
            1,
            2,
            LayerKind::RectifiedLinear,
            vec![1.0, -1.0],
            vec![0.0, 0.0],
        )
        .unwrap();
        let out = Layer::from_parts(2, 2, LayerKind::Softmax, vec![1.0, 0.0, 0.0, 5.0], vec![0.0; 2])
            .unwrap();
        let m = Mlp::from_layers(vec![h, out]).unwrap();

        // For x > 0 only the first unit is alive, so the second column of W_out
        // cannot matter; only d/dh[0] flows back through weight 1.
        let x = [0.5_f32];
        let p = m.forward(&x).unwrap();
        let g = input_gradient(&m, &x, 0, BackwardMode::Corrected).unwrap();
        assert!((g[0] - (1.0 - p[0])).abs() < 1e-5);
    }

    #[test]
    fn literal_mode_stops_at_the_first_layer_output() {
        let m = linear_softmax();
        let g = input_gradient(&m, &[0.2, -0.4], 0, BackwardMode::Literal).unwrap();
        // Nothing below the softmax is visited: the signal stays at the width of the
        // first layer's output.
        assert_eq!(g.len(), m.layers()[0].out_dim());
    }

    #[test]
    fn unsupported_kinds_fail() {
        let tanh = Layer::from_parts(1, 1, LayerKind::Tanh, vec![1.0], vec![0.0]).unwrap();
        let out = Layer::from_parts(1, 2, LayerKind::Softmax, vec![1.0, -1.0], vec![0.0; 2]).unwrap();
        let m = Mlp::from_layers(vec![tanh, out]).unwrap();
        assert!(matches!(
            input_gradient(&m, &[0.1], 0, BackwardMode::Corrected),
            Err(Error::UnsupportedLayerKind(ref msg)) if msg.contains("tanh")
        ));

        let relu =
            Layer::from_parts(1, 2, LayerKind::RectifiedLinear, vec![1.0, 1.0], vec![0.0; 2]).unwrap();
        let no_softmax = Mlp::from_layers(vec![relu]).unwrap();
        assert!(matches!(
            input_gradient(&no_softmax, &[0.1], 0, BackwardMode::Corrected),
            Err(Error::UnsupportedLayerKind(_))
        ));
    }

    #[test]
    fn bad_label_and_input_fail() {
        let m = linear_softmax();
        assert!(matches!(
            input_gradient(&m, &[0.0, 0.0], 3, BackwardMode::Corrected),
            Err(Error::OutOfRange(_))
        ));
        assert!(matches!(
            input_gradient(&m, &[0.0], 0, BackwardMode::Corrected),
            Err(Error::ShapeMismatch(_))
        ));
    }
}
