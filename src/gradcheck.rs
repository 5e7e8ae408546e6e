//! Numerical checks for [`input_gradient`].
//!
//! `uniform_difference` shifts every input coordinate by the same `eps` at once, so it
//! estimates the directional derivative along the all-ones vector; it is compared
//! against the sum of the analytic gradient. `finite_difference` does one central
//! difference per coordinate.

use crate::gradient::{input_gradient, BackwardMode};
use crate::{Error, Mlp, Result};

fn check_eps(eps: f32) -> Result<()> {
    if !(eps.is_finite() && eps > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "eps must be finite and > 0, got {eps}"
        )));
    }
    Ok(())
}

/// `(log p(x + eps) - log p(x - eps)) / 2 eps`, with `eps` added to every coordinate.
pub fn uniform_difference(model: &Mlp, input: &[f32], label: usize, eps: f32) -> Result<f32> {
    check_eps(eps)?;
    model.check_input(input)?;

    let plus: Vec<f32> = input.iter().map(|&x| x + eps).collect();
    let minus: Vec<f32> = input.iter().map(|&x| x - eps).collect();
    let hi = model.log_prob(&plus, label)?;
    let lo = model.log_prob(&minus, label)?;
    Ok((hi - lo) / (2.0 * eps))
}

/// Central difference of `log p(label | x)` along each input coordinate.
pub fn finite_difference(
    model: &Mlp,
    input: &[f32],
    label: usize,
    eps: f32,
) -> Result<Vec<f32>> {
    check_eps(eps)?;
    model.check_input(input)?;

    let mut x = input.to_vec();
    let mut out = Vec::with_capacity(input.len());
    for i in 0..x.len() {
        let orig = x[i];
        x[i] = orig + eps;
        let hi = model.log_prob(&x, label)?;
        x[i] = orig - eps;
        let lo = model.log_prob(&x, label)?;
        x[i] = orig;
        out.push((hi - lo) / (2.0 * eps));
    }
    Ok(out)
}

/// Result of comparing the analytic gradient with finite differences.
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckReport {
    pub mode: BackwardMode,
    pub analytic: Vec<f32>,
    pub numeric: Vec<f32>,
    /// Largest per-coordinate gap; infinite when the lengths differ.
    pub max_abs_diff: f32,
    /// Sum of `analytic`.
    pub uniform_analytic: f32,
    pub uniform_numeric: f32,
    pub tolerance: f32,
    pub passed: bool,
}

impl GradCheckReport {
    /// `true` when `analytic` has one entry per input coordinate.
    pub fn shapes_match(&self) -> bool {
        self.analytic.len() == self.numeric.len()
    }
}

/// Run the backward pass in `mode` and compare it against both numerical estimates.
///
/// The check passes when the shapes match, every coordinate is within `tol`, and the
/// summed gradient is within `tol` of the uniform estimate scaled by the input width.
pub fn check_gradient(
    model: &Mlp,
    input: &[f32],
    label: usize,
    eps: f32,
    tol: f32,
    mode: BackwardMode,
) -> Result<GradCheckReport> {
    if !(tol.is_finite() && tol >= 0.0) {
        return Err(Error::InvalidConfig(format!(
            "tolerance must be finite and >= 0, got {tol}"
        )));
    }

    let analytic = input_gradient(model, input, label, mode)?;
    let numeric = finite_difference(model, input, label, eps)?;
    let uniform_numeric = uniform_difference(model, input, label, eps)?;
    let uniform_analytic: f32 = analytic.iter().sum();

    let max_abs_diff = if analytic.len() == numeric.len() {
        analytic
            .iter()
            .zip(&numeric)
            .map(|(a, n)| (a - n).abs())
            .fold(0.0, f32::max)
    } else {
        f32::INFINITY
    };
    let uniform_tol = tol * input.len() as f32;
    let passed =
        max_abs_diff <= tol && (uniform_analytic - uniform_numeric).abs() <= uniform_tol;

    log::info!(
        "gradient check ({mode:?}): max_abs_diff={max_abs_diff:e} uniform analytic={uniform_analytic:e} numeric={uniform_numeric:e} passed={passed}"
    );
    if analytic.len() != numeric.len() {
        log::warn!(
            "analytic gradient has {} entries for an input of {}",
            analytic.len(),
            numeric.len()
        );
    }

    Ok(GradCheckReport {
        mode,
        analytic,
        numeric,
        max_abs_diff,
        uniform_analytic,
        uniform_numeric,
        tolerance: tol,
        passed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Layer, LayerKind};

    // Every ReLU pre-activation stays above 0.5 within eps = 0.1 of `X`, so no kink is
    // crossed by the central differences.
    const X: [f32; 2] = [0.5, -0.3];

    fn deep_relu() -> Mlp {
        let layer = |in_dim, out_dim, kind, w: &[f32], b: &[f32]| {
            Layer::from_parts(in_dim, out_dim, kind, w.to_vec(), b.to_vec()).unwrap()
        };
        Mlp::from_layers(vec![
            layer(2, 3, LayerKind::Linear, &[1.0, 0.5, 0.5, -1.0, -0.5, 0.5], &[0.1, 0.2, 0.0]),
            layer(
                3,
                3,
                LayerKind::RectifiedLinear,
                &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0],
                &[0.5; 3],
            ),
            layer(
                3,
                3,
                LayerKind::RectifiedLinear,
                &[0.5, 0.5, 0.0, 0.0, 0.5, 0.5, 0.5, 0.0, 0.5],
                &[0.1; 3],
            ),
            layer(
                3,
                3,
                LayerKind::RectifiedLinear,
                &[1.0, -0.5, 0.0, 0.0, 1.0, -0.5, -0.5, 0.0, 1.0],
                &[0.2; 3],
            ),
            layer(
                3,
                3,
                LayerKind::Softmax,
                &[1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.5, 1.0],
                &[0.0; 3],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn corrected_backward_pass_agrees_with_finite_differences() {
        let m = deep_relu();
        for label in 0..3 {
            let r = check_gradient(&m, &X, label, 0.1, 1e-2, BackwardMode::Corrected).unwrap();
            assert!(r.shapes_match());
            assert!(r.passed, "label {label}: {r:?}");
            assert!(r.max_abs_diff < 1e-3);
        }

        let r = check_gradient(&m, &X, 0, 0.1, 1e-2, BackwardMode::Corrected).unwrap();
        assert!((r.analytic[0] - 0.049_317).abs() < 1e-4);
        assert!((r.analytic[1] - 0.464_886).abs() < 1e-4);
        assert!((r.uniform_numeric - 0.514_158).abs() < 1e-4);
    }

    #[test]
    fn literal_backward_pass_does_not_pass() {
        let m = deep_relu();
        let r = check_gradient(&m, &X, 1, 0.1, 1e-2, BackwardMode::Literal).unwrap();
        assert_eq!(r.analytic.len(), 3);
        assert_eq!(r.numeric.len(), 2);
        assert!(!r.shapes_match());
        assert_eq!(r.max_abs_diff, f32::INFINITY);
        assert!(!r.passed);
    }

    #[test]
    fn finite_difference_of_linear_logits() {
        // One softmax layer: d log p_0 / dx = W[0] - sum_k p_k W[k].
        let out = Layer::from_parts(1, 2, LayerKind::Softmax, vec![2.0, -1.0], vec![0.0; 2])
            .unwrap();
        let m = Mlp::from_layers(vec![out]).unwrap();
        let p = m.forward(&[0.0]).unwrap();
        let expected = 2.0 - (p[0] * 2.0 - p[1]);
        let fd = finite_difference(&m, &[0.0], 0, 1e-2).unwrap();
        assert!((fd[0] - expected).abs() < 1e-3);
        let ud = uniform_difference(&m, &[0.0], 0, 1e-2).unwrap();
        assert!((ud - fd[0]).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_eps_and_tolerance() {
        let m = deep_relu();
        assert!(matches!(
            finite_difference(&m, &X, 0, 0.0),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            uniform_difference(&m, &X, 0, f32::NAN),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            check_gradient(&m, &X, 0, 0.1, -1.0, BackwardMode::Corrected),
            Err(Error::InvalidConfig(_))
        ));
    }
}
