use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1};

use crate::error::Error;

/// Enum representing different activation function types
///
/// Every neuron of a layer shares the same activation. The derivative is
/// evaluated from whichever of the pre-activation `x` or the activated `y`
/// is cheaper and stable for the variant, see [`ActivationType::derivative`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationType {
    Linear,
    Sigmoid,
    Tanh,
    Elu { alpha: f64 },
    LeakyRelu { alpha: f64 },
    Softmax,
}

const DEFAULT_ELU_ALPHA: f64 = 1.0;
const DEFAULT_LEAKY_ALPHA: f64 = 0.01;

impl ActivationType {
    /// Applies the activation function to a single value
    ///
    /// Softmax has no element-wise form; a lone value is treated as a
    /// one-element vector and maps to `1.0`.
    pub fn apply(&self, x: f64) -> f64 {
        match *self {
            ActivationType::Linear => x,
            ActivationType::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationType::Tanh => x.tanh(),
            ActivationType::Elu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * (x.exp() - 1.0)
                }
            }
            ActivationType::LeakyRelu { alpha } => {
                if x >= 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            ActivationType::Softmax => 1.0,
        }
    }

    /// Computes the derivative of the activation function
    ///
    /// `x` is the pre-activation sum and `y` the activated value.
    ///
    /// * sigmoid: `y (1 - y)`, from `y`
    /// * tanh: `1 - y²`, from `y`
    /// * ELU: `1` or `alpha eˣ`, from `x`
    /// * leaky ReLU: `1` or `alpha`, from `x`
    /// * softmax: diagonal of the Jacobian, `y (1 - y)`
    pub fn derivative(&self, x: f64, y: f64) -> f64 {
        match *self {
            ActivationType::Linear => 1.0,
            ActivationType::Sigmoid | ActivationType::Softmax => y * (1.0 - y),
            ActivationType::Tanh => 1.0 - y * y,
            ActivationType::Elu { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha * x.exp()
                }
            }
            ActivationType::LeakyRelu { alpha } => {
                if x >= 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
        }
    }

    /// Activates a whole vector of pre-activation sums
    pub fn forward(&self, z: &Array1<f64>) -> Array1<f64> {
        match self {
            ActivationType::Softmax => {
                let max = z.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                let exps = z.mapv(|v| (v - max).exp());
                let sum = exps.sum();
                exps / sum
            }
            _ => z.mapv(|v| self.apply(v)),
        }
    }

    /// Full Jacobian `∂y/∂x` evaluated at the activated vector `y`
    ///
    /// Only softmax couples its outputs; for every other variant the matrix
    /// is diagonal and `pre` supplies the values the derivative needs.
    pub fn jacobian(&self, pre: ArrayView1<f64>, post: ArrayView1<f64>) -> Array2<f64> {
        let n = post.len();
        match self {
            ActivationType::Softmax => Array2::from_shape_fn((n, n), |(i, j)| {
                let delta = if i == j { 1.0 } else { 0.0 };
                post[i] * (delta - post[j])
            }),
            _ => Array2::from_diag(
                &pre.iter()
                    .zip(post.iter())
                    .map(|(&x, &y)| self.derivative(x, y))
                    .collect::<Array1<f64>>(),
            ),
        }
    }

    /// Turns the error on activated values into the error on pre-activation sums
    ///
    /// Element-wise variants multiply by the derivative. Softmax applies the
    /// transposed Jacobian, `yᵢ (gᵢ - Σⱼ yⱼ gⱼ)`, without materialising it.
    pub fn backward(
        &self,
        grad: ArrayView1<f64>,
        pre: ArrayView1<f64>,
        post: ArrayView1<f64>,
    ) -> Array1<f64> {
        match self {
            ActivationType::Softmax => {
                let weighted = post.dot(&grad);
                Array1::from_shape_fn(post.len(), |i| post[i] * (grad[i] - weighted))
            }
            _ => Array1::from_shape_fn(grad.len(), |i| {
                grad[i] * self.derivative(pre[i], post[i])
            }),
        }
    }
}

impl fmt::Display for ActivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationType::Linear => f.write_str("linear"),
            ActivationType::Sigmoid => f.write_str("sigmoid"),
            ActivationType::Tanh => f.write_str("tanh"),
            ActivationType::Elu { alpha } => write!(f, "elu({alpha})"),
            ActivationType::LeakyRelu { alpha } => write!(f, "leaky-relu({alpha})"),
            ActivationType::Softmax => f.write_str("softmax"),
        }
    }
}

impl FromStr for ActivationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || Error::UnknownActivation(s.to_string());
        let normalized = s.trim().to_ascii_lowercase();
        let (name, param) = split_parameter(&normalized).ok_or_else(unknown)?;
        let alpha = |default: f64| -> Result<f64, Error> {
            match param {
                None => Ok(default),
                Some(p) => p.trim().parse::<f64>().map_err(|_| unknown()),
            }
        };

        let activation = match name {
            "linear" | "identity" => ActivationType::Linear,
            "sigmoid" | "logistic" => ActivationType::Sigmoid,
            "tanh" => ActivationType::Tanh,
            "elu" => ActivationType::Elu {
                alpha: alpha(DEFAULT_ELU_ALPHA)?,
            },
            "leaky-relu" | "leaky_relu" | "leakyrelu" => ActivationType::LeakyRelu {
                alpha: alpha(DEFAULT_LEAKY_ALPHA)?,
            },
            "softmax" => ActivationType::Softmax,
            _ => return Err(unknown()),
        };

        // Parameterless variants must not swallow a stray "(...)"
        match activation {
            ActivationType::Elu { .. } | ActivationType::LeakyRelu { .. } => Ok(activation),
            _ if param.is_some() => Err(unknown()),
            _ => Ok(activation),
        }
    }
}

/// Splits `name(param)` into its parts. `None` when the parentheses are unbalanced.
pub(crate) fn split_parameter(s: &str) -> Option<(&str, Option<&str>)> {
    match s.find('(') {
        None => Some((s, None)),
        Some(open) => {
            let rest = s[open + 1..].strip_suffix(')')?;
            Some((s[..open].trim_end(), Some(rest)))
        }
    }
}
