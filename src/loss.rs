use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1, Zip};

use crate::activation::split_parameter;
use crate::error::{Error, Result};

/// Keeps `ln` away from zero in the cross-entropy terms
pub const CROSS_ENTROPY_EPSILON: f64 = 1e-15;

const DEFAULT_HUBER_DELTA: f64 = 1.0;

/// Loss functions: a scalar for reporting and an error vector that seeds
/// backpropagation at the output layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Loss {
    MeanAbsolute,
    MeanSquared,
    RootMeanSquared,
    Huber { delta: f64 },
    LogCosh,
    CrossEntropy,
}

impl Loss {
    pub fn calculate(&self, prediction: ArrayView1<f64>, target: ArrayView1<f64>) -> Result<f64> {
        Error::check_len("loss target", prediction.len(), target.len())?;
        if target.is_empty() {
            return Ok(0.0);
        }
        let n = target.len() as f64;
        let diff = &target - &prediction;

        let loss = match *self {
            Loss::MeanAbsolute => diff.mapv(f64::abs).sum() / n,
            Loss::MeanSquared => diff.mapv(|d| d * d).sum() / n,
            Loss::RootMeanSquared => (diff.mapv(|d| d * d).sum() / n).sqrt(),
            Loss::Huber { delta } => {
                diff.mapv(|d| {
                    if d.abs() <= delta {
                        0.5 * d * d
                    } else {
                        delta * (d.abs() - 0.5 * delta)
                    }
                })
                .sum()
                    / n
            }
            Loss::LogCosh => diff.mapv(log_cosh).sum() / n,
            // Cross entropy loss: -Σ(target * log(prediction))
            Loss::CrossEntropy => cross_entropy_terms(prediction, target).sum(),
        };
        Ok(loss)
    }

    /// Error vector assigned to the output layer before walking the chain backwards
    ///
    /// Cross entropy yields `-tᵢ ln(ε + pᵢ)`; every regression loss uses the
    /// plain difference `tᵢ - pᵢ`.
    pub fn error_signal(
        &self,
        prediction: ArrayView1<f64>,
        target: ArrayView1<f64>,
    ) -> Result<Array1<f64>> {
        Error::check_len("loss target", prediction.len(), target.len())?;
        let signal = match self {
            Loss::CrossEntropy => cross_entropy_terms(prediction, target),
            _ => &target - &prediction,
        };
        Ok(signal)
    }
}

/// `ln(cosh d)` without overflowing `cosh` for large `|d|`
fn log_cosh(d: f64) -> f64 {
    let a = d.abs();
    a + (-2.0 * a).exp().ln_1p() - std::f64::consts::LN_2
}

fn cross_entropy_terms(prediction: ArrayView1<f64>, target: ArrayView1<f64>) -> Array1<f64> {
    Zip::from(&prediction)
        .and(&target)
        .map_collect(|&p, &t| -t * (CROSS_ENTROPY_EPSILON + p).ln())
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loss::MeanAbsolute => f.write_str("mae"),
            Loss::MeanSquared => f.write_str("mse"),
            Loss::RootMeanSquared => f.write_str("rmse"),
            Loss::Huber { delta } => write!(f, "huber({delta})"),
            Loss::LogCosh => f.write_str("log-cosh"),
            Loss::CrossEntropy => f.write_str("cross-entropy"),
        }
    }
}

impl FromStr for Loss {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let unknown = || Error::UnknownLoss(s.to_string());
        let normalized = s.trim().to_ascii_lowercase();
        let (name, param) = split_parameter(&normalized).ok_or_else(unknown)?;

        match (name, param) {
            ("huber", None) => Ok(Loss::Huber {
                delta: DEFAULT_HUBER_DELTA,
            }),
            ("huber", Some(p)) => {
                let delta = p.trim().parse::<f64>().map_err(|_| unknown())?;
                if delta > 0.0 {
                    Ok(Loss::Huber { delta })
                } else {
                    Err(unknown())
                }
            }
            (_, Some(_)) => Err(unknown()),
            ("mae" | "mean-absolute" | "mean_absolute", None) => Ok(Loss::MeanAbsolute),
            ("mse" | "mean-squared" | "mean_squared", None) => Ok(Loss::MeanSquared),
            ("rmse" | "root-mean-squared" | "root_mean_squared", None) => {
                Ok(Loss::RootMeanSquared)
            }
            ("log-cosh" | "logcosh" | "log_cosh", None) => Ok(Loss::LogCosh),
            ("cross-entropy" | "crossentropy" | "cross_entropy", None) => Ok(Loss::CrossEntropy),
            _ => Err(unknown()),
        }
    }
}
