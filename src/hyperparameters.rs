use ndarray::Array2;
use rand::distr::Uniform;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::loss::Loss;

/// Hyperparameters for the neural network model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelHyperparameters {
    /// Learning rate for training
    pub learning_rate: f64,

    /// Number of training epochs
    pub epochs: usize,

    /// Visit training samples in a new random order every epoch
    pub shuffle: bool,

    /// Seed for weight initialization and shuffling; drawn from the OS when absent
    pub seed: Option<u64>,

    pub weight_init: WeightInit,

    /// Loss identifier, resolved with [`ModelHyperparameters::loss`]
    pub loss: String,

    /// Activation given to layers when a model file doesn't record one
    pub activation: String,

    pub on_divergence: DivergencePolicy,
}

impl Default for ModelHyperparameters {
    fn default() -> Self {
        ModelHyperparameters {
            learning_rate: 0.01,
            epochs: 100,
            shuffle: false,
            seed: None,
            weight_init: WeightInit::default(),
            loss: "mse".to_string(),
            activation: "tanh".to_string(),
            on_divergence: DivergencePolicy::Abort,
        }
    }
}

impl ModelHyperparameters {
    pub fn loss(&self) -> Result<Loss> {
        self.loss.parse()
    }

    pub fn activation(&self) -> Result<ActivationType> {
        self.activation.parse()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "learning rate must be finite, got {}",
                self.learning_rate
            )));
        }
        self.weight_init.validate()?;
        self.loss()?;
        self.activation()?;
        Ok(())
    }
}

/// What training does with a sample whose forward pass diverged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergencePolicy {
    /// Stop training and return [`Error::Diverged`]
    #[default]
    Abort,
    /// Leave the weights alone, count the sample as skipped, keep going
    Skip,
}

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInit {
    /// Uniform random initialization over `[low, high)`
    Uniform { low: f64, high: f64 },

    /// Xavier/Glorot initialization
    Xavier,

    /// He initialization (good for ReLU-like networks)
    HeNormal,
}

impl Default for WeightInit {
    fn default() -> Self {
        WeightInit::Uniform {
            low: -1.0,
            high: 1.0,
        }
    }
}

impl WeightInit {
    pub fn validate(&self) -> Result<()> {
        match *self {
            WeightInit::Uniform { low, high } if !(low < high) || !(high - low).is_finite() => {
                Err(Error::InvalidParameter(format!(
                    "uniform weight range [{low}, {high}) is empty or unbounded"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Draws a `(rows, cols)` matrix; `rows` is the fan-in including the bias row
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let weights = match *self {
            WeightInit::Uniform { low, high } => {
                self.validate()?;
                let dist = Uniform::new(low, high)
                    .map_err(|e| Error::InvalidParameter(e.to_string()))?;
                Array2::from_shape_fn((rows, cols), |_| dist.sample(&mut *rng))
            }
            WeightInit::Xavier => {
                let scale = (6.0 / (rows + cols) as f64).sqrt();
                let dist = Uniform::new(-scale, scale)
                    .map_err(|e| Error::InvalidParameter(e.to_string()))?;
                Array2::from_shape_fn((rows, cols), |_| dist.sample(&mut *rng))
            }
            WeightInit::HeNormal => {
                let std_dev = (2.0 / rows as f64).sqrt();
                let dist = Normal::new(0.0, std_dev)
                    .map_err(|e| Error::InvalidParameter(e.to_string()))?;
                Array2::from_shape_fn((rows, cols), |_| dist.sample(&mut *rng))
            }
        };
        Ok(weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_hyperparameters() {
        let hp = ModelHyperparameters::default();

        assert_eq!(hp.learning_rate, 0.01);
        assert_eq!(hp.epochs, 100);
        assert!(!hp.shuffle);
        assert_eq!(hp.loss().unwrap(), Loss::MeanSquared);
        assert_eq!(hp.activation().unwrap(), ActivationType::Tanh);
        assert_eq!(hp.on_divergence, DivergencePolicy::Abort);
        assert!(hp.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let hp: ModelHyperparameters =
            serde_json::from_str(r#"{ "learning_rate": 0.5, "on_divergence": "skip" }"#).unwrap();

        assert_eq!(hp.learning_rate, 0.5);
        assert_eq!(hp.on_divergence, DivergencePolicy::Skip);
        assert_eq!(hp.epochs, 100);
    }

    #[test]
    fn test_uniform_init_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let init = WeightInit::Uniform {
            low: -0.5,
            high: 0.25,
        };
        let weights = init.sample(4, 3, &mut rng).unwrap();

        assert_eq!(weights.dim(), (4, 3));
        assert!(weights.iter().all(|&w| (-0.5..0.25).contains(&w)));
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        for init in [WeightInit::default(), WeightInit::Xavier, WeightInit::HeNormal] {
            let a = init.sample(3, 2, &mut StdRng::seed_from_u64(42)).unwrap();
            let b = init.sample(3, 2, &mut StdRng::seed_from_u64(42)).unwrap();
            assert_eq!(a, b, "Failed with strategy: {:?}", init);
        }
    }

    #[test]
    fn test_empty_uniform_range_is_rejected() {
        let init = WeightInit::Uniform { low: 1.0, high: 1.0 };
        let result = init.sample(2, 2, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }
}
