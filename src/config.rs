use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hyperparameters::ModelHyperparameters;
use crate::layer::Layer;
use crate::network::Network;

/// One layer of a [`NetworkConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub id: String,
    pub neurons: usize,
    /// Activation identifier such as `tanh` or `leaky-relu(0.05)`
    pub activation: String,
}

/// Declarative description of a network, loadable from JSON
///
/// ```json
/// {
///   "layers": [
///     { "id": "in", "neurons": 2, "activation": "linear" },
///     { "id": "out", "neurons": 1, "activation": "sigmoid" }
///   ],
///   "input": "in",
///   "output": "out",
///   "hyperparameters": { "learning_rate": 0.1, "seed": 7 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub layers: Vec<LayerConfig>,
    pub input: String,
    pub output: String,
    /// Layer ids in chain order; the order of `layers` when empty
    #[serde(default)]
    pub flow: Vec<String>,
    #[serde(default)]
    pub hyperparameters: ModelHyperparameters,
}

impl NetworkConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Creates, links and builds the described network
    ///
    /// Weights come from a generator seeded with `hyperparameters.seed`, or
    /// from the OS when no seed is given.
    pub fn build(&self) -> Result<Network> {
        let hp = &self.hyperparameters;
        hp.validate()?;

        let mut network = Network::new(hp.learning_rate);
        network.set_divergence_policy(hp.on_divergence);
        for layer in &self.layers {
            network.add_layer(Layer::new(
                layer.id.clone(),
                layer.neurons,
                layer.activation.parse()?,
            )?)?;
        }
        network.set_input(&self.input)?;
        network.set_output(&self.output)?;

        let flow: Vec<&str> = if self.flow.is_empty() {
            self.layers.iter().map(|l| l.id.as_str()).collect()
        } else {
            self.flow.iter().map(String::as_str).collect()
        };
        let mut rng = match hp.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        network.link_with(&flow, hp.weight_init, &mut rng)?;
        network.build()?;
        Ok(network)
    }
}
