mod activation;
mod config;
mod error;
mod hyperparameters;
mod layer;
mod loss;
mod network;
mod progress;
mod samples;
mod utils;

pub mod persist;

pub use activation::ActivationType;
pub use config::{LayerConfig, NetworkConfig};
pub use error::{Error, Result};
pub use hyperparameters::{DivergencePolicy, ModelHyperparameters, WeightInit};
pub use layer::Layer;
pub use loss::{Loss, CROSS_ENTROPY_EPSILON};
pub use network::Network;
pub use persist::ModelFormat;
pub use progress::{EpochStats, LogObserver, Silent, TestStats, TrainingObserver};
pub use samples::{FromFn, Sample, SampleSource};
