//! Error types for network construction, propagation and persistence

/// Everything that can go wrong while wiring, running or storing a network
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The operation needs a network that has gone through `build`
    #[error("network is not built")]
    NotBuilt,

    /// Topology is frozen once the network is built
    #[error("network is already built")]
    AlreadyBuilt,

    /// Vector or matrix dimensions don't line up
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown activation function `{0}`")]
    UnknownActivation(String),

    #[error("unknown loss function `{0}`")]
    UnknownLoss(String),

    #[error("no layer with id `{0}`")]
    UnknownLayer(String),

    #[error("layer id `{0}` is already taken")]
    DuplicateLayer(String),

    /// The declared chain is not a single linear path from input to output
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A forward pass produced NaN or an infinite value
    #[error("forward pass diverged at layer `{layer}`")]
    Diverged { layer: String },

    /// A persisted model failed validation; `line` is 1-based
    #[error("malformed model file at line {line}: {reason}")]
    Format { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] serde_json::Error),
}

/// Result type for network operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn format(line: usize, reason: impl Into<String>) -> Self {
        Error::Format {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn check_len(context: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Error::ShapeMismatch {
                context,
                expected,
                actual,
            })
        }
    }
}
