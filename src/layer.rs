use ndarray::linalg::general_mat_vec_mul;
use ndarray::{s, Array1, Array2, ArrayView1};
use rand::Rng;

use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::hyperparameters::WeightInit;
use crate::utils::outer_product;

/// Represents a layer in the neural network
///
/// A layer owns the weights that lead *out* of it. `input` holds the layer's
/// own unit values followed by the bias slot (always `1.0`), so the weight
/// matrix has `neurons + 1` rows and one column per unit of the next layer.
/// The terminal layer of a chain has no weights.
#[derive(Debug, Clone)]
pub struct Layer {
    id: String,
    neurons: usize,
    activation: ActivationType,
    input: Array1<f64>,
    /// Pre-activation sums sent to the next layer
    output: Array1<f64>,
    error: Array1<f64>,
    weights: Option<Array2<f64>>,
    next: Option<usize>,
    previous: Option<usize>,
    learning_rate: f64,
}

impl Layer {
    /// Constructs a new, unlinked layer
    ///
    /// # Arguments
    ///
    /// * `id` - Unique name of the layer inside a network; no whitespace
    /// * `neurons` - Number of real (non-bias) units
    /// * `activation` - Activation applied to this layer's units
    pub fn new(id: impl Into<String>, neurons: usize, activation: ActivationType) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(Error::InvalidParameter(format!(
                "layer id `{id}` must be non-empty and free of whitespace"
            )));
        }
        if neurons == 0 {
            return Err(Error::InvalidParameter(format!(
                "layer `{id}` needs at least one neuron"
            )));
        }

        let width = neurons.checked_add(1).ok_or_else(|| {
            Error::InvalidParameter(format!("layer `{id}` has too many neurons"))
        })?;
        let mut input = Array1::zeros(width);
        input[neurons] = 1.0;

        Ok(Layer {
            id,
            neurons,
            activation,
            input,
            output: Array1::zeros(0),
            error: Array1::zeros(neurons),
            weights: None,
            next: None,
            previous: None,
            learning_rate: 0.0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn neurons(&self) -> usize {
        self.neurons
    }

    pub fn activation(&self) -> ActivationType {
        self.activation
    }

    /// Unit values followed by the bias slot
    pub fn input(&self) -> ArrayView1<f64> {
        self.input.view()
    }

    /// Unit values without the bias slot
    pub fn values(&self) -> ArrayView1<f64> {
        self.input.slice(s![..self.neurons])
    }

    pub fn output(&self) -> ArrayView1<f64> {
        self.output.view()
    }

    pub fn error(&self) -> ArrayView1<f64> {
        self.error.view()
    }

    pub fn weights(&self) -> Option<&Array2<f64>> {
        self.weights.as_ref()
    }

    pub fn next(&self) -> Option<usize> {
        self.next
    }

    pub fn previous(&self) -> Option<usize> {
        self.previous
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Number of trainable weights, bias row included
    pub fn parameter_count(&self) -> usize {
        self.weights.as_ref().map_or(0, |w| w.len())
    }

    pub(crate) fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    pub(crate) fn set_links(&mut self, previous: Option<usize>, next: Option<usize>) {
        self.previous = previous;
        self.next = next;
    }

    /// Drops links and outgoing weights
    pub(crate) fn unlink(&mut self) {
        self.previous = None;
        self.next = None;
        self.weights = None;
        self.output = Array1::zeros(0);
    }

    /// Allocates the outgoing weight matrix towards a layer of `next_neurons` units
    pub fn allocate<R: Rng + ?Sized>(
        &mut self,
        next_neurons: usize,
        init: WeightInit,
        rng: &mut R,
    ) -> Result<()> {
        let weights = init.sample(self.neurons + 1, next_neurons, rng)?;
        self.set_weights(weights)
    }

    /// Replaces the outgoing weights; rows must be `neurons + 1`
    pub fn set_weights(&mut self, weights: Array2<f64>) -> Result<()> {
        Error::check_len("weight rows", self.neurons + 1, weights.nrows())?;
        if weights.ncols() == 0 {
            return Err(Error::ShapeMismatch {
                context: "weight columns",
                expected: 1,
                actual: 0,
            });
        }
        self.output = Array1::zeros(weights.ncols());
        self.weights = Some(weights);
        Ok(())
    }

    /// Copies real unit values in; the bias slot stays at `1.0`
    pub fn set_input(&mut self, values: ArrayView1<f64>) -> Result<()> {
        Error::check_len("layer input", self.neurons, values.len())?;
        self.input.slice_mut(s![..self.neurons]).assign(&values);
        self.input[self.neurons] = 1.0;
        Ok(())
    }

    /// Seeds the error of this layer's units; the network does this for the output layer
    pub fn set_error(&mut self, error: ArrayView1<f64>) -> Result<()> {
        Error::check_len("layer error", self.neurons, error.len())?;
        self.error.assign(&error);
        Ok(())
    }

    /// Forward propagation through the layer
    ///
    /// Computes `input · weights` into the `output` buffer and returns the
    /// sums activated with `activation`, the activation of the receiving layer.
    pub fn forward(&mut self, activation: &ActivationType) -> Result<Array1<f64>> {
        let weights = self.weights.as_ref().ok_or(Error::NotBuilt)?;
        Error::check_len("forward input", weights.nrows(), self.input.len())?;
        Error::check_len("forward output", weights.ncols(), self.output.len())?;

        general_mat_vec_mul(1.0, &weights.t(), &self.input, 0.0, &mut self.output);

        Ok(activation.forward(&self.output))
    }

    /// Backward pass for the weights between this layer and `downstream`
    ///
    /// `downstream` must already hold its error. This layer's error is
    /// computed with the weights used by the forward pass, then the weights,
    /// bias row included, move by `learning_rate * input ⊗ gradient`.
    pub fn backward(&mut self, downstream: &Layer) -> Result<()> {
        let weights = self.weights.as_mut().ok_or(Error::NotBuilt)?;
        Error::check_len("backward error", weights.ncols(), downstream.error.len())?;
        Error::check_len("backward sums", weights.ncols(), self.output.len())?;
        Error::check_len("backward values", weights.ncols(), downstream.neurons)?;

        let gradient = downstream.activation.backward(
            downstream.error.view(),
            self.output.view(),
            downstream.values(),
        );

        let real_rows = weights.slice(s![..self.neurons, ..]);
        general_mat_vec_mul(1.0, &real_rows, &gradient, 0.0, &mut self.error);

        weights.scaled_add(
            self.learning_rate,
            &outer_product(self.input.view(), gradient.view()),
        );
        Ok(())
    }
}
