use std::time::Instant;

use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::hyperparameters::{DivergencePolicy, ModelHyperparameters, WeightInit};
use crate::layer::Layer;
use crate::loss::Loss;
use crate::progress::{EpochStats, TestStats, TrainingObserver};
use crate::samples::{Sample, SampleSource};

/// A linear chain of layers trained with online gradient descent
///
/// Layers live in one `Vec`, in the order they were added; `next` and
/// `previous` on each layer are indices into it. Topology is declared with
/// [`add_layer`](Network::add_layer), [`set_input`](Network::set_input),
/// [`set_output`](Network::set_output) and [`link`](Network::link), then
/// frozen by [`build`](Network::build). Only weights change afterwards.
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
    input: Option<usize>,
    output: Option<usize>,
    /// Layer indices from input to output, filled by `build`
    chain: Vec<usize>,
    learning_rate: f64,
    on_divergence: DivergencePolicy,
    built: bool,
}

impl Network {
    pub fn new(learning_rate: f64) -> Self {
        Network {
            layers: Vec::new(),
            input: None,
            output: None,
            chain: Vec::new(),
            learning_rate,
            on_divergence: DivergencePolicy::default(),
            built: false,
        }
    }

    /// Builds a consecutive chain `l1 → l2 → … → ln`
    ///
    /// # Arguments
    ///
    /// * `sizes` - Neuron count of every layer, input first
    /// * `activations` - Either one activation shared by every layer or one per layer
    pub fn sequential<R: Rng + ?Sized>(
        learning_rate: f64,
        sizes: &[usize],
        activations: &[ActivationType],
        init: WeightInit,
        rng: &mut R,
    ) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(Error::InvalidTopology(
                "at least two layers (input and output) are required".to_string(),
            ));
        }
        let activation_for = |i: usize| -> Result<ActivationType> {
            match activations.len() {
                1 => Ok(activations[0]),
                n if n == sizes.len() => Ok(activations[i]),
                n => Err(Error::InvalidTopology(format!(
                    "{} layers but {n} activation functions; give one per layer or a single one",
                    sizes.len()
                ))),
            }
        };

        let mut network = Network::new(learning_rate);
        let mut ids = Vec::with_capacity(sizes.len());
        for (i, &neurons) in sizes.iter().enumerate() {
            let id = format!("l{}", i + 1);
            network.add_layer(Layer::new(id.clone(), neurons, activation_for(i)?)?)?;
            ids.push(id);
        }

        let flow: Vec<&str> = ids.iter().map(String::as_str).collect();
        network.set_input(flow[0])?;
        network.set_output(flow[flow.len() - 1])?;
        network.link_with(&flow, init, rng)?;
        network.build()?;
        Ok(network)
    }

    pub fn add_layer(&mut self, mut layer: Layer) -> Result<()> {
        self.ensure_unbuilt()?;
        if self.layers.iter().any(|l| l.id() == layer.id()) {
            return Err(Error::DuplicateLayer(layer.id().to_string()));
        }
        layer.set_learning_rate(self.learning_rate);
        self.layers.push(layer);
        Ok(())
    }

    pub fn set_input(&mut self, id: &str) -> Result<()> {
        self.ensure_unbuilt()?;
        self.input = Some(self.index_of(id)?);
        Ok(())
    }

    pub fn set_output(&mut self, id: &str) -> Result<()> {
        self.ensure_unbuilt()?;
        self.output = Some(self.index_of(id)?);
        Ok(())
    }

    /// Links layers in `flow` order with uniformly initialised weights
    pub fn link<R: Rng + ?Sized>(&mut self, flow: &[&str], rng: &mut R) -> Result<()> {
        self.link_with(flow, WeightInit::default(), rng)
    }

    /// Links layers in `flow` order, drawing every weight matrix from `rng`
    ///
    /// Linking again before `build` replaces the previous wiring. On error the
    /// network is left as it was.
    pub fn link_with<R: Rng + ?Sized>(
        &mut self,
        flow: &[&str],
        init: WeightInit,
        rng: &mut R,
    ) -> Result<()> {
        let order = self.resolve_flow(flow)?;

        let mut matrices = Vec::with_capacity(order.len() - 1);
        for pair in order.windows(2) {
            let (from, to) = (&self.layers[pair[0]], &self.layers[pair[1]]);
            matrices.push(init.sample(from.neurons() + 1, to.neurons(), rng)?);
        }

        self.wire(&order, matrices)
    }

    /// Sets links along `order` and installs one matrix per non-terminal layer
    pub(crate) fn wire(&mut self, order: &[usize], matrices: Vec<Array2<f64>>) -> Result<()> {
        Error::check_len("weight matrices", order.len().saturating_sub(1), matrices.len())?;
        for (pair, weights) in order.windows(2).zip(&matrices) {
            let (rows, cols) = (
                self.layers[pair[0]].neurons() + 1,
                self.layers[pair[1]].neurons(),
            );
            Error::check_len("weight rows", rows, weights.nrows())?;
            Error::check_len("weight columns", cols, weights.ncols())?;
        }

        for layer in &mut self.layers {
            layer.unlink();
        }
        for (position, &index) in order.iter().enumerate() {
            let previous = position.checked_sub(1).map(|p| order[p]);
            let next = order.get(position + 1).copied();
            self.layers[index].set_links(previous, next);
        }
        for (&index, weights) in order.iter().zip(matrices) {
            self.layers[index].set_weights(weights)?;
            debug!(
                "linked `{}` with {} weights",
                self.layers[index].id(),
                self.layers[index].parameter_count()
            );
        }
        Ok(())
    }

    fn resolve_flow(&self, flow: &[&str]) -> Result<Vec<usize>> {
        self.ensure_unbuilt()?;
        if flow.len() < 2 {
            return Err(Error::InvalidTopology(
                "a flow needs at least two layers".to_string(),
            ));
        }

        let mut order = Vec::with_capacity(flow.len());
        for id in flow {
            let index = self.index_of(id)?;
            if order.contains(&index) {
                return Err(Error::InvalidTopology(format!(
                    "layer `{id}` appears twice in the flow; only linear chains are supported"
                )));
            }
            order.push(index);
        }
        Ok(order)
    }

    /// Validates the wiring and freezes the topology
    pub fn build(&mut self) -> Result<()> {
        self.ensure_unbuilt()?;
        let input = self
            .input
            .ok_or_else(|| Error::InvalidTopology("input layer not set".to_string()))?;
        let output = self
            .output
            .ok_or_else(|| Error::InvalidTopology("output layer not set".to_string()))?;
        if input == output {
            return Err(Error::InvalidTopology(
                "input and output must be different layers".to_string(),
            ));
        }
        if self.layers[output].next().is_some() {
            return Err(Error::InvalidTopology(format!(
                "output layer `{}` must end the chain",
                self.layers[output].id()
            )));
        }

        let mut chain = vec![input];
        let mut current = input;
        while current != output {
            let layer = &self.layers[current];
            let next = layer.next().ok_or_else(|| {
                Error::InvalidTopology(format!(
                    "layer `{}` is not linked towards the output layer",
                    layer.id()
                ))
            })?;
            if layer.weights().is_none() || chain.contains(&next) {
                return Err(Error::InvalidTopology(format!(
                    "broken link after layer `{}`",
                    layer.id()
                )));
            }
            chain.push(next);
            current = next;
        }

        self.chain = chain;
        self.built = true;
        info!(
            "built network: {} layers, {} parameters",
            self.chain.len(),
            self.parameter_count()
        );
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
        for layer in &mut self.layers {
            layer.set_learning_rate(learning_rate);
        }
    }

    pub fn divergence_policy(&self) -> DivergencePolicy {
        self.on_divergence
    }

    pub fn set_divergence_policy(&mut self, policy: DivergencePolicy) {
        self.on_divergence = policy;
    }

    /// Every layer, in the order they were added
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layers from input to output; empty until built
    pub fn chain(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.chain.iter().map(move |&i| &self.layers[i])
    }

    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn input_layer(&self) -> Option<&Layer> {
        self.input.map(|i| &self.layers[i])
    }

    pub fn output_layer(&self) -> Option<&Layer> {
        self.output.map(|i| &self.layers[i])
    }

    pub fn input_len(&self) -> Option<usize> {
        self.input_layer().map(Layer::neurons)
    }

    pub fn output_len(&self) -> Option<usize> {
        self.output_layer().map(Layer::neurons)
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Overwrites the outgoing weights of a linked layer
    pub fn set_weights(&mut self, id: &str, weights: Array2<f64>) -> Result<()> {
        let index = self.index_of(id)?;
        let next = self.layers[index].next().ok_or_else(|| {
            Error::InvalidTopology(format!("layer `{id}` has no outgoing link"))
        })?;
        Error::check_len("weight columns", self.layers[next].neurons(), weights.ncols())?;
        self.layers[index].set_weights(weights)
    }

    /// Feeds one sample through the chain, returning the output layer's units
    ///
    /// Layer buffers keep the intermediate values for a following
    /// [`backpropagate`](Network::backpropagate).
    pub fn feed_forward(&mut self, sample: ArrayView1<f64>) -> Result<Array1<f64>> {
        self.ensure_built()?;
        let (input, output) = self.endpoints()?;
        Error::check_len("network input", self.layers[input].neurons(), sample.len())?;

        self.layers[input].set_input(sample)?;
        for pair in self.chain.windows(2) {
            let (sender, receiver) = pair_mut(&mut self.layers, pair[0], pair[1]);
            let activated = sender.forward(&receiver.activation())?;
            if activated.iter().any(|v| !v.is_finite()) {
                return Err(Error::Diverged {
                    layer: receiver.id().to_string(),
                });
            }
            receiver.set_input(activated.view())?;
        }

        Ok(self.layers[output].values().to_owned())
    }

    /// Inference without touching any layer buffer
    pub fn predict(&self, sample: ArrayView1<f64>) -> Result<Array1<f64>> {
        self.ensure_built()?;
        let (input, _) = self.endpoints()?;
        Error::check_len("network input", self.layers[input].neurons(), sample.len())?;

        let mut values = sample.to_owned();
        for pair in self.chain.windows(2) {
            let (sender, receiver) = (&self.layers[pair[0]], &self.layers[pair[1]]);
            let weights = sender.weights().ok_or(Error::NotBuilt)?;
            let sums = values.dot(&weights.slice(s![..sender.neurons(), ..]))
                + &weights.row(sender.neurons());
            values = receiver.activation().forward(&sums);
            if values.iter().any(|v| !v.is_finite()) {
                return Err(Error::Diverged {
                    layer: receiver.id().to_string(),
                });
            }
        }
        Ok(values)
    }

    /// Seeds the output error from `loss` and walks the chain back to the input
    ///
    /// Uses the values left by the last [`feed_forward`](Network::feed_forward).
    pub fn backpropagate(&mut self, target: ArrayView1<f64>, loss: &Loss) -> Result<()> {
        self.ensure_built()?;
        let (_, output) = self.endpoints()?;
        Error::check_len("network target", self.layers[output].neurons(), target.len())?;

        let signal = loss.error_signal(self.layers[output].values(), target)?;
        if signal.iter().any(|v| !v.is_finite()) {
            return Err(Error::Diverged {
                layer: self.layers[output].id().to_string(),
            });
        }
        self.layers[output].set_error(signal.view())?;

        for pair in self.chain.windows(2).rev() {
            let (sender, receiver) = pair_mut(&mut self.layers, pair[0], pair[1]);
            sender.backward(receiver)?;
        }
        Ok(())
    }

    /// Online training: one forward and one backward pass per sample
    ///
    /// Returns the statistics of every epoch. The reported loss of a sample
    /// is measured before its weight update.
    pub fn train<S, O>(
        &mut self,
        epochs: usize,
        loss: &Loss,
        source: &S,
        observer: &mut O,
    ) -> Result<Vec<EpochStats>>
    where
        S: SampleSource + ?Sized,
        O: TrainingObserver + ?Sized,
    {
        self.ensure_built()?;
        let started = Instant::now();
        let expected = source.len_hint();
        let mut history = Vec::with_capacity(epochs);

        for epoch in 1..=epochs {
            let stats =
                self.train_epoch(epoch, source.samples(), loss, observer, started, expected)?;
            history.push(stats);
        }
        Ok(history)
    }

    /// Like [`train`](Network::train), but every epoch visits the samples in
    /// a fresh random order drawn from `rng`
    ///
    /// One pass of `source` is collected up front and reused by every epoch.
    pub fn train_shuffled<S, O, R>(
        &mut self,
        epochs: usize,
        loss: &Loss,
        source: &S,
        observer: &mut O,
        rng: &mut R,
    ) -> Result<Vec<EpochStats>>
    where
        S: SampleSource + ?Sized,
        O: TrainingObserver + ?Sized,
        R: Rng + ?Sized,
    {
        self.ensure_built()?;
        let started = Instant::now();
        let samples: Vec<Sample> = source.samples().collect();
        let expected = Some(samples.len());
        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut history = Vec::with_capacity(epochs);

        for epoch in 1..=epochs {
            order.shuffle(rng);
            let pass = order.iter().map(|&i| samples[i].clone());
            let stats = self.train_epoch(epoch, pass, loss, observer, started, expected)?;
            history.push(stats);
        }
        Ok(history)
    }

    /// Trains with the loss, epoch count and ordering from `hp`
    ///
    /// Shuffling draws from `hp.seed` when set, otherwise from the OS.
    pub fn train_with<S, O>(
        &mut self,
        hp: &ModelHyperparameters,
        source: &S,
        observer: &mut O,
    ) -> Result<Vec<EpochStats>>
    where
        S: SampleSource + ?Sized,
        O: TrainingObserver + ?Sized,
    {
        let loss = hp.loss()?;
        info!(
            "training for {} epochs with {loss}{}",
            hp.epochs,
            if hp.shuffle { ", shuffled" } else { "" }
        );
        if hp.shuffle {
            let mut rng = match hp.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            self.train_shuffled(hp.epochs, &loss, source, observer, &mut rng)
        } else {
            self.train(hp.epochs, &loss, source, observer)
        }
    }

    fn train_epoch<I, O>(
        &mut self,
        epoch: usize,
        samples: I,
        loss: &Loss,
        observer: &mut O,
        started: Instant,
        expected: Option<usize>,
    ) -> Result<EpochStats>
    where
        I: Iterator<Item = Sample>,
        O: TrainingObserver + ?Sized,
    {
        let mut stats = EpochStats::new(epoch);
        for (input, target) in samples {
            match self.train_sample(input.view(), target.view(), loss) {
                Ok(sample_loss) => stats.record(sample_loss),
                Err(Error::Diverged { layer }) if self.on_divergence == DivergencePolicy::Skip => {
                    warn!(
                        "epoch {epoch}: skipping sample {} that diverged at `{layer}`",
                        stats.processed() + 1
                    );
                    stats.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            observer.on_sample(stats.processed(), started.elapsed(), expected);
        }
        observer.on_epoch(epoch, stats.summed_loss, stats.samples);
        Ok(stats)
    }

    fn train_sample(
        &mut self,
        input: ArrayView1<f64>,
        target: ArrayView1<f64>,
        loss: &Loss,
    ) -> Result<f64> {
        let prediction = self.feed_forward(input)?;
        let sample_loss = loss.calculate(prediction.view(), target)?;
        self.backpropagate(target, loss)?;
        Ok(sample_loss)
    }

    /// Forward passes only; weights are never touched
    pub fn test<S, O>(&mut self, loss: &Loss, source: &S, observer: &mut O) -> Result<TestStats>
    where
        S: SampleSource + ?Sized,
        O: TrainingObserver + ?Sized,
    {
        self.ensure_built()?;
        let mut stats = TestStats::default();
        for (input, target) in source.samples() {
            let prediction = match self.feed_forward(input.view()) {
                Ok(prediction) => prediction,
                Err(Error::Diverged { layer }) if self.on_divergence == DivergencePolicy::Skip => {
                    warn!("test: skipping sample that diverged at `{layer}`");
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            stats.summed_loss += loss.calculate(prediction.view(), target.view())?;
            stats.samples += 1;
        }
        observer.on_test(stats.summed_loss, stats.samples);
        Ok(stats)
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.layers
            .iter()
            .position(|l| l.id() == id)
            .ok_or_else(|| Error::UnknownLayer(id.to_string()))
    }

    fn endpoints(&self) -> Result<(usize, usize)> {
        match (self.input, self.output) {
            (Some(input), Some(output)) => Ok((input, output)),
            _ => Err(Error::NotBuilt),
        }
    }

    fn ensure_built(&self) -> Result<()> {
        if self.built {
            Ok(())
        } else {
            Err(Error::NotBuilt)
        }
    }

    fn ensure_unbuilt(&self) -> Result<()> {
        if self.built {
            Err(Error::AlreadyBuilt)
        } else {
            Ok(())
        }
    }
}

/// Mutable access to two distinct layers at once
fn pair_mut(layers: &mut [Layer], a: usize, b: usize) -> (&mut Layer, &mut Layer) {
    debug_assert_ne!(a, b);
    if a < b {
        let (low, high) = layers.split_at_mut(b);
        (&mut low[a], &mut high[0])
    } else {
        let (low, high) = layers.split_at_mut(a);
        (&mut high[0], &mut low[b])
    }
}
