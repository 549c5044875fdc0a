use feedchain::{ActivationType, Error, Layer, WeightInit};
use ndarray::array;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_layer_initialization() {
    let layer = Layer::new("hidden", 4, ActivationType::Tanh).unwrap();

    // Check layer configuration
    assert_eq!(layer.id(), "hidden");
    assert_eq!(layer.neurons(), 4);

    // Bias slot sits after the real units and starts at 1.0
    assert_eq!(layer.input().len(), 5);
    assert_eq!(layer.input()[4], 1.0);
    assert_eq!(layer.error().len(), 4);

    // No weights until the layer is linked
    assert!(layer.weights().is_none());
    assert_eq!(layer.parameter_count(), 0);
}

#[test]
fn test_invalid_layers() {
    assert!(matches!(
        Layer::new("empty", 0, ActivationType::Linear),
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        Layer::new("two words", 1, ActivationType::Linear),
        Err(Error::InvalidParameter(_))
    ));
    // no room for the bias slot
    assert!(matches!(
        Layer::new("wide", usize::MAX, ActivationType::Linear),
        Err(Error::InvalidParameter(_))
    ));
}

#[test]
fn test_allocate_shapes_weights_with_bias_row() {
    let mut layer = Layer::new("a", 3, ActivationType::Linear).unwrap();
    layer
        .allocate(2, WeightInit::default(), &mut StdRng::seed_from_u64(9))
        .unwrap();

    assert_eq!(layer.weights().unwrap().dim(), (4, 2));
    assert_eq!(layer.output().len(), 2);
    assert_eq!(layer.parameter_count(), 4 * 2);
}

#[test]
fn test_forward_propagate() {
    let mut layer = Layer::new("a", 2, ActivationType::Linear).unwrap();
    layer
        .set_weights(array![[1.0, 2.0], [3.0, 4.0], [0.5, -0.5]])
        .unwrap();
    layer.set_input(array![1.0, -1.0].view()).unwrap();

    let activated = layer.forward(&ActivationType::Linear).unwrap();

    // 1*[1,2] - 1*[3,4] + bias row
    assert_eq!(activated, array![-1.5, -2.5]);
    assert_eq!(layer.output(), array![-1.5, -2.5].view());

    // Activation comes from the receiving side; sums stay pre-activation
    let squashed = layer.forward(&ActivationType::Tanh).unwrap();
    assert!((squashed[0] - (-1.5f64).tanh()).abs() < 1e-12);
    assert_eq!(layer.output()[0], -1.5);
}

#[test]
fn test_forward_without_weights() {
    let mut layer = Layer::new("a", 2, ActivationType::Linear).unwrap();
    assert!(matches!(
        layer.forward(&ActivationType::Linear),
        Err(Error::NotBuilt)
    ));
}

#[test]
fn test_forward_propagate_invalid_input_size() {
    let mut layer = Layer::new("a", 3, ActivationType::Linear).unwrap();

    // Try to feed a vector of the wrong size; nothing is truncated or padded
    let result = layer.set_input(array![1.0, 2.0].view());
    assert!(matches!(
        result,
        Err(Error::ShapeMismatch {
            expected: 3,
            actual: 2,
            ..
        })
    ));
}

#[test]
fn test_weights_must_cover_bias_row() {
    let mut layer = Layer::new("a", 2, ActivationType::Linear).unwrap();
    assert!(matches!(
        layer.set_weights(array![[1.0], [1.0]]),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_backward_updates_error() {
    // a (2 units) -> b (1 linear unit); a standalone layer has learning rate 0
    let mut a = Layer::new("a", 2, ActivationType::Linear).unwrap();
    a.set_weights(array![[2.0], [-1.0], [0.5]]).unwrap();
    a.set_input(array![1.0, 3.0].view()).unwrap();

    let mut b = Layer::new("b", 1, ActivationType::Linear).unwrap();
    let activated = a.forward(&b.activation()).unwrap();
    assert_eq!(activated, array![-0.5]);
    b.set_input(activated.view()).unwrap();

    // target 0.0, simple error seed t - p
    b.set_error(array![0.5].view()).unwrap();
    a.backward(&b).unwrap();

    // error = w * (t - p) for the real rows, bias row excluded
    assert_eq!(a.error(), array![1.0, -0.5].view());
    assert_eq!(a.weights().unwrap(), &array![[2.0], [-1.0], [0.5]]);
}

#[test]
fn test_backward_step_follows_gradient() {
    let mut network = feedchain::Network::new(0.1);
    network
        .add_layer(Layer::new("a", 2, ActivationType::Linear).unwrap())
        .unwrap();
    network
        .add_layer(Layer::new("b", 1, ActivationType::Linear).unwrap())
        .unwrap();
    network.set_input("a").unwrap();
    network.set_output("b").unwrap();
    network
        .link(&["a", "b"], &mut StdRng::seed_from_u64(0))
        .unwrap();
    network.build().unwrap();
    network
        .set_weights("a", array![[0.0], [0.0], [0.0]])
        .unwrap();

    network.feed_forward(array![1.0, 2.0].view()).unwrap();
    network
        .backpropagate(array![1.0].view(), &feedchain::Loss::MeanSquared)
        .unwrap();

    // Δw = lr * input * (t - p), bias row included
    let weights = network.layer("a").unwrap().weights().unwrap();
    let expected = array![[0.1], [0.2], [0.1]];
    for (w, e) in weights.iter().zip(expected.iter()) {
        assert!((w - e).abs() < 1e-12);
    }
}
