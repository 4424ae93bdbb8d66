use ndarray::{Array2, ArrayView2};

use super::{Classifier, activations::ActFn, layers::Dense};
use crate::{
    MlErr, Result,
    params::{self, ParameterMapping},
};

/// A multi-layer perceptron: information flows forward through a sequence of dense layers,
/// every one but the last followed by the same activation.
///
/// Parameters are named after their position in the exported sequential network, where the
/// activations take the odd positions: layer `i` owns `network.{2i}.weight` and
/// `network.{2i}.bias`.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiLayerClassifier {
    layers: Vec<Dense>,
    act_fn: ActFn,
}

impl MultiLayerClassifier {
    /// The name of the first layer's weight matrix, which the input width is read from.
    pub const INPUT_WEIGHT: &str = "network.0.weight";

    /// Creates a new zero-filled `MultiLayerClassifier`.
    ///
    /// # Arguments
    /// * `input_dim` - The amount of features per example.
    /// * `hidden` - The width of every hidden layer, in order.
    /// * `class_count` - The amount of classes.
    /// * `activation` - The name of the activation used after every hidden layer.
    ///
    /// # Returns
    /// A new `MultiLayerClassifier` or an error if the activation is unknown or any width is 0.
    pub fn new(
        input_dim: usize,
        hidden: &[usize],
        class_count: usize,
        activation: &str,
    ) -> Result<Self> {
        let act_fn = ActFn::resolve(activation)?;

        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut prev = input_dim;
        for &width in hidden {
            layers.push(Dense::new((prev, width), Some(act_fn))?);
            prev = width;
        }
        layers.push(Dense::new((prev, class_count), None)?);

        Ok(Self { layers, act_fn })
    }

    /// Creates a new two class `MultiLayerClassifier` with `relu` activations.
    pub fn binary(input_dim: usize, hidden: &[usize]) -> Result<Self> {
        Self::new(input_dim, hidden, 2, "relu")
    }

    /// The layers of the network, the output layer last.
    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn hidden_layer_count(&self) -> usize {
        self.layers.len() - 1
    }

    pub fn activation(&self) -> ActFn {
        self.act_fn
    }

    /// Same as `predict_batch`.
    pub fn predict_probabilities(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.predict_batch(x)
    }

    /// Returns the representation of a batch at a hidden layer.
    ///
    /// The batch goes through the first `hidden_layer_index` hidden layers, then through the
    /// affine transform of the requested one and, if `post_activation` is set, its activation.
    ///
    /// # Arguments
    /// * `x` - A batch with one example per row.
    /// * `hidden_layer_index` - The hidden layer to stop at, starting at 0.
    /// * `post_activation` - Whether to return the output after or before the activation.
    ///
    /// # Returns
    /// A `(batch, width)` array or `MlErr::LayerIndexOutOfRange`.
    pub fn extract_layer_activation(
        &self,
        x: ArrayView2<f32>,
        hidden_layer_index: usize,
        post_activation: bool,
    ) -> Result<Array2<f32>> {
        let hidden_layers = self.hidden_layer_count();
        if hidden_layer_index >= hidden_layers {
            return Err(MlErr::LayerIndexOutOfRange {
                requested: hidden_layer_index,
                hidden_layers,
            });
        }
        self.check_width(x)?;

        let target = &self.layers[hidden_layer_index];
        let a = self.run(&self.layers[..hidden_layer_index], x)?;
        let z = target.affine(a.view())?;

        Ok(if post_activation {
            target.activate(z)
        } else {
            z
        })
    }

    /// Binds pretrained parameters onto this model.
    pub fn bind(&mut self, params: &ParameterMapping) -> Result<()> {
        params::bind_dense(
            params,
            self.layers
                .iter_mut()
                .enumerate()
                .map(|(i, layer)| (slot_prefix(i), layer)),
        )
    }

    fn check_width(&self, x: ArrayView2<f32>) -> Result<()> {
        if x.ncols() != self.input_dim() {
            return Err(MlErr::ShapeMismatch {
                what: "feature count",
                got: x.ncols(),
                expected: self.input_dim(),
            });
        }

        Ok(())
    }

    /// Runs a slice of layers over `x`, an empty slice returns a copy of `x`.
    fn run(&self, layers: &[Dense], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let Some((first, rest)) = layers.split_first() else {
            return Ok(x.to_owned());
        };

        let mut a = first.forward(x)?;
        for layer in rest {
            a = layer.forward(a.view())?;
        }

        Ok(a)
    }
}

fn slot_prefix(layer: usize) -> String {
    format!("network.{}", 2 * layer)
}

impl Classifier for MultiLayerClassifier {
    fn input_dim(&self) -> usize {
        self.layers[0].input_dim()
    }

    fn class_count(&self) -> usize {
        self.layers[self.layers.len() - 1].output_dim()
    }

    fn forward_logits(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_width(x)?;
        self.run(&self.layers, x)
    }

    fn parameters(&self) -> ParameterMapping {
        params::export_dense(
            self.layers
                .iter()
                .enumerate()
                .map(|(i, layer)| (slot_prefix(i), layer)),
        )
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::error::BindMismatch;

    #[test]
    fn builds_one_layer_more_than_hidden() {
        let model = MultiLayerClassifier::new(5, &[4, 3], 2, "tanh").unwrap();
        let dims: Vec<_> = model
            .layers()
            .iter()
            .map(|l| (l.input_dim(), l.output_dim(), l.act_fn()))
            .collect();

        assert_eq!(
            dims,
            [
                (5, 4, Some(ActFn::Tanh)),
                (4, 3, Some(ActFn::Tanh)),
                (3, 2, None)
            ]
        );
        assert_eq!(model.hidden_layer_count(), 2);
        assert_eq!(model.input_dim(), 5);
        assert_eq!(model.class_count(), 2);
    }

    #[test]
    fn no_hidden_layers_is_a_linear_model() {
        let model = MultiLayerClassifier::new(3, &[], 4, "relu").unwrap();
        assert_eq!(model.hidden_layer_count(), 0);
        assert_eq!(
            model.extract_layer_activation(array![[1f32, 2., 3.]].view(), 0, true),
            Err(MlErr::LayerIndexOutOfRange {
                requested: 0,
                hidden_layers: 0,
            })
        );
    }

    #[test]
    fn rejects_unknown_activation() {
        assert_eq!(
            MultiLayerClassifier::new(3, &[2], 2, "gelu"),
            Err(MlErr::UnsupportedActivation {
                name: "gelu".into()
            })
        );
    }

    #[test]
    fn slots_follow_sequential_positions() {
        let model = MultiLayerClassifier::binary(3, &[4, 4]).unwrap();
        let names: Vec<_> = model.parameters().names().map(str::to_string).collect();
        assert_eq!(
            names,
            [
                "network.0.weight",
                "network.0.bias",
                "network.2.weight",
                "network.2.bias",
                "network.4.weight",
                "network.4.bias",
            ]
        );
    }

    #[test]
    fn bind_requires_every_layer() {
        let mut model = MultiLayerClassifier::binary(3, &[4]).unwrap();
        let mut params = MultiLayerClassifier::binary(3, &[4]).unwrap().parameters();
        params.insert("network.4.weight", ndarray::ArrayD::zeros(ndarray::IxDyn(&[2, 2])));

        assert_eq!(
            model.bind(&params),
            Err(MlErr::ParameterBindMismatch {
                name: "network.4.weight".into(),
                kind: BindMismatch::Unexpected,
            })
        );
    }

    #[test]
    fn pre_and_post_activation() {
        let mut model = MultiLayerClassifier::binary(2, &[2]).unwrap();
        let params: ParameterMapping = [
            ("network.0.weight", array![[1., 0.], [0., -1.]].into_dyn()),
            ("network.0.bias", array![0., 0.].into_dyn()),
            ("network.2.weight", array![[1., 1.], [-1., -1.]].into_dyn()),
            ("network.2.bias", array![0., 0.].into_dyn()),
        ]
        .into_iter()
        .collect();
        model.bind(&params).unwrap();

        let x = array![[3f32, 2.]];
        let pre = model.extract_layer_activation(x.view(), 0, false).unwrap();
        let post = model.extract_layer_activation(x.view(), 0, true).unwrap();

        assert_eq!(pre, array![[3f32, -2.]]);
        assert_eq!(post, array![[3f32, 0.]]);
        assert_eq!(
            model.forward_logits(x.view()).unwrap(),
            array![[3f32, -3.]]
        );
    }

    #[test]
    fn extract_rejects_wrong_feature_count() {
        let model = MultiLayerClassifier::binary(3, &[4]).unwrap();
        assert!(matches!(
            model.extract_layer_activation(array![[1f32, 2.]].view(), 0, true),
            Err(MlErr::ShapeMismatch { got: 2, expected: 3, .. })
        ));
    }
}
