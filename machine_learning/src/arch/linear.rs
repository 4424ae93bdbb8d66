use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::{Classifier, layers::Dense};
use crate::{
    MlErr, Result,
    params::{self, ParameterMapping},
};

const PREFIX: &str = "linear";

/// Logistic regression: a single affine layer followed by a softmax.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearClassifier {
    linear: Dense,
}

impl LinearClassifier {
    /// The name of the weight matrix the input width is read from.
    pub const INPUT_WEIGHT: &str = "linear.weight";

    /// Creates a new zero-filled `LinearClassifier`.
    ///
    /// # Arguments
    /// * `input_dim` - The amount of features per example.
    /// * `class_count` - The amount of classes.
    ///
    /// # Returns
    /// A new `LinearClassifier` or `MlErr::EmptyDimension` if either size is 0.
    pub fn new(input_dim: usize, class_count: usize) -> Result<Self> {
        let linear = Dense::new((input_dim, class_count), None)?;
        Ok(Self { linear })
    }

    /// Creates a new two class `LinearClassifier`.
    pub fn binary(input_dim: usize) -> Result<Self> {
        Self::new(input_dim, 2)
    }

    /// The `(class_count, input_dim)` weight matrix.
    pub fn weights(&self) -> ArrayView2<'_, f32> {
        self.linear.weights()
    }

    pub fn bias(&self) -> ArrayView1<'_, f32> {
        self.linear.bias()
    }

    /// Returns the exact feature attribution of a binary model: the weights of class 1 minus
    /// the weights of class 0.
    ///
    /// # Returns
    /// A vector of length `input_dim`, or `MlErr::ShapeMismatch` if the model does not have
    /// exactly two classes.
    pub fn ground_truth_importance(&self) -> Result<Array1<f32>> {
        let class_count = self.class_count();
        if class_count != 2 {
            return Err(MlErr::ShapeMismatch {
                what: "class count",
                got: class_count,
                expected: 2,
            });
        }

        let w = self.linear.weights();
        Ok(&w.row(1) - &w.row(0))
    }

    /// Binds pretrained parameters, `linear.weight` and `linear.bias`, onto this model.
    pub fn bind(&mut self, params: &ParameterMapping) -> Result<()> {
        params::bind_dense(params, [(PREFIX.to_string(), &mut self.linear)])
    }
}

impl Classifier for LinearClassifier {
    fn input_dim(&self) -> usize {
        self.linear.input_dim()
    }

    fn class_count(&self) -> usize {
        self.linear.output_dim()
    }

    fn forward_logits(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.input_dim() {
            return Err(MlErr::ShapeMismatch {
                what: "feature count",
                got: x.ncols(),
                expected: self.input_dim(),
            });
        }

        self.linear.affine(x)
    }

    fn parameters(&self) -> ParameterMapping {
        params::export_dense([(PREFIX.to_string(), &self.linear)])
    }
}
