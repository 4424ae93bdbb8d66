use ndarray::{Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix1, Ix2};

use crate::{MlErr, Result, params::ParameterMapping};

/// The inference contract shared by every classifier.
///
/// Implementors only provide `forward_logits` and the parameter plumbing; probabilities and the
/// prediction helpers are derived from the logits.
pub trait Classifier {
    /// Returns the amount of features a single example has.
    fn input_dim(&self) -> usize;

    /// Returns the amount of classes the model scores.
    fn class_count(&self) -> usize;

    /// Computes the raw scores of a batch.
    ///
    /// # Arguments
    /// * `x` - A batch with one example per row, `input_dim` columns wide.
    ///
    /// # Returns
    /// A `(batch, class_count)` array of logits or `MlErr::ShapeMismatch`.
    fn forward_logits(&self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Returns a copy of the model's parameters, named after their slots.
    fn parameters(&self) -> ParameterMapping;

    /// Computes the class probabilities of a batch, softmax over the logits.
    fn forward_probabilities(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.forward_logits(x).map(softmax)
    }

    /// Predicts the class probabilities of a single example.
    fn predict_one(&self, x: &[f32]) -> Result<Vec<f32>> {
        let x = ArrayView1::from(x).insert_axis(Axis(0));
        let probs = self.forward_probabilities(x)?;
        Ok(probs.into_iter().collect())
    }

    /// Predicts the class probabilities of a batch of examples.
    fn predict_batch(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.forward_probabilities(x)
    }

    /// Predicts on either a single example (rank 1) or a batch (rank 2), keeping the rank of
    /// the input. A batch holding a single row is still a batch.
    fn predict(&self, x: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        match x.ndim() {
            1 => {
                let x = x
                    .into_dimensionality::<Ix1>()
                    .map_err(|_| rank_mismatch(1))?;
                let probs = self.forward_probabilities(x.insert_axis(Axis(0)))?;
                Ok(probs.index_axis_move(Axis(0), 0).into_dyn())
            }
            2 => {
                let x = x
                    .into_dimensionality::<Ix2>()
                    .map_err(|_| rank_mismatch(2))?;
                Ok(self.forward_probabilities(x)?.into_dyn())
            }
            got => Err(rank_mismatch(got)),
        }
    }
}

fn rank_mismatch(got: usize) -> MlErr {
    MlErr::ShapeMismatch {
        what: "input rank",
        got,
        expected: 2,
    }
}

/// Row-wise softmax. The row maximum is subtracted first so large logits cannot overflow.
pub fn softmax(mut logits: Array2<f32>) -> Array2<f32> {
    for mut row in logits.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &z| m.max(z));
        row.mapv_inplace(|z| (z - max).exp());
        let sum = row.sum();
        row /= sum;
    }

    logits
}
