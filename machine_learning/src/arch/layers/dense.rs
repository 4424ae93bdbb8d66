use ndarray::prelude::*;

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer: an affine transform optionally followed by an activation.
///
/// Weights are stored `(out, in)`, the layout the pretrained artifacts use, so the forward pass
/// computes `x · wᵀ + b`.
#[derive(Clone, Debug, PartialEq)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    w: Array2<f32>,
    b: Array1<f32>,
}

impl Dense {
    /// Creates a zero-filled `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The `(input, output)` widths of the layer.
    /// * `act_fn` - The activation applied after the affine transform, if any.
    ///
    /// # Returns
    /// A new `Dense` instance or `MlErr::EmptyDimension` if either width is 0.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Result<Self> {
        let (n, m) = dim;
        if n == 0 {
            return Err(MlErr::EmptyDimension {
                what: "layer input width",
            });
        }
        if m == 0 {
            return Err(MlErr::EmptyDimension {
                what: "layer output width",
            });
        }

        Ok(Self {
            dim,
            act_fn,
            w: Array2::zeros((m, n)),
            b: Array1::zeros(m),
        })
    }

    pub fn input_dim(&self) -> usize {
        self.dim.0
    }

    pub fn output_dim(&self) -> usize {
        self.dim.1
    }

    pub fn act_fn(&self) -> Option<ActFn> {
        self.act_fn
    }

    pub fn weights(&self) -> ArrayView2<'_, f32> {
        self.w.view()
    }

    pub fn bias(&self) -> ArrayView1<'_, f32> {
        self.b.view()
    }

    /// Computes the affine part of the layer, `x · wᵀ + b`.
    ///
    /// # Arguments
    /// * `x` - A batch of rows of width `input_dim`.
    ///
    /// # Returns
    /// The pre-activation output or `MlErr::ShapeMismatch` if the batch width is wrong.
    pub fn affine(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::ShapeMismatch {
                what: "layer input width",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        Ok(x.dot(&self.w.t()) + &self.b)
    }

    /// Applies this layer's activation to a pre-activation output. Layers without one return
    /// `z` untouched.
    pub fn activate(&self, z: Array2<f32>) -> Array2<f32> {
        match self.act_fn {
            Some(ref act_fn) => act_fn.apply(z),
            None => z,
        }
    }

    pub fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let z = self.affine(x)?;
        Ok(self.activate(z))
    }

    pub(crate) fn weight_shape(&self) -> [usize; 2] {
        [self.dim.1, self.dim.0]
    }

    pub(crate) fn bias_shape(&self) -> [usize; 1] {
        [self.dim.1]
    }

    pub(crate) fn set_params(&mut self, w: Array2<f32>, b: Array1<f32>) {
        debug_assert_eq!(w.shape(), &self.weight_shape()[..]);
        debug_assert_eq!(b.shape(), &self.bias_shape()[..]);
        self.w = w;
        self.b = b;
    }
}
