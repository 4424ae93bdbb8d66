use std::{fmt, str::FromStr};

use ndarray::Array2;

use super::{LeakyRelu, Sigmoid};
use crate::{MlErr, Result};

/// An element-wise nonlinearity. Every variant is stateless after construction, so a single
/// value can be copied into as many layers as needed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActFn {
    Relu,
    LeakyRelu(LeakyRelu),
    Sigmoid(Sigmoid),
    Tanh,
}
use ActFn::*;

impl ActFn {
    /// Resolves an activation function by its symbolic name.
    ///
    /// # Arguments
    /// * `name` - One of `relu`, `leaky_relu`, `sigmoid` or `tanh`.
    ///
    /// # Returns
    /// The matching activation or `MlErr::UnsupportedActivation`.
    pub fn resolve(name: &str) -> Result<Self> {
        match name {
            "relu" => Ok(Relu),
            "leaky_relu" => Ok(Self::leaky_relu(LeakyRelu::default())),
            "sigmoid" => Ok(Self::sigmoid(Sigmoid::default())),
            "tanh" => Ok(Tanh),
            _ => Err(MlErr::UnsupportedActivation {
                name: name.to_string(),
            }),
        }
    }

    pub fn sigmoid(inner: Sigmoid) -> Self {
        Sigmoid(inner)
    }

    pub fn leaky_relu(inner: LeakyRelu) -> Self {
        LeakyRelu(inner)
    }

    /// The symbolic name this activation resolves from.
    pub fn name(&self) -> &'static str {
        match self {
            Relu => "relu",
            LeakyRelu(_) => "leaky_relu",
            Sigmoid(_) => "sigmoid",
            Tanh => "tanh",
        }
    }

    pub fn f(&self, x: f32) -> f32 {
        match self {
            Relu => x.max(0.),
            LeakyRelu(a) => a.f(x),
            Sigmoid(a) => a.f(x),
            Tanh => x.tanh(),
        }
    }

    /// Applies the activation to every element of `z`, reusing its buffer.
    pub fn apply(&self, z: Array2<f32>) -> Array2<f32> {
        z.mapv_into(|z| self.f(z))
    }
}

impl FromStr for ActFn {
    type Err = MlErr;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

impl fmt::Display for ActFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
