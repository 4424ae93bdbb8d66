use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// Why a parameter could not be bound to a model slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindMismatch {
    /// The model has no slot with this name.
    Unexpected,
    /// The slot exists but the mapping never provided it.
    Missing,
    /// The slot exists but the tensor has a different shape.
    Shape { got: Vec<usize>, expected: Vec<usize> },
}

/// The machine learning module's error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MlErr {
    UnsupportedActivation {
        name: String,
    },
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    LayerIndexOutOfRange {
        requested: usize,
        hidden_layers: usize,
    },
    ParameterBindMismatch {
        name: String,
        kind: BindMismatch,
    },
    EmptyDimension {
        what: &'static str,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MlErr::UnsupportedActivation { name } => format!(
                "Unsupported activation function `{name}`, expected one of relu, leaky_relu, sigmoid or tanh"
            ),
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => {
                format!("There's a shape mismatch in the {what}, got {got} and expected {expected}")
            }
            MlErr::LayerIndexOutOfRange {
                requested,
                hidden_layers,
            } => format!(
                "The model has only {hidden_layers} hidden layers, but hidden layer {requested} was requested (indexing starts at 0)"
            ),
            MlErr::ParameterBindMismatch { name, kind } => match kind {
                BindMismatch::Unexpected => {
                    format!("The parameter `{name}` has no matching slot in the model")
                }
                BindMismatch::Missing => {
                    format!("The model slot `{name}` was not provided by the parameters")
                }
                BindMismatch::Shape { got, expected } => format!(
                    "The parameter `{name}` has shape {got:?} but its slot expects {expected:?}"
                ),
            },
            MlErr::EmptyDimension { what } => format!("The {what} must be greater than 0"),
        };

        write!(f, "{s}")
    }
}

impl Error for MlErr {}
