pub mod arch;
pub mod error;
pub mod params;
mod test;

pub use arch::{Classifier, LinearClassifier, MultiLayerClassifier};
pub use error::{MlErr, Result};
pub use params::{ParameterMapping, Tensor};
