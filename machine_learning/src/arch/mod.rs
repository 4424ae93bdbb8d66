pub mod activations;
pub mod layers;
mod linear;
mod model;
mod sequential;

pub use linear::LinearClassifier;
pub use model::{Classifier, softmax};
pub use sequential::MultiLayerClassifier;
