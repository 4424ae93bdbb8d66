pub mod configs;
pub mod deserialize;
pub mod error;
pub mod fetch;
mod loader;
mod model;

pub use configs::{LoaderConfig, ModelKind, Registry};
pub use error::{LoaderErr, Result};
pub use loader::{CLASS_COUNT, MULTILAYER_HIDDEN, ModelLoader};
pub use model::PretrainedModel;

/// Loads a pretrained model from the published artifact store.
///
/// # Errors
/// Returns a `LoaderErr` if the pair is not published, `use_pretrained` is `false` or the
/// artifact cannot be downloaded or bound.
pub fn load(dataset: &str, kind: ModelKind, use_pretrained: bool) -> Result<PretrainedModel> {
    ModelLoader::from_config(LoaderConfig::default())?.load(dataset, kind, use_pretrained)
}
