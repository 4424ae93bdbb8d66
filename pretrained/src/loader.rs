use log::{debug, info};
use machine_learning::{
    Classifier, LinearClassifier, MlErr, MultiLayerClassifier, ParameterMapping,
    error::BindMismatch,
};

use crate::{
    configs::{LoaderConfig, ModelKind},
    deserialize::{ParamDeserializer, TorchDeserializer},
    error::{LoaderErr, Result},
    fetch::{ArtifactRef, HttpFetcher, WeightFetcher},
    model::PretrainedModel,
};

/// The hidden layer widths every pretrained multilayer model was trained with.
pub const MULTILAYER_HIDDEN: [usize; 2] = [100, 100];

/// The amount of classes every pretrained model scores.
pub const CLASS_COUNT: usize = 2;

/// Restores pretrained classifiers: fetches an artifact, infers the model's input width from
/// it and binds its parameters into a freshly built model.
///
/// A load either returns a fully bound model or fails, there is no retry and no fallback.
pub struct ModelLoader<F = HttpFetcher, D = TorchDeserializer> {
    config: LoaderConfig,
    fetcher: F,
    deserializer: D,
}

impl ModelLoader {
    /// Creates a loader downloading `torch.save` checkpoints over HTTP from `config.base_url`.
    ///
    /// # Errors
    /// Returns `LoaderErr::InvalidConfig` if the configuration is invalid.
    pub fn from_config(config: LoaderConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.base_url.clone());
        Self::new(config, fetcher, TorchDeserializer)
    }
}

impl<F: WeightFetcher, D: ParamDeserializer> ModelLoader<F, D> {
    /// Creates a loader with custom collaborators.
    ///
    /// # Arguments
    /// * `config` - Which `(model kind, data set)` pairs exist and where.
    /// * `fetcher` - Retrieves the raw artifacts.
    /// * `deserializer` - Parses the raw artifacts into parameters.
    ///
    /// # Errors
    /// Returns `LoaderErr::InvalidConfig` if the configuration is invalid.
    pub fn new(config: LoaderConfig, fetcher: F, deserializer: D) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            fetcher,
            deserializer,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Loads the pretrained model of `kind` for `dataset`.
    ///
    /// # Arguments
    /// * `dataset` - The name of the data set the model was trained on.
    /// * `kind` - The architecture to load.
    /// * `use_pretrained` - Must be `true`, training from scratch is not supported.
    ///
    /// # Errors
    /// * `LoaderErr::TrainingNotSupported` if `use_pretrained` is `false`.
    /// * `LoaderErr::UnsupportedCombination` if no artifact is registered for the pair.
    /// * Whatever the fetcher or the deserializer fail with.
    /// * `LoaderErr::Model` if the parameters do not fit the architecture.
    pub fn load(&self, dataset: &str, kind: ModelKind, use_pretrained: bool) -> Result<PretrainedModel> {
        if !use_pretrained {
            return Err(LoaderErr::TrainingNotSupported);
        }

        let id = self
            .config
            .registry
            .artifact_id(kind, dataset)
            .ok_or_else(|| LoaderErr::UnsupportedCombination {
                kind,
                dataset: dataset.to_string(),
            })?;

        info!(kind = kind.name(), dataset = dataset, artifact = id; "loading pretrained model");
        let artifact = ArtifactRef { kind, dataset, id };
        let bytes = self.fetcher.fetch(&artifact)?;
        let params = self.deserializer.deserialize(&bytes)?;

        let model = build(kind, &params)?;
        info!(
            kind = kind.name(),
            dataset = dataset,
            input_dim = model.input_dim();
            "pretrained model loaded"
        );

        Ok(model)
    }
}

/// Builds the architecture of `kind` sized after `params` and binds them into it.
///
/// The input width is read from the architecture's input weight. Only when that parameter is
/// absent does the first weight matrix stand in for it, so the bind reports what is wrong.
fn build(kind: ModelKind, params: &ParameterMapping) -> Result<PretrainedModel> {
    let input_weight = match kind {
        ModelKind::Linear => LinearClassifier::INPUT_WEIGHT,
        ModelKind::Multilayer => MultiLayerClassifier::INPUT_WEIGHT,
    };
    let input_dim = params
        .width_of(input_weight)
        .or_else(|| params.input_dim())
        .ok_or_else(|| MlErr::ParameterBindMismatch {
            name: input_weight.to_string(),
            kind: BindMismatch::Missing,
        })?;
    debug!(tensors = params.len(), input_dim = input_dim; "inferred input width");

    let model = match kind {
        ModelKind::Linear => {
            let mut model = LinearClassifier::new(input_dim, CLASS_COUNT)?;
            model.bind(params)?;
            PretrainedModel::Linear(model)
        }
        ModelKind::Multilayer => {
            let mut model =
                MultiLayerClassifier::new(input_dim, &MULTILAYER_HIDDEN, CLASS_COUNT, "relu")?;
            model.bind(params)?;
            PretrainedModel::Multilayer(model)
        }
    };

    Ok(model)
}

#[cfg(test)]
mod tests {
    use machine_learning::Tensor;
    use ndarray::IxDyn;

    use super::*;

    fn params(entries: &[(&str, &[usize])]) -> ParameterMapping {
        entries
            .iter()
            .map(|(name, shape)| (name.to_string(), Tensor::zeros(IxDyn(shape))))
            .collect()
    }

    #[test]
    fn build_infers_input_width() {
        let linear = build(
            ModelKind::Linear,
            &params(&[("linear.weight", &[2, 13]), ("linear.bias", &[2])]),
        )
        .unwrap();
        assert_eq!(linear.kind(), ModelKind::Linear);
        assert_eq!(linear.input_dim(), 13);

        let mlp = build(
            ModelKind::Multilayer,
            &params(&[
                ("network.0.weight", &[100, 7]),
                ("network.0.bias", &[100]),
                ("network.2.weight", &[100, 100]),
                ("network.2.bias", &[100]),
                ("network.4.weight", &[2, 100]),
                ("network.4.bias", &[2]),
            ]),
        )
        .unwrap();
        assert_eq!(mlp.input_dim(), 7);
        assert_eq!(mlp.as_multilayer().unwrap().hidden_layer_count(), 2);
    }

    #[test]
    fn build_reads_width_from_the_input_layer() {
        let mlp = build(
            ModelKind::Multilayer,
            &params(&[
                ("network.0.bias", &[100]),
                ("network.2.bias", &[100]),
                ("network.2.weight", &[100, 100]),
                ("network.4.bias", &[2]),
                ("network.4.weight", &[2, 100]),
                ("network.0.weight", &[100, 7]),
            ]),
        )
        .unwrap();
        assert_eq!(mlp.input_dim(), 7);
    }

    #[test]
    fn build_without_weights_fails() {
        let err = build(ModelKind::Linear, &params(&[("linear.bias", &[2])])).unwrap_err();
        assert!(matches!(
            err,
            LoaderErr::Model(MlErr::ParameterBindMismatch {
                kind: BindMismatch::Missing,
                ..
            })
        ));
    }

    #[test]
    fn build_rejects_other_architectures() {
        let err = build(
            ModelKind::Multilayer,
            &params(&[("linear.weight", &[2, 5]), ("linear.bias", &[2])]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoaderErr::Model(MlErr::ParameterBindMismatch {
                kind: BindMismatch::Unexpected,
                ..
            })
        ));
    }
}
