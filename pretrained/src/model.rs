use machine_learning::{
    Classifier, LinearClassifier, MultiLayerClassifier, ParameterMapping, Result,
};
use ndarray::{Array2, ArrayView2};

use crate::configs::ModelKind;

/// A classifier restored from a pretrained artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum PretrainedModel {
    Linear(LinearClassifier),
    Multilayer(MultiLayerClassifier),
}
use PretrainedModel::*;

impl PretrainedModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            Linear(_) => ModelKind::Linear,
            Multilayer(_) => ModelKind::Multilayer,
        }
    }

    pub fn as_linear(&self) -> Option<&LinearClassifier> {
        match self {
            Linear(m) => Some(m),
            Multilayer(_) => None,
        }
    }

    pub fn as_multilayer(&self) -> Option<&MultiLayerClassifier> {
        match self {
            Linear(_) => None,
            Multilayer(m) => Some(m),
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Linear(m) => m,
            Multilayer(m) => m,
        }
    }
}

impl Classifier for PretrainedModel {
    fn input_dim(&self) -> usize {
        self.inner().input_dim()
    }

    fn class_count(&self) -> usize {
        self.inner().class_count()
    }

    fn forward_logits(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.inner().forward_logits(x)
    }

    fn parameters(&self) -> ParameterMapping {
        self.inner().parameters()
    }
}
