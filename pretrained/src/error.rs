use std::{error::Error, fmt, io};

use machine_learning::MlErr;

use crate::configs::ModelKind;

/// The loader's result type.
pub type Result<T> = std::result::Result<T, LoaderErr>;

/// All errors that can occur while loading a pretrained model.
#[derive(Debug)]
pub enum LoaderErr {
    /// The registry has no artifact for this dataset and model kind.
    UnsupportedCombination { kind: ModelKind, dataset: String },
    /// Only pretrained models can be loaded.
    TrainingNotSupported,
    /// The artifact store answered, but has no such artifact.
    ArtifactNotFound { url: String },
    /// The artifact could not be downloaded.
    Network { url: String, source: reqwest::Error },
    /// The downloaded bytes are not a valid parameter file.
    CorruptArtifact(String),
    /// Invalid configuration, caught before any download.
    InvalidConfig(String),
    /// The parameters do not fit the model they were loaded into.
    Model(MlErr),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for LoaderErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedCombination { kind, dataset } => write!(
                f,
                "the `{dataset}` data set is not supported for {kind} models"
            ),
            Self::TrainingNotSupported => {
                write!(f, "training a model from scratch is not supported")
            }
            Self::ArtifactNotFound { url } => write!(f, "artifact not found at {url}"),
            Self::Network { url, source } => write!(f, "failed to download {url}: {source}"),
            Self::CorruptArtifact(msg) => write!(f, "corrupt artifact: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Model(e) => write!(f, "model error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for LoaderErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Network { source, .. } => Some(source),
            Self::Model(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for LoaderErr {
    fn from(e: MlErr) -> Self {
        Self::Model(e)
    }
}

impl From<io::Error> for LoaderErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
