use std::{collections::BTreeMap, fmt, str::FromStr, sync::LazyLock};

use serde::{Deserialize, Serialize};

use crate::error::LoaderErr;

/// The architectures pretrained artifacts exist for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Logistic regression.
    #[serde(alias = "lr")]
    Linear,
    /// Two hidden layer perceptron.
    #[serde(alias = "ann")]
    Multilayer,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Multilayer => "multilayer",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = LoaderErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" | "lr" => Ok(Self::Linear),
            "multilayer" | "ann" => Ok(Self::Multilayer),
            other => Err(LoaderErr::InvalidConfig(format!(
                "unknown model kind `{other}`, expected `linear` or `multilayer`"
            ))),
        }
    }
}

/// Maps every supported `(model kind, data set)` pair to the id of its artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub linear: BTreeMap<String, String>,
    #[serde(default)]
    pub multilayer: BTreeMap<String, String>,
}

static REFERENCE: LazyLock<Registry> = LazyLock::new(|| {
    let table = |entries: [(&str, &str); 8]| {
        entries
            .into_iter()
            .map(|(dataset, id)| (dataset.to_string(), id.to_string()))
            .collect()
    };

    Registry {
        linear: table([
            ("adult", "8550955"),
            ("compas", "8550949"),
            ("gaussian", "8550960"),
            ("german", "8550945"),
            ("gmsc", "8550948"),
            ("heart", "8550956"),
            ("heloc", "8550950"),
            ("pima", "8550959"),
        ]),
        multilayer: table([
            ("adult", "8550958"),
            ("compas", "8550951"),
            ("gaussian", "8550957"),
            ("german", "8550946"),
            ("gmsc", "8550947"),
            ("heart", "8550954"),
            ("heloc", "8550952"),
            ("pima", "8550953"),
        ]),
    }
});

impl Registry {
    /// The registry of the published pretrained models, built once per process.
    pub fn reference() -> &'static Registry {
        &REFERENCE
    }

    fn table(&self, kind: ModelKind) -> &BTreeMap<String, String> {
        match kind {
            ModelKind::Linear => &self.linear,
            ModelKind::Multilayer => &self.multilayer,
        }
    }

    pub fn artifact_id(&self, kind: ModelKind, dataset: &str) -> Option<&str> {
        self.table(kind).get(dataset).map(String::as_str)
    }

    /// The data sets with an artifact for `kind`, in alphabetical order.
    pub fn datasets(&self, kind: ModelKind) -> impl Iterator<Item = &str> {
        self.table(kind).keys().map(String::as_str)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (ModelKind, &str, &str)> {
        let linear = self
            .linear
            .iter()
            .map(|(d, id)| (ModelKind::Linear, d.as_str(), id.as_str()));
        let multilayer = self
            .multilayer
            .iter()
            .map(|(d, id)| (ModelKind::Multilayer, d.as_str(), id.as_str()));
        linear.chain(multilayer)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::reference().clone()
    }
}
