use log::{debug, warn};
use reqwest::{StatusCode, blocking::Client};

use crate::{
    configs::ModelKind,
    error::{LoaderErr, Result},
};

/// Everything needed to address one artifact in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactRef<'a> {
    pub kind: ModelKind,
    pub dataset: &'a str,
    pub id: &'a str,
}

/// Retrieves the raw bytes of a serialized parameter file.
pub trait WeightFetcher {
    fn fetch(&self, artifact: &ArtifactRef<'_>) -> Result<Vec<u8>>;
}

impl<T: WeightFetcher + ?Sized> WeightFetcher for &T {
    fn fetch(&self, artifact: &ArtifactRef<'_>) -> Result<Vec<u8>> {
        (**self).fetch(artifact)
    }
}

/// Downloads artifacts over HTTP as `base_url + id`, blocking the calling thread.
///
/// There is no timeout nor retry, callers that need them wrap `ModelLoader::load`.
pub struct HttpFetcher {
    client: Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn url(&self, artifact: &ArtifactRef<'_>) -> String {
        format!("{}{}", self.base_url, artifact.id)
    }
}

impl WeightFetcher for HttpFetcher {
    fn fetch(&self, artifact: &ArtifactRef<'_>) -> Result<Vec<u8>> {
        let url = self.url(artifact);
        debug!(kind = artifact.kind.name(), dataset = artifact.dataset; "downloading {url}");

        let response = self.client.get(&url).send().map_err(|source| {
            warn!("request to {url} failed: {source}");
            LoaderErr::Network {
                url: url.clone(),
                source,
            }
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LoaderErr::ArtifactNotFound { url });
        }

        let bytes = response
            .error_for_status()
            .and_then(|response| response.bytes())
            .map_err(|source| {
                warn!("download of {url} failed: {source}");
                LoaderErr::Network {
                    url: url.clone(),
                    source,
                }
            })?;

        debug!(bytes = bytes.len(); "downloaded {url}");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_base_plus_id() {
        let fetcher = HttpFetcher::new("https://example.org/files/");
        let artifact = ArtifactRef {
            kind: ModelKind::Linear,
            dataset: "adult",
            id: "8550955",
        };
        assert_eq!(fetcher.url(&artifact), "https://example.org/files/8550955");
    }
}
