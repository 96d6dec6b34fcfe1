use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::{NowPlayingError, Result};

/// Default timeout for album-art downloads.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// Downloads remote assets such as album art.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP GET fetcher.
#[derive(Debug, Clone)]
pub struct HttpAssetFetcher {
    client: Client,
    timeout: Duration,
}

impl Default for HttpAssetFetcher {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl HttpAssetFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(%url, "downloading asset");
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| NowPlayingError::fetch(format!("{url}: {err}")))?;

        if !response.status().is_success() {
            return Err(NowPlayingError::fetch(format!(
                "{url}: server returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| NowPlayingError::fetch(format!("{url}: {err}")))?;
        Ok(bytes.to_vec())
    }
}

/// Reads assets from the local filesystem; `url` is a path.
///
/// Used by the offline `render` command and in tests.
#[derive(Debug, Clone, Default)]
pub struct FileAssetFetcher;

#[async_trait]
impl AssetFetcher for FileAssetFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read(path)
            .await
            .map_err(|err| NowPlayingError::fetch(format!("{path}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_fetcher_reads_local_files() {
        let path = std::env::temp_dir().join(format!("np-asset-{}.bin", std::process::id()));
        std::fs::write(&path, b"art").unwrap();

        let url = format!("file://{}", path.display());
        let bytes = FileAssetFetcher.fetch_bytes(&url).await.unwrap();
        assert_eq!(bytes, b"art");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_fetch_error() {
        let err = FileAssetFetcher
            .fetch_bytes("/no/such/cover.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, NowPlayingError::Fetch(_)));
    }
}
