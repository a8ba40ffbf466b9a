//! HTTP asset source

use arstage_core::{AssetSource, FetchError};
use gloo_net::http::Request;

/// Fetches assets relative to the page origin
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpAssetSource;

impl AssetSource for HttpAssetSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = Request::get(url)
            .send()
            .await
            .map_err(|e| FetchError(e.to_string()))?;
        if !response.ok() {
            return Err(FetchError(format!(
                "HTTP {} {}",
                response.status(),
                response.status_text()
            )));
        }
        response
            .binary()
            .await
            .map_err(|e| FetchError(e.to_string()))
    }
}
