use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::{error::GenerationError, media::EncodedImage};

/// Retrieves a model reference image and encodes it like the user image.
#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<EncodedImage, GenerationError>;
}

pub struct HttpReferenceFetcher {
    client: Client,
}

impl HttpReferenceFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ReferenceFetcher for HttpReferenceFetcher {
    async fn fetch(&self, url: &str) -> Result<EncodedImage, GenerationError> {
        info!("🔗 Fetching reference image: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!("Reference fetch failed for {}: {} (timeout={}, connect={})", url, e, e.is_timeout(), e.is_connect());
            GenerationError::ReferenceFetch(format!("request to {url} failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Reference fetch for {} returned status {}", url, status);
            return Err(GenerationError::ReferenceFetch(format!("{url} returned HTTP {status}")));
        }

        let body: bytes::Bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::ReferenceFetch(format!("reading body of {url} failed: {e}")))?;
        if body.is_empty() {
            return Err(GenerationError::ReferenceFetch(format!("{url} returned an empty body")));
        }
        let image = EncodedImage::from_bytes(&body)
            .map_err(|_| GenerationError::ReferenceFetch(format!("{url} did not return a decodable image")))?;
        info!("📥 Reference image fetched ({}, {} bytes)", image.mime_type, body.len());
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::JPEG_BYTES;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpReferenceFetcher {
        HttpReferenceFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_encodes_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/woman_1.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG_BYTES))
            .mount(&server)
            .await;

        let image = fetcher().fetch(&format!("{}/woman_1.jpg", server.uri())).await.unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.decode().unwrap(), JPEG_BYTES);
    }

    #[tokio::test]
    async fn non_success_status_is_a_reference_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher().fetch(&format!("{}/missing.jpg", server.uri())).await.unwrap_err();
        assert!(matches!(err, GenerationError::ReferenceFetch(msg) if msg.contains("404")));
    }

    #[tokio::test]
    async fn non_image_payload_is_a_reference_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
            .mount(&server)
            .await;

        let err = fetcher().fetch(&format!("{}/page", server.uri())).await.unwrap_err();
        assert!(matches!(err, GenerationError::ReferenceFetch(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_reference_failure() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let err = fetcher().fetch(&format!("{uri}/gone.png")).await.unwrap_err();
        assert!(matches!(err, GenerationError::ReferenceFetch(_)));
    }
}
