#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use async_trait::async_trait;
use futures_util::future::try_join_all;
use html2md::parse_html;
use promptline::{retrieval::DocumentSource, Document, Error, Result};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Client,
};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub user_agent: String,
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            user_agent: concat!("promptline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Fetches a fixed list of pages and turns each one into a text [`Document`].
#[derive(Debug, Clone)]
pub struct WebLoader {
    urls: Vec<Url>,
    client: Client,
}

impl WebLoader {
    /// # Errors
    ///
    /// Returns [`Error::SourceUnreachable`] if a url is invalid or the HTTP client can't be built.
    pub fn new<S: AsRef<str>>(urls: &[S], config: &Config) -> Result<Self> {
        let urls = urls
            .iter()
            .map(|url| {
                Url::parse(url.as_ref()).map_err(|e| Error::SourceUnreachable {
                    url: url.as_ref().to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let mut client = Client::builder()
            .gzip(true)
            .brotli(true)
            .default_headers(headers)
            .user_agent(&config.user_agent);

        if let Some(timeout) = config.timeout {
            client = client.timeout(timeout);
        }

        let client = client.build().map_err(|e| Error::SourceUnreachable {
            url: urls.first().map(ToString::to_string).unwrap_or_default(),
            reason: e.to_string(),
        })?;

        Ok(Self { urls, client })
    }

    #[must_use]
    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    async fn fetch(&self, url: &Url) -> Result<Document> {
        debug!("Fetching {url}");
        let to_error = |e: reqwest::Error| Error::SourceUnreachable {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let html = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(to_error)?
            .error_for_status()
            .map_err(to_error)?
            .text()
            .await
            .map_err(to_error)?;

        let content = html_to_text(&html);
        debug!("Fetched {url} ({} chars of text)", content.len());

        Ok(Document::new(url.as_str(), content))
    }
}

#[async_trait]
impl DocumentSource for WebLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let documents = try_join_all(self.urls.iter().map(|url| self.fetch(url))).await?;
        info!("Loaded {} pages", documents.len());

        Ok(documents)
    }
}

/// Converts an HTML page into markdown-flavoured plain text.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    parse_html(html).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_reject_invalid_urls() {
        let result = WebLoader::new(&["not a url"], &Config::default());

        assert!(matches!(
            result,
            Err(Error::SourceUnreachable { url, .. }) if url == "not a url"
        ));
    }

    #[tokio::test]
    async fn should_report_unreachable_source() {
        // Given
        let loader = WebLoader::new(
            &["http://127.0.0.1:9/docs/"],
            &Config {
                timeout: Some(Duration::from_secs(2)),
                ..Config::default()
            },
        )
        .unwrap();

        // When
        let result = loader.load().await;

        // Then
        assert!(matches!(
            result,
            Err(Error::SourceUnreachable { url, .. }) if url == "http://127.0.0.1:9/docs/"
        ));
    }

    #[tokio::test]
    async fn should_load_nothing_without_urls() {
        let loader = WebLoader::new::<&str>(&[], &Config::default()).unwrap();

        assert!(loader.load().await.unwrap().is_empty());
    }

    #[test]
    fn should_strip_markup() {
        let text = html_to_text(
            "<html><body><h1>Tools</h1><p>Agents can use <b>tools</b>.</p></body></html>",
        );

        assert!(text.contains("Tools"));
        assert!(text.contains("Agents can use"));
        assert!(!text.contains("<p>"));
    }
}
