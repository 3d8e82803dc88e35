//! HTTP retrieval of per-region listing pages.

use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://concursosnobrasil.com/concursos";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_USER_AGENT: &str = "cnb-tracker/0.1 (public job competition monitor)";

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Listing root; the region code is appended as a path segment.
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Retrieves raw listing markup for one region. Stateless apart from the
/// shared connection pool; safe to clone into concurrent tasks.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn listing_url(&self, region_code: &str) -> String {
        format!("{}/{}/", self.base_url, region_code)
    }

    /// One outbound request, bounded by the configured timeout. No internal
    /// retry: a failed region is picked up again by the next refresh cycle.
    pub async fn fetch(&self, region_code: &str) -> Result<String, FetchError> {
        let url = self.listing_url(region_code);
        debug!(region = region_code, %url, "fetching listing page");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| classify_error(url.clone(), err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        response.text().await.map_err(|err| classify_error(url, err))
    }
}

fn classify_error(url: String, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { url }
    } else {
        FetchError::Network { url, source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> FetchConfig {
        FetchConfig {
            base_url,
            timeout: Duration::from_millis(500),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    #[test]
    fn listing_url_appends_region_with_trailing_slash() {
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        assert_eq!(
            fetcher.listing_url("sp"),
            "https://concursosnobrasil.com/concursos/sp/"
        );
    }

    #[tokio::test]
    async fn fetch_returns_body_and_sends_client_identifier() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/concursos/sp/"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
            .mount(&server)
            .await;

        let fetcher =
            Fetcher::new(test_config(format!("{}/concursos", server.uri()))).unwrap();
        let body = fetcher.fetch("sp").await.unwrap();
        assert_eq!(body, "<table></table>");
    }

    #[tokio::test]
    async fn non_success_status_maps_to_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/concursos/rj/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher =
            Fetcher::new(test_config(format!("{}/concursos", server.uri()))).unwrap();
        match fetcher.fetch("rj").await {
            Err(FetchError::HttpStatus { status, url }) => {
                assert_eq!(status, 503);
                assert!(url.ends_with("/concursos/rj/"));
            }
            other => panic!("expected HttpStatus error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_upstream_maps_to_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/concursos/am/"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let fetcher =
            Fetcher::new(test_config(format!("{}/concursos", server.uri()))).unwrap();
        match fetcher.fetch("am").await {
            Err(FetchError::Timeout { url }) => assert!(url.ends_with("/concursos/am/")),
            other => panic!("expected Timeout error, got {other:?}"),
        }
    }
}
