use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::app::{FairwayError, Result};
use crate::domain::FailureCategory;

/// Raw page returned by a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

#[async_trait]
pub trait Fetcher {
    /// Fetch `url`. Failures carry a [`FailureCategory`] where one is known.
    async fn fetch(&self, url: &str) -> Result<Page>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Page> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(transport_error)?;

        Ok(Page {
            url: final_url,
            body,
        })
    }
}

/// Map an HTTP error status to a structured failure.
pub fn status_error(status: StatusCode) -> FairwayError {
    let category = match status {
        StatusCode::NOT_FOUND => FailureCategory::NotFound,
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => FailureCategory::Forbidden,
        StatusCode::GONE => FailureCategory::Gone,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FailureCategory::Timeout,
        _ => FailureCategory::Network,
    };
    FairwayError::fetch(category, format!("HTTP {}", status))
}

fn transport_error(e: reqwest::Error) -> FairwayError {
    if e.is_timeout() {
        FairwayError::fetch(FailureCategory::Timeout, format!("timeout: {}", e))
    } else if e.is_connect() || e.is_request() || e.is_body() {
        FairwayError::fetch(FailureCategory::Network, format!("network error: {}", e))
    } else {
        FairwayError::Http(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (StatusCode::NOT_FOUND, FailureCategory::NotFound),
            (StatusCode::FORBIDDEN, FailureCategory::Forbidden),
            (StatusCode::GONE, FailureCategory::Gone),
            (StatusCode::GATEWAY_TIMEOUT, FailureCategory::Timeout),
            (StatusCode::INTERNAL_SERVER_ERROR, FailureCategory::Network),
        ];
        for (status, category) in cases {
            assert_eq!(status_error(status).category(), Some(category));
        }
        assert_eq!(status_error(StatusCode::NOT_FOUND).to_string(), "HTTP 404 Not Found");
        assert!(!status_error(StatusCode::GONE).is_retryable());
        assert!(status_error(StatusCode::BAD_GATEWAY).is_retryable());
    }
}
