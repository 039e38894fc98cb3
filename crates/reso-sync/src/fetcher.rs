use std::time::Duration;

use async_trait::async_trait;
use reso_sync_common::{
    backoff::Backoff,
    error::CAP_EXCEEDED_MARKER,
    FetchError,
};
use serde::Deserialize;
use url::Url;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// One page GET request against the OData endpoint.
pub struct PageRequest<'a> {
    pub endpoint: &'a Url,
    pub credential: &'a str,
    pub top: u32,
    pub skip: u32,
    pub filter: &'a str,
    pub orderby: Option<&'a str>,
}

/// A single page of results, as returned by the upstream.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Page {
    #[serde(default)]
    pub value: Vec<serde_json::Value>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.count", default)]
    pub total_count: Option<u64>,
}

/// Component A: a single-page GET with auth, retry/backoff, and error
/// classification (spec.md §4.A).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, FetchError>;
}

/// Real implementation backed by `reqwest`. The `$filter` value is sent
/// unencoded: the upstream requires raw ISO-8601 timestamps in predicates,
/// so this builds the query string by hand rather than through
/// `RequestBuilder::query`, which would percent-encode it.
pub struct ODataPageFetcher {
    client: reqwest::Client,
}

impl ODataPageFetcher {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    fn build_url(request: &PageRequest<'_>) -> String {
        let mut url = format!(
            "{}?$filter={}&$top={}&$skip={}",
            request.endpoint.as_str().trim_end_matches('/'),
            request.filter,
            request.top,
            request.skip,
        );
        if let Some(orderby) = request.orderby {
            url.push_str(&format!("&$orderby={orderby}"));
        }
        url
    }
}

#[async_trait]
impl PageFetcher for ODataPageFetcher {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<Page, FetchError> {
        let url = Self::build_url(&request);
        let mut backoff = Backoff::new(INITIAL_BACKOFF, MAX_BACKOFF);
        let mut rng = rand::rng();

        for attempt in 1..=MAX_ATTEMPTS {
            let send_result = self
                .client
                .get(&url)
                .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", request.credential))
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await;

            let response = match send_result {
                Ok(response) => response,
                Err(e) if attempt < MAX_ATTEMPTS && (e.is_timeout() || e.is_connect() || e.is_request()) => {
                    tracing::warn!(attempt, error = %e, "transient transport error, retrying");
                    tokio::time::sleep(backoff.fail(&mut rng)).await;
                    continue;
                },
                Err(e) => return Err(FetchError::Transient(e.to_string())),
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))?;

            if body.contains(CAP_EXCEEDED_MARKER) {
                return Err(FetchError::CapExceeded);
            }

            if status.is_success() {
                return serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()));
            }

            let retryable = status.is_server_error() || status.as_u16() == 429;
            if retryable && attempt < MAX_ATTEMPTS {
                tracing::warn!(attempt, %status, "retryable HTTP status, retrying");
                tokio::time::sleep(backoff.fail(&mut rng)).await;
                continue;
            }
            if retryable {
                return Err(FetchError::Transient(format!("HTTP {status}: {body}")));
            }
            return Err(FetchError::Permanent {
                status: status.as_u16(),
                body,
            });
        }

        unreachable!("loop always returns within MAX_ATTEMPTS iterations")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_does_not_encode_filter() {
        let endpoint = Url::parse("https://api.reso.example/idx").unwrap();
        let request = PageRequest {
            endpoint: &endpoint,
            credential: "tok",
            top: 5000,
            skip: 0,
            filter: "ModificationTimestamp gt 2025-01-01T00:00:00Z",
            orderby: None,
        };
        let url = ODataPageFetcher::build_url(&request);
        assert_eq!(
            url,
            "https://api.reso.example/idx?$filter=ModificationTimestamp gt 2025-01-01T00:00:00Z&$top=5000&$skip=0"
        );
    }

    #[test]
    fn build_url_includes_orderby_when_present() {
        let endpoint = Url::parse("https://api.reso.example/idx/").unwrap();
        let request = PageRequest {
            endpoint: &endpoint,
            credential: "tok",
            top: 10,
            skip: 20,
            filter: "x gt 1",
            orderby: Some("ModificationTimestamp asc"),
        };
        let url = ODataPageFetcher::build_url(&request);
        assert!(url.ends_with("&$orderby=ModificationTimestamp asc"));
        assert!(!url.contains("example/idx/?"));
    }
}
