use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::ResolvedConfig;
use crate::domain::AccessionId;
use crate::error::CrawlError;
use crate::genbank::{GbSeq, parse_gbset};

/// Source of the full list of accessions to crawl.
pub trait ListingSource {
    fn fetch_listing(&self) -> Result<Vec<String>, CrawlError>;
}

/// Source of GenBank documents. One accession may resolve to several
/// documents.
pub trait RecordSource {
    fn fetch(&self, id: &AccessionId) -> Result<Vec<GbSeq>, CrawlError>;
}

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
    listing_url: String,
    efetch_url: String,
    identity: Vec<(&'static str, String)>,
    max_retries: usize,
}

impl NcbiHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, CrawlError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("covid-crawl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CrawlError::FetchHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| CrawlError::FetchHttp(err.to_string()))?;

        let mut identity = vec![("tool", config.tool.clone())];
        if let Some(email) = &config.email {
            identity.push(("email", email.clone()));
        }
        if let Some(api_key) = &config.api_key {
            identity.push(("api_key", api_key.clone()));
        }

        Ok(Self {
            client,
            listing_url: config.listing_url.clone(),
            efetch_url: config.efetch_url.clone(),
            identity,
            max_retries: config.max_transport_retries,
        })
    }

    /// Retries transport failures and gateway errors only. 429 is returned
    /// to the caller untouched.
    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, reqwest::Error>
    where
        F: FnMut() -> RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    if attempt < self.max_retries && is_retryable_status(resp.status()) {
                        tracing::debug!(status = %resp.status(), attempt, "retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        tracing::debug!(error = %err, attempt, "retrying request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl ListingSource for NcbiHttpClient {
    fn fetch_listing(&self) -> Result<Vec<String>, CrawlError> {
        let response = self
            .send_with_retries(|| self.client.get(&self.listing_url))
            .map_err(|err| CrawlError::ListingHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "listing request failed".to_string());
            return Err(CrawlError::ListingStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| CrawlError::ListingHttp(err.to_string()))?;
        Ok(parse_listing(&body))
    }
}

impl RecordSource for NcbiHttpClient {
    fn fetch(&self, id: &AccessionId) -> Result<Vec<GbSeq>, CrawlError> {
        let response = self
            .send_with_retries(|| {
                self.client
                    .get(&self.efetch_url)
                    .query(&[("db", "nuccore"), ("retmode", "xml"), ("id", id.as_str())])
                    .query(&self.identity)
            })
            .map_err(|err| CrawlError::FetchHttp(err.to_string()))?;
        let body = check_status(response, id)?
            .text()
            .map_err(|err| CrawlError::FetchHttp(err.to_string()))?;
        parse_gbset(&body, id.as_str())
    }
}

fn check_status(response: Response, id: &AccessionId) -> Result<Response, CrawlError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .unwrap_or_else(|_| "efetch request failed".to_string());
    Err(status_error(status, id, message))
}

fn status_error(status: StatusCode, id: &AccessionId, message: String) -> CrawlError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => CrawlError::RateLimited(id.to_string()),
        // efetch answers unknown ids with 400 rather than 404
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => CrawlError::NotFound(id.to_string()),
        status => CrawlError::FetchStatus {
            status: status.as_u16(),
            message,
        },
    }
}

/// Splits the newline-delimited listing body. The first line is the column
/// label and blank entries are dropped.
pub fn parse_listing(body: &str) -> Vec<String> {
    body.lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
