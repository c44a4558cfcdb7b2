use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CrawlError {
    #[error("invalid accession identifier: {0:?}")]
    InvalidAccession(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("identifier listing request failed: {0}")]
    #[diagnostic(help("the accession listing is required before any record can be crawled"))]
    ListingHttp(String),

    #[error("identifier listing returned status {status}: {message}")]
    ListingStatus { status: u16, message: String },

    #[error("failed to read store {path}: {message}")]
    StoreRead { path: String, message: String },

    #[error("failed to append to store {path}: {message}")]
    StoreWrite { path: String, message: String },

    #[error("efetch request failed: {0}")]
    FetchHttp(String),

    #[error("efetch returned status {status}: {message}")]
    FetchStatus { status: u16, message: String },

    #[error("no record found for {0}")]
    NotFound(String),

    #[error("rate limited while fetching {0}")]
    RateLimited(String),

    #[error("malformed GenBank XML: {0}")]
    Malformed(String),

    #[error("record {record} is missing required field {field}")]
    MissingField { record: String, field: &'static str },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CrawlError {
    /// Stable short code used in run summaries and logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            CrawlError::ListingHttp(_) | CrawlError::ListingStatus { .. } => "listing_fetch",
            CrawlError::StoreRead { .. } => "store_read",
            CrawlError::StoreWrite { .. } | CrawlError::Filesystem(_) => "store_write",
            CrawlError::FetchHttp(_) | CrawlError::FetchStatus { .. } => "fetch",
            CrawlError::NotFound(_) => "not_found",
            CrawlError::RateLimited(_) => "rate_limited",
            CrawlError::Malformed(_)
            | CrawlError::MissingField { .. }
            | CrawlError::InvalidAccession(_) => "parse",
            CrawlError::ConfigRead(_) | CrawlError::ConfigParse(_) => "config",
        }
    }

    /// Fatal errors abort the run; everything else is isolated per identifier.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CrawlError::ListingHttp(_)
                | CrawlError::ListingStatus { .. }
                | CrawlError::ConfigRead(_)
                | CrawlError::ConfigParse(_)
        )
    }
}

/// A single CDS feature that could not be turned into a row. The rest of the
/// record's features are still extracted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("CDS feature #{index} at {location} has no {qualifier:?} qualifier")]
    MissingQualifier {
        index: usize,
        location: String,
        qualifier: &'static str,
    },

    #[error("CDS feature #{index} has no location")]
    MissingLocation { index: usize },
}

impl FeatureError {
    pub fn index(&self) -> usize {
        match self {
            FeatureError::MissingQualifier { index, .. } | FeatureError::MissingLocation { index } => {
                *index
            }
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            FeatureError::MissingQualifier { location, .. } => Some(location),
            FeatureError::MissingLocation { .. } => None,
        }
    }
}
