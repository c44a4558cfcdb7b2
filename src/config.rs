use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

pub const DEFAULT_CONFIG_FILE: &str = "covid-crawl.json";
pub const DEFAULT_LISTING_URL: &str =
    "https://www.ncbi.nlm.nih.gov/sars-cov-2/download-nuccore-ids/";
pub const DEFAULT_EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
pub const DEFAULT_GENOME_STORE: &str = "./covid_genome.csv";
pub const DEFAULT_CDS_STORE: &str = "./covid_cds.csv";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listing_url: Option<String>,
    #[serde(default)]
    pub efetch_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_transport_retries: Option<usize>,
    #[serde(default)]
    pub genome_store: Option<Utf8PathBuf>,
    #[serde(default)]
    pub cds_store: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub listing_url: String,
    pub efetch_url: String,
    pub email: Option<String>,
    pub tool: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_transport_retries: usize,
    pub genome_store: Utf8PathBuf,
    pub cds_store: Utf8PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; the default file is optional.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CrawlError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CrawlError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CrawlError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            listing_url: non_blank(config.listing_url)
                .unwrap_or_else(|| DEFAULT_LISTING_URL.to_string()),
            efetch_url: non_blank(config.efetch_url)
                .unwrap_or_else(|| DEFAULT_EFETCH_URL.to_string()),
            email: non_blank(config.email),
            tool: non_blank(config.tool).unwrap_or_else(|| "covid-crawl".to_string()),
            api_key: non_blank(config.api_key),
            timeout_secs: config.timeout_secs.unwrap_or(60),
            max_transport_retries: config.max_transport_retries.unwrap_or(2),
            genome_store: config
                .genome_store
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_GENOME_STORE)),
            cds_store: config
                .cds_store
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_CDS_STORE)),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
