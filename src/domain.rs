use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CrawlError;

static ACCESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{1,6}_?[0-9]{1,12}(\.[0-9]+)?$").expect("accession pattern compiles")
});

/// Nucleotide accession, e.g. `MN908947` or `NC_045512.2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccessionId(String);

impl AccessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccessionId {
    type Err = CrawlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        if !ACCESSION_RE.is_match(&normalized) {
            return Err(CrawlError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

pub fn genbank_url(seq_id: &str) -> String {
    format!("https://www.ncbi.nlm.nih.gov/nuccore/{seq_id}?report=genbank")
}

/// One row of the genome store. Field order is the on-disk column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeRecord {
    pub seq_id: String,
    pub genbank_url: String,
    pub created_date: String,
    pub comment: String,
    pub submission: String,
    pub genomic_seq: String,
}

/// One row of the CDS store. Field order is the on-disk column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingRegionRecord {
    pub location: String,
    pub protein_name: String,
    pub protein_seq: String,
    pub seq_id: String,
    pub genbank_url: String,
    pub create_date: String,
    pub comment: String,
    pub institute: String,
}
