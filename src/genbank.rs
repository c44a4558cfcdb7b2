//! NCBI GenBank XML (`GBSet/GBSeq`) document model as returned by
//! `efetch.fcgi?db=nuccore&retmode=xml`.
//!
//! Only the elements the crawler reads are modelled; everything else in the
//! response is ignored during deserialization.

use serde::Deserialize;

use crate::error::CrawlError;

#[derive(Debug, Deserialize)]
#[serde(rename = "GBSet")]
struct GbSet {
    #[serde(rename = "GBSeq", default)]
    sequences: Vec<GbSeq>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GbSeq {
    #[serde(rename = "GBSeq_locus")]
    pub locus: Option<String>,
    #[serde(rename = "GBSeq_create-date")]
    pub create_date: Option<String>,
    #[serde(rename = "GBSeq_comment")]
    pub comment: Option<String>,
    #[serde(rename = "GBSeq_references")]
    pub references: Option<GbReferences>,
    #[serde(rename = "GBSeq_feature-table")]
    pub feature_table: Option<GbFeatureTable>,
    #[serde(rename = "GBSeq_sequence")]
    pub sequence: Option<String>,
}

impl GbSeq {
    /// Journal line of the first reference; NCBI puts the submitting
    /// institute there for direct submissions.
    pub fn first_journal(&self) -> Option<&str> {
        self.references
            .as_ref()
            .and_then(|refs| refs.references.first())
            .and_then(|reference| reference.journal.as_deref())
    }

    pub fn features(&self) -> &[GbFeature] {
        self.feature_table
            .as_ref()
            .map(|table| table.features.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GbReferences {
    #[serde(rename = "GBReference", default)]
    pub references: Vec<GbReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GbReference {
    #[serde(rename = "GBReference_journal")]
    pub journal: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GbFeatureTable {
    #[serde(rename = "GBFeature", default)]
    pub features: Vec<GbFeature>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GbFeature {
    #[serde(rename = "GBFeature_key")]
    pub key: Option<String>,
    #[serde(rename = "GBFeature_location")]
    pub location: Option<String>,
    #[serde(rename = "GBFeature_quals")]
    pub qualifiers: Option<GbQualifiers>,
}

impl GbFeature {
    /// Value of the first qualifier called `name`.
    pub fn qualifier(&self, name: &str) -> Option<&str> {
        self.qualifiers
            .as_ref()?
            .qualifiers
            .iter()
            .find(|qual| qual.name.as_deref() == Some(name))
            .and_then(|qual| qual.value.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GbQualifiers {
    #[serde(rename = "GBQualifier", default)]
    pub qualifiers: Vec<GbQualifier>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GbQualifier {
    #[serde(rename = "GBQualifier_name")]
    pub name: Option<String>,
    #[serde(rename = "GBQualifier_value")]
    pub value: Option<String>,
}

/// Decodes an efetch response body. `accession` is only used for error
/// messages.
pub fn parse_gbset(xml: &str, accession: &str) -> Result<Vec<GbSeq>, CrawlError> {
    if !xml.contains("<GBSet") {
        return Err(CrawlError::Malformed(format!(
            "response for {accession} has no GBSet root element"
        )));
    }
    let parsed: GbSet = quick_xml::de::from_str(xml)
        .map_err(|err| CrawlError::Malformed(format!("{accession}: {err}")))?;
    if parsed.sequences.is_empty() {
        return Err(CrawlError::NotFound(accession.to_string()));
    }
    Ok(parsed.sequences)
}
