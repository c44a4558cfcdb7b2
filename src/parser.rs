//! Flattens one `GBSeq` document into store rows. Pure; no I/O.

use crate::domain::{CodingRegionRecord, GenomeRecord, genbank_url};
use crate::error::{CrawlError, FeatureError};
use crate::genbank::GbSeq;

const CDS_KEY: &str = "CDS";

/// Fields shared by the genome row and every CDS row of a document.
struct RecordHeader {
    seq_id: String,
    genbank_url: String,
    create_date: String,
    comment: String,
    institute: String,
}

impl RecordHeader {
    fn from_document(doc: &GbSeq) -> Result<Self, CrawlError> {
        let seq_id = doc
            .locus
            .as_deref()
            .map(str::trim)
            .filter(|locus| !locus.is_empty())
            .ok_or_else(|| CrawlError::MissingField {
                record: "<unknown>".to_string(),
                field: "GBSeq_locus",
            })?
            .to_string();
        Ok(Self {
            genbank_url: genbank_url(&seq_id),
            create_date: doc.create_date.clone().unwrap_or_default(),
            comment: doc.comment.clone().unwrap_or_default(),
            institute: doc.first_journal().unwrap_or_default().to_string(),
            seq_id,
        })
    }
}

/// Result of scanning a document's feature table: the rows that could be
/// built plus the CDS features that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodingRegions {
    pub records: Vec<CodingRegionRecord>,
    pub skipped: Vec<FeatureError>,
}

pub fn parse_genome(doc: &GbSeq) -> Result<GenomeRecord, CrawlError> {
    let header = RecordHeader::from_document(doc)?;
    let genomic_seq = doc
        .sequence
        .clone()
        .ok_or_else(|| CrawlError::MissingField {
            record: header.seq_id.clone(),
            field: "GBSeq_sequence",
        })?;
    Ok(GenomeRecord {
        seq_id: header.seq_id,
        genbank_url: header.genbank_url,
        created_date: header.create_date,
        comment: header.comment,
        submission: header.institute,
        genomic_seq,
    })
}

/// Extracts one row per CDS feature. A feature missing its location, `gene`
/// or `translation` is reported in `skipped` and does not affect the others.
pub fn parse_coding_regions(doc: &GbSeq) -> Result<CodingRegions, CrawlError> {
    let header = RecordHeader::from_document(doc)?;
    let mut regions = CodingRegions::default();

    let cds = doc
        .features()
        .iter()
        .filter(|feature| feature.key.as_deref() == Some(CDS_KEY));
    for (index, feature) in cds.enumerate() {
        let Some(location) = feature.location.clone() else {
            regions.skipped.push(FeatureError::MissingLocation { index });
            continue;
        };
        let missing = |qualifier| FeatureError::MissingQualifier {
            index,
            location: location.clone(),
            qualifier,
        };
        let Some(gene) = feature.qualifier("gene") else {
            regions.skipped.push(missing("gene"));
            continue;
        };
        let Some(translation) = feature.qualifier("translation") else {
            regions.skipped.push(missing("translation"));
            continue;
        };
        regions.records.push(CodingRegionRecord {
            protein_name: gene.to_string(),
            protein_seq: translation.to_string(),
            location,
            seq_id: header.seq_id.clone(),
            genbank_url: header.genbank_url.clone(),
            create_date: header.create_date.clone(),
            comment: header.comment.clone(),
            institute: header.institute.clone(),
        });
    }

    Ok(regions)
}
