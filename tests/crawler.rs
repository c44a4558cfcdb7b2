use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use covid_genome_crawler::crawler::{CrawlState, Crawler, ProgressEvent, ProgressSink, Stage};
use covid_genome_crawler::domain::AccessionId;
use covid_genome_crawler::error::CrawlError;
use covid_genome_crawler::genbank::{GbFeature, GbFeatureTable, GbQualifier, GbQualifiers, GbSeq};
use covid_genome_crawler::ncbi::{ListingSource, RecordSource};
use covid_genome_crawler::parser::parse_genome;
use covid_genome_crawler::planner::plan;
use covid_genome_crawler::store::{CsvStore, ProcessedIdSource, RecordBatch, RecordStore};

struct MockListing(Option<Vec<&'static str>>);

impl ListingSource for MockListing {
    fn fetch_listing(&self) -> Result<Vec<String>, CrawlError> {
        match &self.0 {
            Some(ids) => Ok(ids.iter().map(|id| id.to_string()).collect()),
            None => Err(CrawlError::ListingHttp("connection refused".to_string())),
        }
    }
}

#[derive(Default)]
struct MockSource {
    records: HashMap<String, Vec<GbSeq>>,
    missing: HashSet<String>,
    throttled: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockSource {
    fn with(mut self, locus: &str, cds_genes: &[&str]) -> Self {
        self.records
            .insert(locus.to_string(), vec![document(locus, cds_genes)]);
        self
    }

    fn missing(mut self, locus: &str) -> Self {
        self.missing.insert(locus.to_string());
        self
    }

    fn throttled(mut self, locus: &str) -> Self {
        self.throttled.insert(locus.to_string());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RecordSource for MockSource {
    fn fetch(&self, id: &AccessionId) -> Result<Vec<GbSeq>, CrawlError> {
        self.calls.lock().unwrap().push(id.to_string());
        if self.missing.contains(id.as_str()) {
            return Err(CrawlError::NotFound(id.to_string()));
        }
        if self.throttled.contains(id.as_str()) {
            return Err(CrawlError::RateLimited(id.to_string()));
        }
        Ok(self.records.get(id.as_str()).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct MemoryStore {
    batches: Mutex<Vec<RecordBatch>>,
    fail_for: Option<&'static str>,
}

impl ProcessedIdSource for MemoryStore {
    fn processed_ids(&self) -> Result<HashSet<String>, CrawlError> {
        Ok(self
            .batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|batch| batch.genomes.iter().map(|genome| genome.seq_id.clone()))
            .collect())
    }
}

impl RecordStore for MemoryStore {
    fn append(&self, batch: &RecordBatch) -> Result<(), CrawlError> {
        if batch
            .genomes
            .iter()
            .any(|genome| Some(genome.seq_id.as_str()) == self.fail_for)
        {
            return Err(CrawlError::StoreWrite {
                path: "memory".to_string(),
                message: "disk full".to_string(),
            });
        }
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<(String, CrawlState)>>);

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.0
            .lock()
            .unwrap()
            .push((event.accession.to_string(), event.state));
    }
}

impl RecordingSink {
    fn states_for(&self, accession: &str) -> Vec<CrawlState> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == accession)
            .map(|(_, state)| *state)
            .collect()
    }
}

fn document(locus: &str, cds_genes: &[&str]) -> GbSeq {
    let features = cds_genes
        .iter()
        .enumerate()
        .map(|(idx, gene)| GbFeature {
            key: Some("CDS".to_string()),
            location: Some(format!("{}..{}", idx * 100 + 1, idx * 100 + 90)),
            qualifiers: Some(GbQualifiers {
                qualifiers: vec![
                    GbQualifier {
                        name: Some("gene".to_string()),
                        value: Some(gene.to_string()),
                    },
                    GbQualifier {
                        name: Some("translation".to_string()),
                        value: Some("MFVFLVLLPLV".to_string()),
                    },
                ],
            }),
        })
        .collect();
    GbSeq {
        locus: Some(locus.to_string()),
        create_date: Some("01-MAR-2020".to_string()),
        sequence: Some("attaaaggtttatacc".to_string()),
        feature_table: Some(GbFeatureTable { features }),
        ..GbSeq::default()
    }
}

fn csv_store(dir: &tempfile::TempDir) -> CsvStore {
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    CsvStore::new(root.join("covid_genome.csv"), root.join("covid_cds.csv"))
}

fn line_count(path: &camino::Utf8Path) -> usize {
    std::fs::read_to_string(path)
        .map(|text| text.lines().count())
        .unwrap_or(0)
}

#[test]
fn not_found_in_the_middle_does_not_stop_the_run() {
    let source = MockSource::default()
        .with("MN908947", &["S"])
        .missing("MT012345")
        .with("MT020880", &["S", "N"]);
    let crawler = Crawler::new(MockListing(None), source, MemoryStore::default());
    let sink = RecordingSink::default();

    let summary = crawler.run_targets(["MN908947", "MT012345", "MT020880"], &sink);

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].accession, "MT012345");
    assert_eq!(summary.failed[0].reason, "not_found");
    assert_eq!(summary.failed[0].stage, Stage::Fetch);
    assert_eq!(summary.genome_rows, 2);
    assert_eq!(summary.cds_rows, 3);

    let stored = crawler.store().processed_ids().unwrap();
    assert!(stored.contains("MN908947"));
    assert!(stored.contains("MT020880"));
    assert!(!stored.contains("MT012345"));
}

#[test]
fn state_transitions_are_reported() {
    let source = MockSource::default()
        .with("MN908947", &["S"])
        .throttled("MT012345");
    let crawler = Crawler::new(MockListing(None), source, MemoryStore::default());
    let sink = RecordingSink::default();

    crawler.run_targets(["MN908947", "MT012345"], &sink);

    assert_eq!(
        sink.states_for("MN908947"),
        vec![
            CrawlState::Pending,
            CrawlState::Fetching,
            CrawlState::Parsing,
            CrawlState::Persisted,
        ]
    );
    assert_eq!(
        sink.states_for("MT012345"),
        vec![
            CrawlState::Pending,
            CrawlState::Fetching,
            CrawlState::Failed {
                stage: Stage::Fetch,
                reason: "rate_limited",
            },
        ]
    );
}

#[test]
fn store_failure_leaves_accession_eligible_for_retry() {
    let source = MockSource::default()
        .with("MN908947", &["S"])
        .with("MT012345", &["S"]);
    let store = MemoryStore {
        fail_for: Some("MT012345"),
        ..MemoryStore::default()
    };
    let crawler = Crawler::new(MockListing(None), source, store);

    let summary = crawler.run_targets(["MN908947", "MT012345"], &RecordingSink::default());
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed[0].stage, Stage::Persist);
    assert_eq!(summary.failed[0].reason, "store_write");

    let processed = crawler.store().processed_ids().unwrap();
    let remaining = plan(["MN908947", "MT012345"], &processed);
    assert_eq!(remaining, vec!["MT012345".parse::<AccessionId>().unwrap()]);
}

#[test]
fn unparseable_document_fails_only_its_accession() {
    let mut source = MockSource::default().with("MN908947", &["S"]);
    source.records.insert(
        "MT012345".to_string(),
        vec![GbSeq {
            locus: Some("MT012345".to_string()),
            ..GbSeq::default()
        }],
    );
    let crawler = Crawler::new(MockListing(None), source, MemoryStore::default());

    let summary = crawler.run_targets(["MN908947", "MT012345"], &RecordingSink::default());
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed[0].stage, Stage::Parse);
    assert_eq!(summary.failed[0].reason, "parse");
    assert_eq!(crawler.store().batches.lock().unwrap().len(), 1);
}

#[test]
fn empty_response_counts_as_not_found() {
    let crawler = Crawler::new(
        MockListing(None),
        MockSource::default(),
        MemoryStore::default(),
    );
    let summary = crawler.run_targets(["MN908947"], &RecordingSink::default());
    assert_eq!(summary.failed[0].reason, "not_found");
    assert!(crawler.store().batches.lock().unwrap().is_empty());
}

#[test]
fn skipped_features_are_reported_in_summary() {
    let mut doc = document("MN908947", &["S"]);
    if let Some(table) = doc.feature_table.as_mut() {
        table.features.push(GbFeature {
            key: Some("CDS".to_string()),
            location: Some("29558..29674".to_string()),
            qualifiers: Some(GbQualifiers {
                qualifiers: vec![GbQualifier {
                    name: Some("gene".to_string()),
                    value: Some("ORF10".to_string()),
                }],
            }),
        });
    }
    let mut source = MockSource::default();
    source.records.insert("MN908947".to_string(), vec![doc]);
    let crawler = Crawler::new(MockListing(None), source, MemoryStore::default());

    let summary = crawler.run_targets(["MN908947"], &RecordingSink::default());
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.cds_rows, 1);
    assert_eq!(summary.skipped_features.len(), 1);
    assert_eq!(summary.skipped_features[0].feature_index, 1);
    assert_eq!(
        summary.skipped_features[0].location.as_deref(),
        Some("29558..29674")
    );
}

#[test]
fn listing_failure_aborts_before_any_fetch() {
    let crawler = Crawler::new(
        MockListing(None),
        MockSource::default().with("MN908947", &["S"]),
        MemoryStore::default(),
    );
    let err = crawler.run(&RecordingSink::default()).unwrap_err();
    assert_matches!(err, CrawlError::ListingHttp(_));
    assert!(err.is_fatal());
}

#[test]
fn end_to_end_writes_one_genome_row_per_accession() {
    let dir = tempfile::tempdir().unwrap();
    let store = csv_store(&dir);
    let source = MockSource::default()
        .with("MN908947", &["ORF1ab", "S", "N"])
        .with("MT012345", &["S", "E"]);
    let crawler = Crawler::new(
        MockListing(Some(vec!["MN908947", "MT012345"])),
        source,
        store.clone(),
    );

    let summary = crawler.run(&RecordingSink::default()).unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(line_count(store.genome_path()), 2);
    assert_eq!(line_count(store.cds_path()), 5);
    let ids = store.processed_ids().unwrap();
    assert_eq!(ids.len(), 2);
}

#[test]
fn second_run_adds_no_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = csv_store(&dir);
    let crawler = Crawler::new(
        MockListing(Some(vec!["MN908947", "MT012345"])),
        MockSource::default()
            .with("MN908947", &["S"])
            .with("MT012345", &["S", "N"]),
        store.clone(),
    );

    crawler.run(&RecordingSink::default()).unwrap();
    let second = crawler.run(&RecordingSink::default()).unwrap();

    assert_eq!(second.attempted, 0);
    assert_eq!(line_count(store.genome_path()), 2);
    assert_eq!(line_count(store.cds_path()), 3);
}

#[test]
fn resume_fetches_only_missing_accession() {
    let dir = tempfile::tempdir().unwrap();
    let store = csv_store(&dir);
    store
        .append(&RecordBatch {
            genomes: vec![parse_genome(&document("MN908947", &[])).unwrap()],
            coding_regions: Vec::new(),
        })
        .unwrap();

    let crawler = Crawler::new(
        MockListing(Some(vec!["MN908947", "MT012345"])),
        MockSource::default()
            .with("MN908947", &["S"])
            .with("MT012345", &["S"]),
        store.clone(),
    );
    let plan = crawler.plan().unwrap();
    assert_eq!(plan.remaining, vec!["MT012345".parse::<AccessionId>().unwrap()]);

    crawler.run(&RecordingSink::default()).unwrap();
    assert_eq!(crawler.source().calls(), vec!["MT012345".to_string()]);
    assert_eq!(line_count(store.genome_path()), 2);
}

