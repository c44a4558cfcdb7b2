use std::time::Instant;

use serde::Serialize;

use crate::domain::AccessionId;
use crate::error::CrawlError;
use crate::ncbi::{ListingSource, RecordSource};
use crate::parser::{parse_coding_regions, parse_genome};
use crate::planner::{ProcessedSet, load_processed_ids, plan};
use crate::store::{RecordBatch, RecordStore};

/// Per-accession lifecycle. `Persisted` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum CrawlState {
    Pending,
    Fetching,
    Parsing,
    Persisted,
    Failed { stage: Stage, reason: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Parse,
    Persist,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub accession: AccessionId,
    pub state: CrawlState,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedAccession {
    pub accession: String,
    pub stage: Stage,
    pub reason: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFeature {
    pub accession: String,
    pub feature_index: usize,
    pub location: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedAccession>,
    pub genome_rows: usize,
    pub cds_rows: usize,
    pub skipped_features: Vec<SkippedFeature>,
    pub store_degraded: bool,
    pub reconciled_rows: usize,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub listed: usize,
    pub processed: usize,
    pub store_degraded: bool,
    pub remaining: Vec<AccessionId>,
}

struct Persisted {
    genome_rows: usize,
    cds_rows: usize,
    skipped: Vec<SkippedFeature>,
}

struct Failure {
    stage: Stage,
    error: CrawlError,
}

impl Failure {
    fn at(stage: Stage) -> impl FnOnce(CrawlError) -> Self {
        move |error| Self { stage, error }
    }
}

pub struct Crawler<L: ListingSource, R: RecordSource, S: RecordStore> {
    listing: L,
    source: R,
    store: S,
}

impl<L: ListingSource, R: RecordSource, S: RecordStore> Crawler<L, R, S> {
    pub fn new(listing: L, source: R, store: S) -> Self {
        Self {
            listing,
            source,
            store,
        }
    }

    pub fn source(&self) -> &R {
        &self.source
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetches the accession listing and crawls everything not yet stored.
    /// Only a listing failure is returned as an error.
    pub fn run(&self, sink: &dyn ProgressSink) -> Result<CrawlSummary, CrawlError> {
        let targets = self.fetch_listing()?;
        Ok(self.run_targets(targets, sink))
    }

    /// Computes the remaining queue without fetching any record.
    pub fn plan(&self) -> Result<PlanResult, CrawlError> {
        let targets = self.fetch_listing()?;
        let processed = load_processed_ids(&self.store);
        let remaining = plan(&targets, &processed.ids);
        Ok(PlanResult {
            listed: targets.len(),
            processed: processed.ids.len(),
            store_degraded: processed.degraded,
            remaining,
        })
    }

    pub fn run_targets<I, T>(&self, targets: I, sink: &dyn ProgressSink) -> CrawlSummary
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let started_at = chrono::Utc::now().to_rfc3339();
        let processed = load_processed_ids(&self.store);
        let reconciled_rows = self.reconcile(&processed);
        let queue = plan(targets, &processed.ids);
        tracing::info!(remaining = queue.len(), "planned crawl");

        let mut summary = self.crawl(&queue, sink);
        summary.store_degraded = processed.degraded;
        summary.reconciled_rows = reconciled_rows;
        summary.started_at = started_at;
        summary
    }

    /// Processes `queue` in order. A failing accession is recorded and
    /// skipped; it never stops the loop.
    pub fn crawl(&self, queue: &[AccessionId], sink: &dyn ProgressSink) -> CrawlSummary {
        let start = Instant::now();
        let mut summary = CrawlSummary {
            started_at: chrono::Utc::now().to_rfc3339(),
            ..CrawlSummary::default()
        };

        for id in queue {
            summary.attempted += 1;
            emit(sink, id, CrawlState::Pending);
            match self.process(id, sink) {
                Ok(persisted) => {
                    summary.succeeded += 1;
                    summary.genome_rows += persisted.genome_rows;
                    summary.cds_rows += persisted.cds_rows;
                    summary.skipped_features.extend(persisted.skipped);
                    emit(sink, id, CrawlState::Persisted);
                }
                Err(Failure { stage, error }) => {
                    let reason = error.reason_code();
                    tracing::warn!(accession = %id, ?stage, reason, error = %error, "accession failed");
                    summary.failed.push(FailedAccession {
                        accession: id.to_string(),
                        stage,
                        reason,
                        message: error.to_string(),
                    });
                    emit(sink, id, CrawlState::Failed { stage, reason });
                }
            }
        }

        summary.finished_at = chrono::Utc::now().to_rfc3339();
        tracing::info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "crawl finished"
        );
        summary
    }

    fn process(&self, id: &AccessionId, sink: &dyn ProgressSink) -> Result<Persisted, Failure> {
        emit(sink, id, CrawlState::Fetching);
        tracing::info!(accession = %id, "fetching record");
        let documents = self.source.fetch(id).map_err(Failure::at(Stage::Fetch))?;
        if documents.is_empty() {
            return Err(Failure::at(Stage::Fetch)(CrawlError::NotFound(id.to_string())));
        }

        emit(sink, id, CrawlState::Parsing);
        let mut batch = RecordBatch::default();
        let mut skipped = Vec::new();
        for doc in &documents {
            batch
                .genomes
                .push(parse_genome(doc).map_err(Failure::at(Stage::Parse))?);
            let regions = parse_coding_regions(doc).map_err(Failure::at(Stage::Parse))?;
            batch.coding_regions.extend(regions.records);
            for feature in regions.skipped {
                tracing::warn!(accession = %id, error = %feature, "skipping CDS feature");
                skipped.push(SkippedFeature {
                    accession: id.to_string(),
                    feature_index: feature.index(),
                    location: feature.location().map(str::to_string),
                    reason: feature.to_string(),
                });
            }
        }

        if !batch.genomes.iter().any(|genome| genome.seq_id == id.as_str()) {
            tracing::warn!(
                accession = %id,
                loci = ?batch.genomes.iter().map(|genome| genome.seq_id.as_str()).collect::<Vec<_>>(),
                "no fetched locus matches the accession; it will be fetched again next run"
            );
        }

        self.store
            .append(&batch)
            .map_err(Failure::at(Stage::Persist))?;
        Ok(Persisted {
            genome_rows: batch.genomes.len(),
            cds_rows: batch.coding_regions.len(),
            skipped,
        })
    }

    fn fetch_listing(&self) -> Result<Vec<String>, CrawlError> {
        let targets = self.listing.fetch_listing()?;
        tracing::info!(listed = targets.len(), "fetched accession listing");
        Ok(targets)
    }

    fn reconcile(&self, processed: &ProcessedSet) -> usize {
        if processed.degraded {
            return 0;
        }
        match self.store.reconcile(&processed.ids) {
            Ok(0) => 0,
            Ok(removed) => {
                tracing::warn!(removed, "removed CDS rows left by an interrupted append");
                removed
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not reconcile CDS store");
                0
            }
        }
    }
}

fn emit(sink: &dyn ProgressSink, id: &AccessionId, state: CrawlState) {
    tracing::debug!(accession = %id, ?state, "state transition");
    sink.event(ProgressEvent {
        accession: id.clone(),
        state,
    });
}
