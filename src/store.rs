use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;

use crate::domain::{CodingRegionRecord, GenomeRecord};
use crate::error::CrawlError;

/// Everything produced for one accession. Appended as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    pub genomes: Vec<GenomeRecord>,
    pub coding_regions: Vec<CodingRegionRecord>,
}

/// Read side of the genome store: which records already made it to disk.
pub trait ProcessedIdSource {
    fn processed_ids(&self) -> Result<HashSet<String>, CrawlError>;
}

pub trait RecordStore: ProcessedIdSource {
    fn append(&self, batch: &RecordBatch) -> Result<(), CrawlError>;

    /// Repairs leftovers of an interrupted append. Returns the number of
    /// rows removed.
    fn reconcile(&self, _processed: &HashSet<String>) -> Result<usize, CrawlError> {
        Ok(0)
    }
}

/// Header-less CSV files, one per row type.
#[derive(Debug, Clone)]
pub struct CsvStore {
    genome_path: Utf8PathBuf,
    cds_path: Utf8PathBuf,
}

impl CsvStore {
    pub fn new(genome_path: Utf8PathBuf, cds_path: Utf8PathBuf) -> Self {
        Self {
            genome_path,
            cds_path,
        }
    }

    pub fn genome_path(&self) -> &Utf8Path {
        &self.genome_path
    }

    pub fn cds_path(&self) -> &Utf8Path {
        &self.cds_path
    }
}

impl ProcessedIdSource for CsvStore {
    fn processed_ids(&self) -> Result<HashSet<String>, CrawlError> {
        let path = self.genome_path.as_std_path();
        if !path.exists() {
            return Ok(HashSet::new());
        }
        let read_err = |err: csv::Error| CrawlError::StoreRead {
            path: self.genome_path.to_string(),
            message: err.to_string(),
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(read_err)?;
        let mut ids = HashSet::new();
        for record in reader.deserialize::<GenomeRecord>() {
            ids.insert(record.map_err(read_err)?.seq_id);
        }
        Ok(ids)
    }
}

impl RecordStore for CsvStore {
    fn append(&self, batch: &RecordBatch) -> Result<(), CrawlError> {
        let genome_bytes = serialize_rows(&batch.genomes).map_err(|err| CrawlError::StoreWrite {
            path: self.genome_path.to_string(),
            message: err.to_string(),
        })?;
        let cds_bytes =
            serialize_rows(&batch.coding_regions).map_err(|err| CrawlError::StoreWrite {
                path: self.cds_path.to_string(),
                message: err.to_string(),
            })?;

        // CDS first: the genome store is what marks an accession processed.
        let mut cds = AppendGuard::open(&self.cds_path)?;
        cds.write(&cds_bytes)?;
        let mut genome = AppendGuard::open(&self.genome_path)?;
        genome.write(&genome_bytes)?;

        genome.commit();
        cds.commit();
        Ok(())
    }

    /// Drops CDS rows whose `seq_id` has no genome row. Such rows can only
    /// come from a crash between the two appends of a batch. Returns the
    /// number of rows removed.
    fn reconcile(&self, processed: &HashSet<String>) -> Result<usize, CrawlError> {
        let path = self.cds_path.as_std_path();
        if !path.exists() {
            return Ok(0);
        }
        let read_err = |err: csv::Error| CrawlError::StoreRead {
            path: self.cds_path.to_string(),
            message: err.to_string(),
        };
        let write_err = |message: String| CrawlError::StoreWrite {
            path: self.cds_path.to_string(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(read_err)?;
        let mut kept = Vec::new();
        let mut removed = 0usize;
        for record in reader.deserialize::<CodingRegionRecord>() {
            let record = record.map_err(read_err)?;
            if processed.contains(&record.seq_id) {
                kept.push(record);
            } else {
                removed += 1;
            }
        }
        if removed == 0 {
            return Ok(0);
        }

        let bytes = serialize_rows(&kept).map_err(|err| write_err(err.to_string()))?;
        let parent = self
            .cds_path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        let mut temp = Builder::new()
            .prefix("covid-crawl-cds")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| write_err(err.to_string()))?;
        temp.write_all(&bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|err| write_err(err.to_string()))?;
        temp.persist(path)
            .map_err(|err| write_err(err.to_string()))?;
        Ok(removed)
    }
}

/// Truncates the file back to its original length on drop unless committed.
struct AppendGuard<'a> {
    path: &'a Utf8Path,
    file: File,
    original_len: u64,
    committed: bool,
}

impl<'a> AppendGuard<'a> {
    fn open(path: &'a Utf8Path) -> Result<Self, CrawlError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path()).map_err(|err| store_write(path, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_std_path())
            .map_err(|err| store_write(path, err))?;
        let original_len = file
            .metadata()
            .map_err(|err| store_write(path, err))?
            .len();
        Ok(Self {
            path,
            file,
            original_len,
            committed: false,
        })
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), CrawlError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.file
            .write_all(bytes)
            .and_then(|_| self.file.sync_data())
            .map_err(|err| store_write(self.path, err))
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for AppendGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(err) = self.file.set_len(self.original_len) {
            tracing::error!(path = %self.path, error = %err, "failed to roll back partial append");
        }
    }
}

fn serialize_rows<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| csv::Error::from(io::Error::other(err.to_string())))
}

fn store_write(path: &Utf8Path, err: io::Error) -> CrawlError {
    CrawlError::StoreWrite {
        path: path.to_string(),
        message: err.to_string(),
    }
}
