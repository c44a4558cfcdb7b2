use std::collections::{BTreeSet, HashSet};

use crate::domain::AccessionId;
use crate::store::ProcessedIdSource;

/// Remaining work: valid targets not yet processed, deduplicated and sorted.
///
/// Accessions are compared verbatim against stored loci, so a versioned
/// entry such as `MN908947.3` is not matched by a stored `MN908947` and is
/// fetched again.
pub fn plan<I, S>(targets: I, processed: &HashSet<String>) -> Vec<AccessionId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut remaining = BTreeSet::new();
    for raw in targets {
        let raw = raw.as_ref();
        if raw.trim().is_empty() {
            continue;
        }
        match raw.parse::<AccessionId>() {
            Ok(id) if processed.contains(id.as_str()) => {}
            Ok(id) => {
                remaining.insert(id);
            }
            Err(err) => tracing::debug!(error = %err, "dropping identifier"),
        }
    }
    remaining.into_iter().collect()
}

#[derive(Debug, Clone, Default)]
pub struct ProcessedSet {
    pub ids: HashSet<String>,
    /// Set when the store could not be read and `ids` is empty as a fallback.
    pub degraded: bool,
}

/// Reads the processed set, degrading to an empty set (full rebuild) when
/// the store cannot be read.
pub fn load_processed_ids(source: &dyn ProcessedIdSource) -> ProcessedSet {
    match source.processed_ids() {
        Ok(ids) => {
            if ids.is_empty() {
                tracing::info!("genome store is empty or missing, crawling every listed accession");
            } else {
                tracing::info!(processed = ids.len(), "loaded processed accessions");
            }
            ProcessedSet {
                ids,
                degraded: false,
            }
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                reason = err.reason_code(),
                "genome store unreadable, treating every accession as unprocessed"
            );
            ProcessedSet {
                ids: HashSet::new(),
                degraded: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_collapse() {
        let planned = plan(["MT012345", "mt012345", "MT012345 "], &HashSet::new());
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].as_str(), "MT012345");
    }

    #[test]
    fn versioned_accession_is_compared_verbatim() {
        let processed: HashSet<String> = ["MN908947".to_string()].into_iter().collect();
        let planned = plan(["MN908947.3", "MN908947"], &processed);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].as_str(), "MN908947.3");
    }
}
