//! Index of names that were checked before, consulted ahead of any registry.

use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::types::{NiceClassSet, RegionSet};
use crate::validator::CandidateName;
use crate::TARGET_LOCAL_STORE;

/// Header names of the flat record source.
#[derive(Debug, Clone)]
pub struct StoreColumns {
    pub name: String,
    pub region: String,
    pub nice_class: String,
}

impl Default for StoreColumns {
    fn default() -> Self {
        Self {
            name: "name".to_string(),
            region: "region".to_string(),
            nice_class: "nice_class".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownNameRecord {
    pub name: String,
    pub nice_classes: BTreeSet<String>,
    pub region: String,
}

impl KnownNameRecord {
    pub fn new<I, S>(name: &str, nice_classes: I, region: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: fold_name(name),
            nice_classes: nice_classes
                .into_iter()
                .map(|c| c.as_ref().trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            region: region.trim().to_string(),
        }
    }
}

/// Immutable snapshot: records grouped by folded name.
#[derive(Debug, Default)]
struct KnownNameIndex {
    by_name: HashMap<String, Vec<KnownNameRecord>>,
}

impl KnownNameIndex {
    fn from_records(records: impl IntoIterator<Item = KnownNameRecord>) -> Self {
        let mut by_name: HashMap<String, Vec<KnownNameRecord>> = HashMap::new();
        for record in records {
            if record.name.is_empty() {
                continue;
            }
            let entries = by_name.entry(record.name.clone()).or_default();
            // Rows for the same name and region collapse into one record.
            match entries.iter_mut().find(|r| r.region == record.region) {
                Some(existing) => existing.nice_classes.extend(record.nice_classes),
                None => entries.push(record),
            }
        }
        Self { by_name }
    }

    fn len(&self) -> usize {
        self.by_name.len()
    }
}

pub struct LocalKnowledgeStore {
    snapshot: RwLock<Arc<KnownNameIndex>>,
    respect_region: bool,
}

impl LocalKnowledgeStore {
    pub fn empty() -> Self {
        Self::from_records(Vec::new())
    }

    pub fn from_records(records: impl IntoIterator<Item = KnownNameRecord>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(KnownNameIndex::from_records(records))),
            respect_region: false,
        }
    }

    /// Loads the CSV at `path`. Any failure leaves the store empty so checks still
    /// reach the external registries.
    pub fn load(path: &Path, columns: &StoreColumns) -> Self {
        match read_records(path, columns) {
            Ok(records) => {
                let store = Self::from_records(records);
                info!(target: TARGET_LOCAL_STORE, "Loaded {} known names from {}", store.len(), path.display());
                store
            }
            Err(err) => {
                warn!(target: TARGET_LOCAL_STORE, "Failed to load known names from {}, continuing with an empty store: {:#}", path.display(), err);
                Self::empty()
            }
        }
    }

    /// When set, a record only matches if its region is one of the requested regions.
    pub fn with_region_matching(mut self, enabled: bool) -> Self {
        self.respect_region = enabled;
        self
    }

    /// Re-reads the CSV and swaps the snapshot in one step. On failure the current
    /// snapshot stays in place and the error is returned.
    pub fn reload(&self, path: &Path, columns: &StoreColumns) -> Result<usize> {
        let index = KnownNameIndex::from_records(read_records(path, columns)?);
        let count = index.len();
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(index);
        info!(target: TARGET_LOCAL_STORE, "Reloaded {} known names from {}", count, path.display());
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(
        &self,
        candidate: &CandidateName,
        nice_classes: &NiceClassSet,
        regions: &RegionSet,
    ) -> bool {
        let found = !self
            .classes_for(candidate, nice_classes, Some(regions))
            .is_empty();
        debug!(target: TARGET_LOCAL_STORE, "Local lookup for {}: {}", candidate, found);
        found
    }

    /// Requested classes under which the candidate was recorded before.
    pub fn matched_classes(
        &self,
        candidate: &CandidateName,
        nice_classes: &NiceClassSet,
    ) -> BTreeSet<String> {
        self.classes_for(candidate, nice_classes, None)
    }

    fn classes_for(
        &self,
        candidate: &CandidateName,
        nice_classes: &NiceClassSet,
        regions: Option<&RegionSet>,
    ) -> BTreeSet<String> {
        let snapshot = self.current();
        let Some(records) = snapshot.by_name.get(&fold_name(candidate.as_str())) else {
            return BTreeSet::new();
        };

        records
            .iter()
            .filter(|record| match (self.respect_region, regions) {
                (true, Some(regions)) => record.region.is_empty() || regions.contains(&record.region),
                _ => true,
            })
            .flat_map(|record| record.nice_classes.iter())
            .filter(|code| nice_classes.contains(code))
            .cloned()
            .collect()
    }

    fn current(&self) -> Arc<KnownNameIndex> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Splits a class cell such as `"14, 20"` or `"20/21"` into codes.
fn split_classes(cell: &str) -> Vec<String> {
    cell.split(|c: char| c == ',' || c == ';' || c == '/' || c.is_whitespace())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_records(path: &Path, columns: &StoreColumns) -> Result<Vec<KnownNameRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .context("Failed to read CSV header")?
        .clone();
    let position = |column: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}') == column)
            .ok_or_else(|| anyhow!("Missing column '{}' in {}", column, path.display()))
    };
    let name_idx = position(columns.name.as_str())?;
    let class_idx = position(columns.nice_class.as_str())?;
    // Region is informational by default; tolerate its absence.
    let region_idx = position(columns.region.as_str()).ok();

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!(target: TARGET_LOCAL_STORE, "Skipping unreadable row {} in {}: {}", line + 2, path.display(), err);
                continue;
            }
        };
        let name = row.get(name_idx).unwrap_or_default();
        if name.trim().is_empty() {
            continue;
        }
        let classes = split_classes(row.get(class_idx).unwrap_or_default());
        let region = region_idx.and_then(|i| row.get(i)).unwrap_or_default();
        records.push(KnownNameRecord::new(name, classes, region));
    }

    Ok(records)
}
