//! Strategy history: per (element, domain, strategy) heal statistics

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dashmap::DashMap;
use healkit_core_types::StrategyId;
use healkit_file_store::JsonRecordFile;
use page_port::normalize_text;

use crate::errors::LocatorError;
use crate::types::HealRecord;

/// Shared store of learned strategy outcomes.
///
/// Writes are last-writer-wins upserts; counts only grow until [`HistoryStore::purge`].
pub trait HistoryStore: Send + Sync {
    /// Fold one attempt into the record for `(element, domain, strategy)`.
    fn record(
        &self,
        element: &str,
        domain: &str,
        strategy: StrategyId,
        success: bool,
        duration: Duration,
    ) -> Result<HealRecord, LocatorError>;

    fn get(
        &self,
        element: &str,
        domain: &str,
        strategy: StrategyId,
    ) -> Result<Option<HealRecord>, LocatorError>;

    fn all(&self) -> Result<Vec<HealRecord>, LocatorError>;

    /// Drop every record. Returns how many were removed.
    fn purge(&self) -> Result<usize, LocatorError>;

    /// Up to `n` strategies with at least one success for this element, best first.
    fn top_strategies(
        &self,
        element: &str,
        domain: &str,
        n: usize,
    ) -> Result<Vec<StrategyId>, LocatorError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let element = normalize_text(element);
        let domain = domain.to_ascii_lowercase();
        let mut records: Vec<HealRecord> = self
            .all()?
            .into_iter()
            .filter(|r| r.element == element && r.domain == domain && r.success_count > 0)
            .collect();
        records.sort_by(rank);
        Ok(records.into_iter().take(n).map(|r| r.strategy).collect())
    }
}

/// Best first: success rate, then success count, then faster average.
fn rank(a: &HealRecord, b: &HealRecord) -> Ordering {
    b.success_rate()
        .total_cmp(&a.success_rate())
        .then_with(|| b.success_count.cmp(&a.success_count))
        .then_with(|| a.avg_duration_ms.total_cmp(&b.avg_duration_ms))
        .then_with(|| a.strategy.cmp(&b.strategy))
}

fn record_key(element: &str, domain: &str, strategy: StrategyId) -> (String, String, String) {
    let element = normalize_text(element);
    let domain = domain.to_ascii_lowercase();
    let key = format!("{}|{}|{}", element, domain, strategy.name());
    (key, element, domain)
}

/// Process-local history.
#[derive(Default)]
pub struct InMemoryHistory {
    records: DashMap<String, HealRecord>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl HistoryStore for InMemoryHistory {
    fn record(
        &self,
        element: &str,
        domain: &str,
        strategy: StrategyId,
        success: bool,
        duration: Duration,
    ) -> Result<HealRecord, LocatorError> {
        let (key, element, domain) = record_key(element, domain, strategy);
        let mut entry = self
            .records
            .entry(key)
            .or_insert_with(|| HealRecord::new(element, domain, strategy));
        entry.apply(success, duration);
        Ok(entry.clone())
    }

    fn get(
        &self,
        element: &str,
        domain: &str,
        strategy: StrategyId,
    ) -> Result<Option<HealRecord>, LocatorError> {
        let (key, _, _) = record_key(element, domain, strategy);
        Ok(self.records.get(&key).map(|r| r.clone()))
    }

    fn all(&self) -> Result<Vec<HealRecord>, LocatorError> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    fn purge(&self) -> Result<usize, LocatorError> {
        let count = self.records.len();
        self.records.clear();
        Ok(count)
    }
}

/// JSON-file history shared by independent runs and store instances.
///
/// Each record is a locked read-merge-write against the file, so concurrent writers
/// never drop one another's counts.
pub struct JsonFileHistory {
    file: JsonRecordFile<HealRecord>,
}

impl JsonFileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonRecordFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl HistoryStore for JsonFileHistory {
    fn record(
        &self,
        element: &str,
        domain: &str,
        strategy: StrategyId,
        success: bool,
        duration: Duration,
    ) -> Result<HealRecord, LocatorError> {
        let (key, element, domain) = record_key(element, domain, strategy);
        let updated = self.file.update(|records| {
            let record = records
                .entry(key)
                .or_insert_with(|| HealRecord::new(element, domain, strategy));
            record.apply(success, duration);
            (record.clone(), true)
        })?;
        Ok(updated)
    }

    fn get(
        &self,
        element: &str,
        domain: &str,
        strategy: StrategyId,
    ) -> Result<Option<HealRecord>, LocatorError> {
        let (key, _, _) = record_key(element, domain, strategy);
        Ok(self.file.load()?.remove(&key))
    }

    fn all(&self) -> Result<Vec<HealRecord>, LocatorError> {
        Ok(self.file.load()?.into_values().collect())
    }

    fn purge(&self) -> Result<usize, LocatorError> {
        let count = self.file.update(|records| {
            let count = records.len();
            records.clear();
            (count, count > 0)
        })?;
        Ok(count)
    }
}
