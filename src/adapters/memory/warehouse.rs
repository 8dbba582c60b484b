//! In-memory warehouse and state storage

use crate::adapters::database::traits::{RangeSummary, StagingArea, StateStorage, Warehouse};
use crate::core::state::watermark::Watermark;
use crate::domain::{DedupKey, EnrichedRecord, Result, StrataError, TimeRange};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct WarehouseState {
    rows: BTreeMap<DedupKey, EnrichedRecord>,
    staging: HashMap<String, Vec<EnrichedRecord>>,
    staging_created: usize,
    upsert_calls: usize,
    transient_failures_remaining: usize,
    reject_credentials: bool,
    fail_load: bool,
    fail_merge: bool,
}

/// Warehouse keyed on [`DedupKey`], with the same upsert and staging
/// semantics as the PostgreSQL implementation
///
/// Injected failures let tests drive the retry and cleanup paths.
#[derive(Default)]
pub struct MemoryWarehouse {
    state: Mutex<WarehouseState>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WarehouseState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// All rows in key order
    pub fn rows(&self) -> Vec<EnrichedRecord> {
        self.lock().rows.values().cloned().collect()
    }

    pub fn row_count(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn get(&self, key: &DedupKey) -> Option<EnrichedRecord> {
        self.lock().rows.get(key).cloned()
    }

    pub fn insert_rows(&self, records: impl IntoIterator<Item = EnrichedRecord>) {
        let mut state = self.lock();
        for record in records {
            state.rows.insert(record.dedup_key(), record);
        }
    }

    /// Fail the next `n` upserts with `TransientWrite`
    pub fn fail_next_upserts(&self, n: usize) {
        self.lock().transient_failures_remaining = n;
    }

    pub fn reject_credentials(&self, reject: bool) {
        self.lock().reject_credentials = reject;
    }

    pub fn fail_load(&self, fail: bool) {
        self.lock().fail_load = fail;
    }

    pub fn fail_merge(&self, fail: bool) {
        self.lock().fail_merge = fail;
    }

    pub fn upsert_calls(&self) -> usize {
        self.lock().upsert_calls
    }

    pub fn staging_areas_created(&self) -> usize {
        self.lock().staging_created
    }

    /// Staging areas created and not yet dropped
    pub fn open_staging_areas(&self) -> usize {
        self.lock().staging.len()
    }

    fn check_credentials(state: &WarehouseState) -> Result<()> {
        if state.reject_credentials {
            return Err(StrataError::Authentication(
                "in-memory warehouse rejected credentials".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn name(&self) -> &str {
        "memory"
    }

    async fn test_connection(&self) -> Result<()> {
        Self::check_credentials(&self.lock())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Self::check_credentials(&self.lock())
    }

    async fn prepare_range(&self, _range: &TimeRange) -> Result<()> {
        Ok(())
    }

    async fn upsert_batch(&self, records: &[EnrichedRecord]) -> Result<u64> {
        let mut state = self.lock();
        state.upsert_calls += 1;
        Self::check_credentials(&state)?;
        if state.transient_failures_remaining > 0 {
            state.transient_failures_remaining -= 1;
            return Err(StrataError::TransientWrite(
                "injected transient failure".to_string(),
            ));
        }
        let mut touched = BTreeSet::new();
        for record in records {
            touched.insert(record.dedup_key());
            state.rows.insert(record.dedup_key(), record.clone());
        }
        Ok(touched.len() as u64)
    }

    async fn create_staging_area(&self) -> Result<StagingArea> {
        let mut state = self.lock();
        Self::check_credentials(&state)?;
        let name = format!("staging_{}", Uuid::new_v4().simple());
        state.staging.insert(name.clone(), Vec::new());
        state.staging_created += 1;
        Ok(StagingArea { name })
    }

    async fn load_staging(&self, area: &StagingArea, artifact: &Path) -> Result<u64> {
        let contents = tokio::fs::read_to_string(artifact)
            .await
            .map_err(|e| StrataError::BulkLoad(format!("cannot read staging artifact: {e}")))?;

        let mut loaded = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: EnrichedRecord = serde_json::from_str(line).map_err(|e| {
                StrataError::BulkLoad(format!("invalid staging line {}: {e}", line_no + 1))
            })?;
            loaded.push(record);
        }

        let mut state = self.lock();
        if state.fail_load {
            return Err(StrataError::BulkLoad("injected load failure".to_string()));
        }
        let count = loaded.len() as u64;
        match state.staging.get_mut(&area.name) {
            Some(rows) => rows.extend(loaded),
            None => {
                return Err(StrataError::BulkLoad(format!(
                    "staging area {} does not exist",
                    area.name
                )))
            }
        }
        Ok(count)
    }

    async fn merge_staging(&self, area: &StagingArea) -> Result<u64> {
        let mut state = self.lock();
        if state.fail_merge {
            return Err(StrataError::Merge("injected merge failure".to_string()));
        }
        let staged = state
            .staging
            .get(&area.name)
            .cloned()
            .ok_or_else(|| StrataError::Merge(format!("staging area {} does not exist", area.name)))?;

        let mut collapsed: BTreeMap<DedupKey, EnrichedRecord> = BTreeMap::new();
        for record in staged {
            collapsed.insert(record.dedup_key(), record);
        }
        let merged = collapsed.len() as u64;
        state.rows.extend(collapsed);
        Ok(merged)
    }

    async fn drop_staging_area(&self, area: &StagingArea) -> Result<()> {
        self.lock().staging.remove(&area.name);
        Ok(())
    }

    async fn summary(&self) -> Result<RangeSummary> {
        let state = self.lock();
        Self::check_credentials(&state)?;
        let min = state.rows.values().map(|r| r.changed_at).min();
        let max = state.rows.values().map(|r| r.changed_at).max();
        Ok(RangeSummary {
            min_ts: min,
            max_ts: max,
            count_estimate: state.rows.len() as u64,
        })
    }
}

/// Watermark storage held in a map
#[derive(Default)]
pub struct MemoryStateStorage {
    watermarks: Mutex<HashMap<String, Watermark>>,
}

#[async_trait]
impl StateStorage for MemoryStateStorage {
    async fn load_watermark(&self, id: &str) -> Result<Option<Watermark>> {
        let watermarks = self.watermarks.lock().unwrap_or_else(|p| p.into_inner());
        Ok(watermarks.get(id).cloned())
    }

    async fn save_watermark(&self, watermark: &Watermark) -> Result<()> {
        self.watermarks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(watermark.id.clone(), watermark.clone());
        Ok(())
    }
}
