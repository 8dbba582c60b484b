//! PostgreSQL warehouse adapter
//!
//! Implements [`Warehouse`] and [`StateStorage`] on one connection pool.
//! The target table is range-partitioned by `changed_at` with one partition
//! per calendar month. Requires PostgreSQL 15 or newer for `MERGE`.

use crate::adapters::database::traits::{RangeSummary, StagingArea, StateStorage, Warehouse};
use crate::adapters::postgresql::client::{classify_pg_error, PostgreSQLClient};
use crate::adapters::postgresql::models::{months_covering, PostgreSQLWatermark, TableLayout};
use crate::core::state::watermark::Watermark;
use crate::domain::{DedupKey, EnrichedRecord, Result, StrataError, TimeRange};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::SinkExt;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

const COPY_CHUNK_BYTES: usize = 1024 * 1024;

/// PostgreSQL implementation of the warehouse and watermark storage
pub struct PostgresWarehouse {
    client: Arc<PostgreSQLClient>,
    layout: TableLayout,
    partitions: Mutex<HashSet<String>>,
}

impl PostgresWarehouse {
    pub fn new(client: PostgreSQLClient, layout: TableLayout) -> Self {
        Self::new_with_arc(Arc::new(client), layout)
    }

    pub fn new_with_arc(client: Arc<PostgreSQLClient>, layout: TableLayout) -> Self {
        Self {
            client,
            layout,
            partitions: Mutex::new(HashSet::new()),
        }
    }

    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }
}

/// Collapse duplicate keys within a batch, keeping the last occurrence
///
/// Output keeps the position of each key's first appearance.
pub fn dedupe_batch(records: &[EnrichedRecord]) -> Vec<&EnrichedRecord> {
    let mut positions: HashMap<DedupKey, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<&EnrichedRecord> = Vec::with_capacity(records.len());
    for record in records {
        match positions.get(&record.dedup_key()) {
            Some(&idx) => out[idx] = record,
            None => {
                positions.insert(record.dedup_key(), out.len());
                out.push(record);
            }
        }
    }
    out
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    fn name(&self) -> &str {
        "postgresql"
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client
            .batch_execute(&self.layout.create_schema_sql())
            .await?;
        tracing::info!(table = %self.layout.target(), "Warehouse schema ready");
        Ok(())
    }

    async fn prepare_range(&self, range: &TimeRange) -> Result<()> {
        for month in months_covering(range.start, range.end) {
            let key = month.format("%Y%m").to_string();
            let known = self
                .partitions
                .lock()
                .map(|p| p.contains(&key))
                .unwrap_or(false);
            if known {
                continue;
            }

            self.client
                .execute(&self.layout.create_partition_sql(month), &[])
                .await?;
            tracing::debug!(partition = %key, "Partition ensured");

            if let Ok(mut partitions) = self.partitions.lock() {
                partitions.insert(key);
            }
        }
        Ok(())
    }

    async fn upsert_batch(&self, records: &[EnrichedRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let unique = dedupe_batch(records);
        let payload = serde_json::to_value(&unique)?;

        let affected = self
            .client
            .execute(&self.layout.upsert_sql(), &[&payload])
            .await?;

        tracing::debug!(
            batch = records.len(),
            unique = unique.len(),
            affected,
            "Upserted batch"
        );
        Ok(affected)
    }

    async fn create_staging_area(&self) -> Result<StagingArea> {
        let name = format!("strata_staging_{}", Uuid::new_v4().simple());
        self.client
            .execute(&self.layout.create_staging_sql(&name), &[])
            .await?;
        tracing::debug!(staging = %name, "Created staging table");
        Ok(StagingArea { name })
    }

    async fn load_staging(&self, area: &StagingArea, artifact: &Path) -> Result<u64> {
        let bulk_err = |context: &str, e: &dyn std::fmt::Display| {
            StrataError::BulkLoad(format!("{context} ({}): {e}", area.name))
        };

        let mut file = tokio::fs::File::open(artifact)
            .await
            .map_err(|e| bulk_err("Cannot open staging artifact", &e))?;

        let client = self.client.get_connection().await?;
        let sink = client
            .copy_in::<_, bytes::Bytes>(&self.layout.copy_staging_sql(&area.name))
            .await
            .map_err(|e| bulk_err("COPY rejected", &classify_pg_error("copy", &e)))?;
        futures::pin_mut!(sink);

        let mut buf = BytesMut::with_capacity(COPY_CHUNK_BYTES);
        loop {
            buf.reserve(COPY_CHUNK_BYTES);
            let read = file
                .read_buf(&mut buf)
                .await
                .map_err(|e| bulk_err("Cannot read staging artifact", &e))?;
            if read == 0 || buf.len() >= COPY_CHUNK_BYTES {
                if !buf.is_empty() {
                    sink.send(buf.split().freeze())
                        .await
                        .map_err(|e| bulk_err("COPY stream failed", &e))?;
                }
            }
            if read == 0 {
                break;
            }
        }

        let rows = sink
            .as_mut()
            .finish()
            .await
            .map_err(|e| bulk_err("COPY did not complete", &e))?;

        tracing::debug!(staging = %area.name, rows, "Loaded staging table");
        Ok(rows)
    }

    async fn merge_staging(&self, area: &StagingArea) -> Result<u64> {
        let merged = self
            .client
            .execute(&self.layout.merge_sql(&area.name), &[])
            .await
            .map_err(|e| StrataError::Merge(format!("MERGE from {} failed: {e}", area.name)))?;
        tracing::debug!(staging = %area.name, merged, "Merged staging table");
        Ok(merged)
    }

    async fn drop_staging_area(&self, area: &StagingArea) -> Result<()> {
        self.client
            .execute(&self.layout.drop_staging_sql(&area.name), &[])
            .await?;
        tracing::debug!(staging = %area.name, "Dropped staging table");
        Ok(())
    }

    async fn summary(&self) -> Result<RangeSummary> {
        let rows = self.client.query(&self.layout.summary_sql(), &[]).await?;
        let Some(row) = rows.first() else {
            return Ok(RangeSummary::default());
        };
        let read_err = |e: tokio_postgres::Error| StrataError::Database(format!("Invalid summary row: {e}"));
        let count: i64 = row.try_get(2).map_err(read_err)?;
        Ok(RangeSummary {
            min_ts: row.try_get(0).map_err(read_err)?,
            max_ts: row.try_get(1).map_err(read_err)?,
            count_estimate: u64::try_from(count).unwrap_or(0),
        })
    }
}

#[async_trait]
impl StateStorage for PostgresWarehouse {
    async fn load_watermark(&self, id: &str) -> Result<Option<Watermark>> {
        tracing::debug!(watermark_id = %id, "Loading watermark from PostgreSQL");

        let rows = self
            .client
            .query(&self.layout.load_watermark_sql(), &[&id])
            .await?;

        match rows.first() {
            Some(row) => {
                let watermark = PostgreSQLWatermark::from_row(row)?.to_domain()?;
                tracing::debug!(
                    watermark_id = %id,
                    last_exported_at = ?watermark.last_exported_at,
                    "Watermark loaded"
                );
                Ok(Some(watermark))
            }
            None => {
                tracing::debug!(watermark_id = %id, "No watermark found (first export)");
                Ok(None)
            }
        }
    }

    async fn save_watermark(&self, watermark: &Watermark) -> Result<()> {
        let row = PostgreSQLWatermark::from_domain(watermark);
        self.client
            .execute(
                &self.layout.save_watermark_sql(),
                &[
                    &row.id,
                    &row.last_exported_at,
                    &row.records_exported_count,
                    &row.last_run_id,
                    &row.last_export_started_at,
                    &row.last_export_completed_at,
                    &row.last_export_status,
                ],
            )
            .await
            .map_err(|e| match e {
                StrataError::Authentication(msg) => StrataError::Authentication(msg),
                other => StrataError::State(format!("Failed to save watermark: {other}")),
            })?;
        Ok(())
    }
}
