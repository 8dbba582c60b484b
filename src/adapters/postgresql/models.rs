//! Warehouse table layout and SQL text
//!
//! The column list mirrors the serialized field set of
//! [`EnrichedRecord`](crate::domain::EnrichedRecord), which lets both write
//! paths turn JSON straight into rows with `jsonb_populate_record(set)`.

use crate::core::state::watermark::{ExportStatus, Watermark};
use crate::domain::{Result, StrataError};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use tokio_postgres::Row;
use uuid::Uuid;

/// Columns of the target table in declaration order
pub const COLUMNS: &[(&str, &str)] = &[
    ("entity_id", "TEXT NOT NULL"),
    ("domain", "TEXT NOT NULL"),
    ("value", "TEXT NOT NULL"),
    ("attributes", "JSONB NOT NULL DEFAULT '{}'::jsonb"),
    ("changed_at", "TIMESTAMPTZ NOT NULL"),
    ("updated_at", "TIMESTAMPTZ NOT NULL"),
    ("context_id", "TEXT"),
    ("context_user_id", "TEXT"),
    ("friendly_name", "TEXT NOT NULL"),
    ("unit_of_measurement", "TEXT"),
    ("device_class", "TEXT"),
    ("numeric_value", "DOUBLE PRECISION"),
    ("category", "TEXT NOT NULL"),
    ("room", "TEXT"),
    ("labels", "JSONB NOT NULL DEFAULT '[]'::jsonb"),
    ("temperature_value", "DOUBLE PRECISION"),
    ("humidity_value", "DOUBLE PRECISION"),
    ("power_value", "DOUBLE PRECISION"),
    ("energy_value", "DOUBLE PRECISION"),
    ("hvac_mode", "TEXT"),
    ("hvac_action", "TEXT"),
    ("target_temperature", "DOUBLE PRECISION"),
    ("target_temp_high", "DOUBLE PRECISION"),
    ("target_temp_low", "DOUBLE PRECISION"),
    ("current_temperature", "DOUBLE PRECISION"),
    ("current_humidity", "DOUBLE PRECISION"),
    ("fan_mode", "TEXT"),
    ("preset_mode", "TEXT"),
    ("exported_at", "TIMESTAMPTZ NOT NULL"),
];

const KEY_COLUMNS: [&str; 2] = ["entity_id", "changed_at"];

/// Fully qualified names used by the warehouse statements
#[derive(Debug, Clone)]
pub struct TableLayout {
    pub schema: String,
    pub table: String,
    pub state_table: String,
}

impl TableLayout {
    pub fn new(schema: &str, table: &str, state_table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
            state_table: state_table.to_string(),
        }
    }

    pub fn target(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }

    pub fn state(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.state_table)
    }

    pub fn qualified(&self, name: &str) -> String {
        format!("\"{}\".\"{}\"", self.schema, name)
    }

    /// Schema, partitioned target table, its index, and the state table
    pub fn create_schema_sql(&self) -> String {
        let columns = COLUMNS
            .iter()
            .map(|(name, ty)| format!("    {name} {ty}"))
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "CREATE SCHEMA IF NOT EXISTS \"{schema}\";\n\
             CREATE TABLE IF NOT EXISTS {target} (\n{columns},\n    \
             PRIMARY KEY (entity_id, changed_at)\n) PARTITION BY RANGE (changed_at);\n\
             CREATE INDEX IF NOT EXISTS \"{table}_entity_domain_idx\" ON {target} (entity_id, domain);\n\
             CREATE TABLE IF NOT EXISTS {state} (\n    \
             id TEXT PRIMARY KEY,\n    \
             last_exported_at TIMESTAMPTZ,\n    \
             records_exported_count BIGINT NOT NULL DEFAULT 0,\n    \
             last_run_id UUID,\n    \
             last_export_started_at TIMESTAMPTZ,\n    \
             last_export_completed_at TIMESTAMPTZ,\n    \
             last_export_status TEXT NOT NULL\n);",
            schema = self.schema,
            target = self.target(),
            table = self.table,
            state = self.state(),
        )
    }

    /// One partition covering the calendar month starting at `month_start`
    pub fn create_partition_sql(&self, month_start: DateTime<Utc>) -> String {
        let next = next_month(month_start);
        format!(
            "CREATE TABLE IF NOT EXISTS {partition} PARTITION OF {target} \
             FOR VALUES FROM ('{from}') TO ('{to}')",
            partition = self.qualified(&partition_name(&self.table, month_start)),
            target = self.target(),
            from = month_start.to_rfc3339(),
            to = next.to_rfc3339(),
        )
    }

    /// Upsert of a JSON array of records; `$1` is the array
    ///
    /// Callers must remove duplicate keys from the array first, since
    /// `ON CONFLICT` cannot touch the same row twice in one statement.
    pub fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {target} ({columns}) \
             SELECT {columns} FROM jsonb_populate_recordset(NULL::{target}, $1::jsonb) \
             ON CONFLICT (entity_id, changed_at) DO UPDATE SET {updates}",
            target = self.target(),
            columns = column_list(""),
            updates = update_assignments("EXCLUDED."),
        )
    }

    /// Staging table numbering lines in load order
    ///
    /// `line_no` is filled by the identity as COPY reads the artifact, so a
    /// later line always has a larger number.
    pub fn create_staging_sql(&self, staging: &str) -> String {
        format!(
            "CREATE UNLOGGED TABLE {} (line_no BIGINT GENERATED ALWAYS AS IDENTITY, doc JSONB NOT NULL)",
            self.qualified(staging)
        )
    }

    /// COPY statement reading one JSON document per line
    ///
    /// CSV mode with control characters as quote and delimiter keeps the
    /// JSON text byte-for-byte; text mode would interpret its backslashes.
    pub fn copy_staging_sql(&self, staging: &str) -> String {
        format!(
            "COPY {} (doc) FROM STDIN WITH (FORMAT csv, QUOTE e'\\x01', DELIMITER e'\\x02')",
            self.qualified(staging)
        )
    }

    /// Single MERGE from a staging table into the target
    ///
    /// Of several lines with the same key the last one loaded wins,
    /// matching the streaming path.
    pub fn merge_sql(&self, staging: &str) -> String {
        format!(
            "MERGE INTO {target} AS t \
             USING (SELECT DISTINCT ON (r.entity_id, r.changed_at) r.* \
                    FROM {staging} s, jsonb_populate_record(NULL::{target}, s.doc) r \
                    ORDER BY r.entity_id, r.changed_at, s.line_no DESC) AS src \
             ON t.entity_id = src.entity_id AND t.changed_at = src.changed_at \
             WHEN MATCHED THEN UPDATE SET {updates} \
             WHEN NOT MATCHED THEN INSERT ({columns}) VALUES ({values})",
            target = self.target(),
            staging = self.qualified(staging),
            updates = update_assignments("src."),
            columns = column_list(""),
            values = column_list("src."),
        )
    }

    pub fn drop_staging_sql(&self, staging: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.qualified(staging))
    }

    pub fn summary_sql(&self) -> String {
        format!(
            "SELECT MIN(changed_at), MAX(changed_at), COUNT(*)::bigint FROM {}",
            self.target()
        )
    }

    pub fn load_watermark_sql(&self) -> String {
        format!(
            "SELECT id, last_exported_at, records_exported_count, last_run_id, \
             last_export_started_at, last_export_completed_at, last_export_status \
             FROM {} WHERE id = $1",
            self.state()
        )
    }

    pub fn save_watermark_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, last_exported_at, records_exported_count, last_run_id, \
             last_export_started_at, last_export_completed_at, last_export_status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
             last_exported_at = EXCLUDED.last_exported_at, \
             records_exported_count = EXCLUDED.records_exported_count, \
             last_run_id = EXCLUDED.last_run_id, \
             last_export_started_at = EXCLUDED.last_export_started_at, \
             last_export_completed_at = EXCLUDED.last_export_completed_at, \
             last_export_status = EXCLUDED.last_export_status",
            self.state()
        )
    }
}

fn column_list(prefix: &str) -> String {
    COLUMNS
        .iter()
        .map(|(name, _)| format!("{prefix}{name}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn update_assignments(source_prefix: &str) -> String {
    COLUMNS
        .iter()
        .filter(|(name, _)| !KEY_COLUMNS.contains(name))
        .map(|(name, _)| format!("{name} = {source_prefix}{name}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Partition table name for the month containing `ts`, e.g. `sensor_data_p202501`
pub fn partition_name(table: &str, ts: DateTime<Utc>) -> String {
    format!("{}_p{:04}{:02}", table, ts.year(), ts.month())
}

/// First instant of the month containing `ts`
pub fn month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(ts.year(), ts.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(ts)
}

/// First instant of the month after the one starting at `start`
pub fn next_month(start: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(start)
}

/// Month starts of every partition a range `[start, end)` touches
pub fn months_covering(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut months = Vec::new();
    let mut current = month_start(start);
    while current < end {
        months.push(current);
        let next = next_month(current);
        if next <= current {
            break;
        }
        current = next;
    }
    months
}

/// Watermark row as stored in the state table
#[derive(Debug, Clone)]
pub struct PostgreSQLWatermark {
    pub id: String,
    pub last_exported_at: Option<DateTime<Utc>>,
    pub records_exported_count: i64,
    pub last_run_id: Option<Uuid>,
    pub last_export_started_at: Option<DateTime<Utc>>,
    pub last_export_completed_at: Option<DateTime<Utc>>,
    pub last_export_status: String,
}

impl PostgreSQLWatermark {
    pub fn from_domain(watermark: &Watermark) -> Self {
        Self {
            id: watermark.id.clone(),
            last_exported_at: watermark.last_exported_at,
            records_exported_count: i64::try_from(watermark.records_exported_count)
                .unwrap_or(i64::MAX),
            last_run_id: watermark.last_run_id,
            last_export_started_at: watermark.last_export_started_at,
            last_export_completed_at: watermark.last_export_completed_at,
            last_export_status: watermark.last_export_status.as_str().to_string(),
        }
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row
                .try_get("id")
                .map_err(|e| StrataError::State(format!("Invalid watermark row: {e}")))?,
            last_exported_at: row
                .try_get("last_exported_at")
                .map_err(|e| StrataError::State(format!("Invalid watermark row: {e}")))?,
            records_exported_count: row
                .try_get("records_exported_count")
                .map_err(|e| StrataError::State(format!("Invalid watermark row: {e}")))?,
            last_run_id: row
                .try_get("last_run_id")
                .map_err(|e| StrataError::State(format!("Invalid watermark row: {e}")))?,
            last_export_started_at: row
                .try_get("last_export_started_at")
                .map_err(|e| StrataError::State(format!("Invalid watermark row: {e}")))?,
            last_export_completed_at: row
                .try_get("last_export_completed_at")
                .map_err(|e| StrataError::State(format!("Invalid watermark row: {e}")))?,
            last_export_status: row
                .try_get("last_export_status")
                .map_err(|e| StrataError::State(format!("Invalid watermark row: {e}")))?,
        })
    }

    pub fn to_domain(&self) -> Result<Watermark> {
        let status = ExportStatus::parse(&self.last_export_status).ok_or_else(|| {
            StrataError::State(format!(
                "Unknown export status '{}' for watermark {}",
                self.last_export_status, self.id
            ))
        })?;

        Ok(Watermark {
            id: self.id.clone(),
            last_exported_at: self.last_exported_at,
            records_exported_count: u64::try_from(self.records_exported_count).unwrap_or(0),
            last_run_id: self.last_run_id,
            last_export_started_at: self.last_export_started_at,
            last_export_completed_at: self.last_export_completed_at,
            last_export_status: status,
        })
    }
}
