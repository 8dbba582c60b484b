//! Recorder history source
//!
//! Reads the Home Assistant recorder schema: `states` rows joined to
//! `states_meta` for the entity id and to `state_attributes` for the JSON
//! attributes. Timestamps are stored as epoch floats; the change time is
//! `last_changed_ts`, falling back to `last_updated_ts` when the state did
//! not change value.
//!
//! Estimates never scan `states`: row counts come from the planner and
//! history bounds from the `last_updated_ts` index.

use crate::adapters::database::traits::{PageCursor, RangeSummary, RecordSource, SourcePage};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::domain::{EntityId, RawRecord, Result, StrataError, TimeRange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_postgres::Row;

const CHANGED_TS: &str = "COALESCE(s.last_changed_ts, s.last_updated_ts)";

/// PostgreSQL implementation of [`RecordSource`]
pub struct RecorderSource {
    client: Arc<PostgreSQLClient>,
}

impl RecorderSource {
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    fn page_sql(with_cursor: bool) -> String {
        let cursor_clause = if with_cursor {
            format!("AND (to_timestamp({CHANGED_TS}), s.state_id::bigint) > ($3, $4) ")
        } else {
            String::new()
        };
        let limit_param = if with_cursor { "$5" } else { "$3" };

        format!(
            "SELECT s.state_id::bigint AS row_id, m.entity_id, s.state, a.shared_attrs, \
                    to_timestamp({CHANGED_TS}) AS changed_at, \
                    to_timestamp(COALESCE(s.last_updated_ts, s.last_changed_ts)) AS updated_at, \
                    encode(s.context_id_bin, 'hex') AS context_id, \
                    encode(s.context_user_id_bin, 'hex') AS context_user_id \
             FROM states s \
             JOIN states_meta m ON m.metadata_id = s.metadata_id \
             LEFT JOIN state_attributes a ON a.attributes_id = s.attributes_id \
             WHERE {CHANGED_TS} >= $1 AND {CHANGED_TS} < $2 \
             {cursor_clause}\
             ORDER BY to_timestamp({CHANGED_TS}), s.state_id \
             LIMIT {limit_param}"
        )
    }

    /// Row to record; `None` for rows whose entity id is malformed
    fn record_from_row(row: &Row) -> Result<Option<(i64, RawRecord)>> {
        let get_err = |e: tokio_postgres::Error| {
            StrataError::SourceUnavailable(format!("Unexpected recorder row shape: {e}"))
        };

        let row_id: i64 = row.try_get("row_id").map_err(get_err)?;
        let entity: String = row.try_get("entity_id").map_err(get_err)?;
        let state: Option<String> = row.try_get("state").map_err(get_err)?;
        let shared_attrs: Option<String> = row.try_get("shared_attrs").map_err(get_err)?;
        let changed_at: DateTime<Utc> = row.try_get("changed_at").map_err(get_err)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(get_err)?;
        let context_id: Option<String> = row.try_get("context_id").map_err(get_err)?;
        let context_user_id: Option<String> = row.try_get("context_user_id").map_err(get_err)?;

        let entity_id = match EntityId::new(entity.as_str()) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(entity_id = %entity, row_id, error = %e, "Skipping row with malformed entity id");
                return Ok(None);
            }
        };

        let attributes = shared_attrs
            .as_deref()
            .map(parse_attributes)
            .unwrap_or_default();

        let mut record = RawRecord::new(entity_id, state.unwrap_or_default(), changed_at)
            .with_attributes(attributes)
            .with_updated_at(updated_at);
        if let Some(context_id) = context_id {
            record = record.with_context(context_id, context_user_id);
        }

        Ok(Some((row_id, record)))
    }

    /// Planner row estimate for a query, read from `EXPLAIN (FORMAT JSON)`
    async fn planner_estimate(&self, query: &str) -> Result<u64> {
        let rows = self
            .client
            .query(&format!("EXPLAIN (FORMAT JSON) {query}"), &[])
            .await
            .map_err(into_source_error)?;

        let plan: Value = rows
            .first()
            .map(|row| row.try_get(0))
            .transpose()
            .map_err(|e| StrataError::SourceUnavailable(format!("Unreadable query plan: {e}")))?
            .unwrap_or(Value::Null);

        Ok(plan_rows(&plan).unwrap_or(0))
    }
}

/// Source-side failures are either credential problems or the store being unusable
fn into_source_error(err: StrataError) -> StrataError {
    match err {
        StrataError::Authentication(msg) => StrataError::Authentication(msg),
        StrataError::Configuration(msg) => StrataError::Configuration(msg),
        other => StrataError::SourceUnavailable(other.to_string()),
    }
}

/// Parse `shared_attrs`; unparseable or non-object payloads yield no attributes
fn parse_attributes(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unparseable state attributes");
            Map::new()
        }
    }
}

/// `Plan Rows` of the top plan node
fn plan_rows(plan: &Value) -> Option<u64> {
    plan.get(0)?
        .get("Plan")?
        .get("Plan Rows")?
        .as_f64()
        .map(|rows| rows.max(0.0).round() as u64)
}

fn epoch(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

fn range_predicate(range: &TimeRange) -> String {
    format!(
        "{CHANGED_TS} >= {:.6} AND {CHANGED_TS} < {:.6}",
        epoch(range.start),
        epoch(range.end)
    )
}

/// MIN/MAX over `last_updated_ts`
///
/// `last_updated_ts` carries the recorder's own index, so both aggregates
/// resolve to index endpoint lookups instead of a scan of `states`.
fn bounds_sql(range: Option<&TimeRange>) -> String {
    let predicate = range.map_or_else(
        || "s.last_updated_ts IS NOT NULL".to_string(),
        |range| {
            format!(
                "s.last_updated_ts >= {:.6} AND s.last_updated_ts < {:.6}",
                epoch(range.start),
                epoch(range.end)
            )
        },
    );
    format!(
        "SELECT to_timestamp(MIN(s.last_updated_ts)), to_timestamp(MAX(s.last_updated_ts)) \
         FROM states s WHERE {predicate}"
    )
}

#[async_trait]
impl RecordSource for RecorderSource {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await.map_err(into_source_error)
    }

    async fn fetch_page(
        &self,
        range: &TimeRange,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<SourcePage> {
        let start = epoch(range.start);
        let end = epoch(range.end);
        let limit_param = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = match after {
            Some(cursor) => {
                self.client
                    .query(
                        &Self::page_sql(true),
                        &[&start, &end, &cursor.changed_at, &cursor.row_id, &limit_param],
                    )
                    .await
            }
            None => {
                self.client
                    .query(&Self::page_sql(false), &[&start, &end, &limit_param])
                    .await
            }
        }
        .map_err(into_source_error)?;

        let full_page = rows.len() == limit;
        let mut records = Vec::with_capacity(rows.len());
        let mut last: Option<PageCursor> = None;
        for row in &rows {
            let changed_at: DateTime<Utc> = row
                .try_get("changed_at")
                .map_err(|e| StrataError::SourceUnavailable(format!("Unexpected recorder row shape: {e}")))?;
            let row_id: i64 = row
                .try_get("row_id")
                .map_err(|e| StrataError::SourceUnavailable(format!("Unexpected recorder row shape: {e}")))?;
            last = Some(PageCursor { changed_at, row_id });

            if let Some((_, record)) = Self::record_from_row(row)? {
                records.push(record);
            }
        }

        tracing::debug!(
            window_start = %range.start,
            rows = rows.len(),
            kept = records.len(),
            "Fetched recorder page"
        );

        Ok(SourcePage {
            records,
            next: if full_page { last } else { None },
        })
    }

    async fn summary(&self, range: Option<&TimeRange>) -> Result<RangeSummary> {
        let rows = self
            .client
            .query(&bounds_sql(range), &[])
            .await
            .map_err(into_source_error)?;

        let (min_ts, max_ts): (Option<DateTime<Utc>>, Option<DateTime<Utc>>) = match rows.first() {
            Some(row) => (
                row.try_get(0).map_err(|e| StrataError::SourceUnavailable(e.to_string()))?,
                row.try_get(1).map_err(|e| StrataError::SourceUnavailable(e.to_string()))?,
            ),
            None => (None, None),
        };

        let count_estimate = match range {
            Some(range) => self.count_estimate(range).await?,
            None => {
                let rows = self
                    .client
                    .query(
                        "SELECT GREATEST(reltuples, 0)::bigint FROM pg_class WHERE oid = 'states'::regclass",
                        &[],
                    )
                    .await
                    .map_err(into_source_error)?;
                rows.first()
                    .map(|row| row.try_get::<_, i64>(0))
                    .transpose()
                    .map_err(|e| StrataError::SourceUnavailable(e.to_string()))?
                    .map_or(0, |n| u64::try_from(n).unwrap_or(0))
            }
        };

        Ok(RangeSummary {
            min_ts,
            max_ts,
            count_estimate: if min_ts.is_none() { 0 } else { count_estimate },
        })
    }

    async fn count_estimate(&self, range: &TimeRange) -> Result<u64> {
        self.planner_estimate(&format!(
            "SELECT 1 FROM states s WHERE {}",
            range_predicate(range)
        ))
        .await
    }

    async fn entity_estimate(&self, range: &TimeRange) -> Result<u64> {
        self.planner_estimate(&format!(
            "SELECT DISTINCT s.metadata_id FROM states s WHERE {}",
            range_predicate(range)
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_page_sql_parameters() {
        let first = RecorderSource::page_sql(false);
        assert!(first.contains("LIMIT $3"));
        assert!(!first.contains("$4"));

        let next = RecorderSource::page_sql(true);
        assert!(next.contains("> ($3, $4)"));
        assert!(next.contains("LIMIT $5"));
    }

    #[test]
    fn test_parse_attributes() {
        let attrs = parse_attributes(r#"{"unit_of_measurement":"°C","friendly_name":"Kitchen"}"#);
        assert_eq!(attrs.get("friendly_name"), Some(&json!("Kitchen")));
        assert!(parse_attributes("[1,2]").is_empty());
        assert!(parse_attributes("{not json").is_empty());
    }

    #[test]
    fn test_plan_rows() {
        let plan = json!([{"Plan": {"Node Type": "Seq Scan", "Plan Rows": 1523.0}}]);
        assert_eq!(plan_rows(&plan), Some(1523));
        assert_eq!(plan_rows(&json!([])), None);
    }

    #[test]
    fn test_range_predicate_uses_epoch_seconds() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, start + chrono::Duration::seconds(90)).unwrap();
        let predicate = range_predicate(&range);
        assert!(predicate.contains(">= 1735689600.000000"));
        assert!(predicate.contains("< 1735689690.000000"));
    }

    #[test]
    fn test_bounds_use_indexed_update_time() {
        let all_time = bounds_sql(None);
        assert!(all_time.contains("MIN(s.last_updated_ts)"));
        assert!(all_time.contains("MAX(s.last_updated_ts)"));
        assert!(!all_time.contains("COALESCE"));

        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, start + chrono::Duration::days(1)).unwrap();
        let ranged = bounds_sql(Some(&range));
        assert!(ranged.contains("s.last_updated_ts >= 1735689600.000000"));
        assert!(ranged.contains("s.last_updated_ts < 1735776000.000000"));
        assert!(!ranged.contains("COALESCE"));
    }

    #[test]
    fn test_source_error_mapping() {
        assert!(matches!(
            into_source_error(StrataError::TransientWrite("x".into())),
            StrataError::SourceUnavailable(_)
        ));
        assert!(matches!(
            into_source_error(StrataError::Authentication("x".into())),
            StrataError::Authentication(_)
        ));
    }
}
