//! In-memory record source

use crate::adapters::database::traits::{PageCursor, RangeSummary, RecordSource, SourcePage};
use crate::domain::{RawRecord, Result, StrataError, TimeRange};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Record source backed by a sorted vector
///
/// Rows get a synthetic id in insertion order, used as the keyset
/// tie-breaker exactly like the recorder's `state_id`. Failure switches let
/// tests simulate an unreachable store.
#[derive(Default)]
pub struct MemorySource {
    rows: RwLock<Vec<(i64, RawRecord)>>,
    unavailable: AtomicBool,
    pages_until_failure: RwLock<Option<usize>>,
    page_delay: Option<Duration>,
    pages_fetched: AtomicUsize,
    summaries: AtomicUsize,
}

impl MemorySource {
    pub fn new(records: impl IntoIterator<Item = RawRecord>) -> Self {
        let source = Self::default();
        source.extend(records);
        source
    }

    /// Sleep this long before serving every page
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    pub fn extend(&self, records: impl IntoIterator<Item = RawRecord>) {
        let mut rows = self.rows.write().unwrap_or_else(|p| p.into_inner());
        let mut next_id = rows.len() as i64 + 1;
        for record in records {
            rows.push((next_id, record));
            next_id += 1;
        }
        rows.sort_by(|a, b| (a.1.changed_at, a.0).cmp(&(b.1.changed_at, b.0)));
    }

    /// Make every call fail with `SourceUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Serve `pages` more pages, then become unavailable
    pub fn fail_after_pages(&self, pages: usize) {
        *self
            .pages_until_failure
            .write()
            .unwrap_or_else(|p| p.into_inner()) = Some(pages);
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched.load(Ordering::SeqCst)
    }

    /// Number of `summary` calls served
    pub fn summaries(&self) -> usize {
        self.summaries.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        let mut budget = self
            .pages_until_failure
            .write()
            .unwrap_or_else(|p| p.into_inner());
        if let Some(remaining) = budget.as_mut() {
            if *remaining == 0 {
                self.unavailable.store(true, Ordering::SeqCst);
            } else {
                *remaining -= 1;
            }
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StrataError::SourceUnavailable(
                "in-memory source marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn in_range<'a>(
        rows: &'a [(i64, RawRecord)],
        range: Option<&'a TimeRange>,
    ) -> impl Iterator<Item = &'a (i64, RawRecord)> + 'a {
        rows.iter().filter(move |(_, r)| {
            range.map_or(true, |range| r.changed_at >= range.start && r.changed_at < range.end)
        })
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn test_connection(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StrataError::SourceUnavailable(
                "in-memory source marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn fetch_page(
        &self,
        range: &TimeRange,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<SourcePage> {
        if let Some(delay) = self.page_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;
        self.pages_fetched.fetch_add(1, Ordering::SeqCst);

        let rows = self.rows.read().unwrap_or_else(|p| p.into_inner());
        let mut page: Vec<&(i64, RawRecord)> = Self::in_range(&rows, Some(range))
            .filter(|(id, r)| {
                after.map_or(true, |c| (r.changed_at, *id) > (c.changed_at, c.row_id))
            })
            .take(limit + 1)
            .collect();

        let has_more = page.len() > limit;
        page.truncate(limit);
        let next = if has_more {
            page.last().map(|(id, r)| PageCursor {
                changed_at: r.changed_at,
                row_id: *id,
            })
        } else {
            None
        };

        Ok(SourcePage {
            records: page.into_iter().map(|(_, r)| r.clone()).collect(),
            next,
        })
    }

    async fn summary(&self, range: Option<&TimeRange>) -> Result<RangeSummary> {
        self.test_connection().await?;
        self.summaries.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read().unwrap_or_else(|p| p.into_inner());
        let mut summary = RangeSummary::default();
        for (_, record) in Self::in_range(&rows, range) {
            summary.count_estimate += 1;
            summary.min_ts = Some(summary.min_ts.map_or(record.changed_at, |m| m.min(record.changed_at)));
            summary.max_ts = Some(summary.max_ts.map_or(record.changed_at, |m| m.max(record.changed_at)));
        }
        Ok(summary)
    }

    async fn count_estimate(&self, range: &TimeRange) -> Result<u64> {
        self.test_connection().await?;
        let rows = self.rows.read().unwrap_or_else(|p| p.into_inner());
        Ok(Self::in_range(&rows, Some(range)).count() as u64)
    }

    async fn entity_estimate(&self, range: &TimeRange) -> Result<u64> {
        self.test_connection().await?;
        let rows = self.rows.read().unwrap_or_else(|p| p.into_inner());
        let entities: HashSet<&str> = Self::in_range(&rows, Some(range))
            .map(|(_, r)| r.entity_id.as_str())
            .collect();
        Ok(entities.len() as u64)
    }
}
