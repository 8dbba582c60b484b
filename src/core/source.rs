//! Lazy, keyset-paginated reads from the record source

use crate::adapters::database::traits::{PageCursor, RangeSummary, RecordSource};
use crate::domain::{ExportWindow, RawRecord, Result, StrataError, TimeRange};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;

enum ReadState {
    Start,
    After(PageCursor),
    Done,
}

/// Reads a window page by page
///
/// Only one page is held in memory at a time; the next page is fetched
/// when the consumer drains the current one.
#[derive(Clone)]
pub struct SourceReader {
    source: Arc<dyn RecordSource>,
    page_size: usize,
}

impl SourceReader {
    pub fn new(source: Arc<dyn RecordSource>, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
        }
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.source
    }

    /// Stream the records of `window` ordered by `(changed_at, row id)`
    ///
    /// Calling this again for the same window restarts from the beginning.
    /// A failed page ends the stream with that error.
    pub fn read(&self, window: &ExportWindow) -> BoxStream<'static, Result<RawRecord>> {
        let source = Arc::clone(&self.source);
        let range = window.range();
        let page_size = self.page_size;

        stream::try_unfold(ReadState::Start, move |state| {
            let source = Arc::clone(&source);
            async move {
                let after = match state {
                    ReadState::Done => return Ok::<_, StrataError>(None),
                    ReadState::Start => None,
                    ReadState::After(cursor) => Some(cursor),
                };
                let page = source.fetch_page(&range, after.as_ref(), page_size).await?;
                let next = match page.next {
                    Some(cursor) => ReadState::After(cursor),
                    None => ReadState::Done,
                };
                if page.records.is_empty() && matches!(next, ReadState::Done) {
                    return Ok(None);
                }
                let records = stream::iter(page.records.into_iter().map(Ok::<_, StrataError>));
                Ok(Some((records, next)))
            }
        })
        .try_flatten()
        .boxed()
    }

    /// Summary of all history, or of `range`
    pub async fn summary(&self, range: Option<&TimeRange>) -> Result<RangeSummary> {
        self.source.summary(range).await
    }

    /// Row estimate for `range`
    pub async fn range_estimate(&self, range: &TimeRange) -> Result<u64> {
        self.source.count_estimate(range).await
    }

    /// Row estimate for a window; failures become "unknown"
    pub async fn count_estimate(&self, window: &ExportWindow) -> Option<u64> {
        match self.source.count_estimate(&window.range()).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(window = %window, error = %e, "Window estimate unavailable");
                None
            }
        }
    }

    /// Distinct-entity estimate over `range`
    pub async fn entity_estimate(&self, range: &TimeRange) -> Result<u64> {
        self.source.entity_estimate(range).await
    }
}
