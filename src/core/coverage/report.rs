//! Coverage reports and gap detection
//!
//! Gaps are found only before and after the span the warehouse covers.
//! A hole inside that span (an outage while exports were already running)
//! is not detected.

use crate::adapters::database::traits::RangeSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Where a gap sits relative to the warehouse's covered span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    Before,
    After,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapKind::Before => "before",
            GapKind::After => "after",
        }
    }
}

/// History present in the source but missing from the warehouse
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gap {
    pub kind: GapKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    /// Whole days spanned, rounded down
    pub days: i64,

    /// Prorated from the source's average density; an estimate, not a count
    pub estimated_records: u64,
}

impl Gap {
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// How much of the source's history has reached the warehouse
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub source_range: RangeSummary,
    pub sink_range: RangeSummary,
    pub gaps: Vec<Gap>,

    /// In `[0, 1]`
    pub coverage_fraction: f64,
    pub generated_at: DateTime<Utc>,
}

impl CoverageReport {
    /// Build a report from the two summaries
    pub fn from_summaries(source: RangeSummary, sink: RangeSummary) -> Self {
        Self {
            coverage_fraction: coverage_fraction(&source, &sink),
            gaps: detect_gaps(&source, &sink),
            source_range: source,
            sink_range: sink,
            generated_at: Utc::now(),
        }
    }

    pub fn coverage_percent(&self) -> f64 {
        self.coverage_fraction * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Span and size of the source's retained history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionInfo {
    pub min_ts: Option<DateTime<Utc>>,
    pub max_ts: Option<DateTime<Utc>>,
    pub days: f64,
    pub count_estimate: u64,
}

impl From<RangeSummary> for RetentionInfo {
    fn from(summary: RangeSummary) -> Self {
        Self {
            min_ts: summary.min_ts,
            max_ts: summary.max_ts,
            days: summary.days(),
            count_estimate: summary.count_estimate,
        }
    }
}

/// Share of the source span that the sink span overlaps, in `[0, 1]`
///
/// Below one day of source history the ratio of record counts is used
/// instead. An empty source counts as fully covered; disjoint spans
/// count as uncovered.
pub fn coverage_fraction(source: &RangeSummary, sink: &RangeSummary) -> f64 {
    if source.is_empty() {
        return 1.0;
    }
    let Some((overlap_start, overlap_end)) = overlap(source, sink) else {
        return 0.0;
    };

    let source_days = source.days();
    let fraction = if source_days >= 1.0 {
        (overlap_end - overlap_start).num_seconds() as f64 / SECONDS_PER_DAY / source_days
    } else if source.count_estimate == 0 {
        1.0
    } else {
        sink.count_estimate as f64 / source.count_estimate as f64
    };
    fraction.clamp(0.0, 1.0)
}

/// `[max(mins), min(maxes)]`, or `None` when either side is empty or the
/// spans do not meet
fn overlap(source: &RangeSummary, sink: &RangeSummary) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (source_min, source_max) = source.min_ts.zip(source.max_ts)?;
    let (sink_min, sink_max) = sink.min_ts.zip(sink.max_ts)?;
    let start = source_min.max(sink_min);
    let end = source_max.min(sink_max);
    (start <= end).then_some((start, end))
}

/// Gaps before and after the sink's covered span, in time order
///
/// Gap bounds never leave the source span, so spans that do not meet
/// yield one gap over the whole source.
pub fn detect_gaps(source: &RangeSummary, sink: &RangeSummary) -> Vec<Gap> {
    let (Some(source_min), Some(source_max)) = (source.min_ts, source.max_ts) else {
        return Vec::new();
    };

    let (sink_min, sink_max) = match (sink.min_ts, sink.max_ts) {
        (Some(min), Some(max)) => (min, max),
        _ => {
            return vec![prorated_gap(GapKind::Before, source_min, source_max, source)];
        }
    };

    let mut gaps = Vec::new();
    if source_min < sink_min {
        gaps.push(prorated_gap(
            GapKind::Before,
            source_min,
            sink_min.min(source_max),
            source,
        ));
    }
    if source_max > sink_max {
        gaps.push(prorated_gap(
            GapKind::After,
            sink_max.max(source_min),
            source_max,
            source,
        ));
    }
    gaps
}

fn prorated_gap(
    kind: GapKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    source: &RangeSummary,
) -> Gap {
    let gap_days = (end - start).num_seconds() as f64 / SECONDS_PER_DAY;
    let source_days = source.days();
    let estimated_records = if source_days > 0.0 {
        let density = source.count_estimate as f64 / source_days;
        (density * gap_days).round().min(source.count_estimate as f64) as u64
    } else {
        source.count_estimate
    };

    Gap {
        kind,
        start,
        end,
        days: (end - start).num_days(),
        estimated_records,
    }
}
