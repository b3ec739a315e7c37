//! Interval algebra over time spans
//!
//! Sleep stages and heart-rate windows routinely overlap when several devices
//! record the same period. Every duration in this crate that sums time ranges
//! goes through [`IntervalMerger`] first so no instant is counted twice.

use crate::models::TimeSpan;

/// Merges overlapping or touching spans into a disjoint, sorted set
pub struct IntervalMerger;

impl IntervalMerger {
    /// Merge spans in any order into disjoint spans sorted by start.
    ///
    /// Spans that touch (`next.start == current.end`) are joined, so
    /// `[0,10]` and `[10,20]` become `[0,20]`.
    pub fn merge(spans: &[TimeSpan]) -> Vec<TimeSpan> {
        let mut sorted: Vec<TimeSpan> = spans.to_vec();
        sorted.sort_by_key(|span| span.start);

        let mut merged: Vec<TimeSpan> = Vec::with_capacity(sorted.len());
        for span in sorted {
            match merged.last_mut() {
                Some(current) if span.start <= current.end => {
                    if span.end > current.end {
                        current.end = span.end;
                    }
                }
                _ => merged.push(span),
            }
        }

        merged
    }

    /// Total covered time in seconds, counting overlaps once
    pub fn total_duration(spans: &[TimeSpan]) -> f64 {
        Self::merge(spans)
            .iter()
            .map(TimeSpan::duration_seconds)
            .sum()
    }

    /// Sum of raw span durations, overlaps included
    pub fn raw_duration(spans: &[TimeSpan]) -> f64 {
        spans.iter().map(TimeSpan::duration_seconds).sum()
    }
}
