//! Cost trending over the continuous-aggregate views
//!
//! Reads the rollup matching the requested interval, then assembles
//! gap-filled buckets with per-dimension breakdowns in Rust. The views
//! already exclude `cost_total IS NULL`; nulls are never re-introduced
//! as zeros here.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use sqlx::PgPool;

use crate::core::constants::{DB_READ_TIMEOUT_SECS, TRENDING_BREAKDOWN_TOP_N};
use crate::data::error::DataError;
use crate::data::types::{BucketBreakdown, Trending, TrendingBucket};

/// Valid trending aggregation intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendingInterval {
    Hour,
    Day,
    Week,
}

impl TrendingInterval {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            _ => None,
        }
    }

    /// The continuous aggregate backing this interval
    fn view(&self) -> &'static str {
        match self {
            Self::Hour => "cost_hourly",
            Self::Day => "cost_daily",
            Self::Week => "cost_weekly",
        }
    }

    fn width(&self) -> TimeDelta {
        match self {
            Self::Hour => TimeDelta::hours(1),
            Self::Day => TimeDelta::days(1),
            Self::Week => TimeDelta::weeks(1),
        }
    }

    /// Truncate to the containing bucket using time_bucket's origin
    /// (2000-01-03, a Monday, so week buckets align with TimescaleDB)
    fn align(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let origin = Utc.with_ymd_and_hms(2000, 1, 3, 0, 0, 0).unwrap();
        let width = self.width().num_seconds();
        let offset = (t - origin).num_seconds().div_euclid(width) * width;
        origin + TimeDelta::seconds(offset)
    }
}

/// Valid trending group-by dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendingGroupBy {
    Model,
    Provider,
    Stage,
}

impl TrendingGroupBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "model" => Some(Self::Model),
            "provider" => Some(Self::Provider),
            "stage" => Some(Self::Stage),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Provider => "provider",
            Self::Stage => "stage",
        }
    }
}

/// One (bucket, dimension) rollup as read from a continuous aggregate
#[derive(Debug)]
pub struct TrendRow {
    pub bucket: DateTime<Utc>,
    pub dimension: String,
    pub cost: f64,
    pub request_count: i64,
}

/// Get bucketed cost trending for `[start, end)`
pub async fn get_trending(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: TrendingInterval,
    group_by: TrendingGroupBy,
) -> Result<Trending, DataError> {
    // View and column names come from validated enums, never user input
    let sql = format!(
        r#"
        SELECT
            bucket,
            {col} AS dimension,
            COALESCE(SUM(cost_total), 0) AS cost,
            COALESCE(SUM(span_count), 0)::BIGINT AS request_count
        FROM {view}
        WHERE bucket >= $1 AND bucket < $2
        GROUP BY bucket, {col}
        ORDER BY bucket ASC
        "#,
        col = group_by.column(),
        view = interval.view(),
    );

    let rows = tokio::time::timeout(
        Duration::from_secs(DB_READ_TIMEOUT_SECS),
        sqlx::query_as::<_, (DateTime<Utc>, String, f64, i64)>(&sql)
            .bind(interval.align(start))
            .bind(end)
            .fetch_all(pool),
    )
    .await
    .map_err(|_| DataError::timeout(DB_READ_TIMEOUT_SECS))??;

    let rows = rows
        .into_iter()
        .map(|(bucket, dimension, cost, request_count)| TrendRow {
            bucket,
            dimension,
            cost,
            request_count,
        })
        .collect();

    Ok(build_trending(start, end, interval, rows))
}

/// Assemble the bucket list, emitting every bucket inside the window even
/// when it has no costed spans.
pub fn build_trending(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: TrendingInterval,
    rows: Vec<TrendRow>,
) -> Trending {
    let mut by_bucket: BTreeMap<DateTime<Utc>, Vec<TrendRow>> = BTreeMap::new();
    for row in rows {
        by_bucket.entry(row.bucket).or_default().push(row);
    }

    let width = interval.width();
    let mut buckets = Vec::new();
    let mut bucket_ts = interval.align(start);
    while bucket_ts < end {
        let entries = by_bucket.remove(&bucket_ts).unwrap_or_default();
        buckets.push(assemble_bucket(bucket_ts, entries));
        bucket_ts += width;
    }

    Trending { buckets }
}

fn assemble_bucket(timestamp: DateTime<Utc>, entries: Vec<TrendRow>) -> TrendingBucket {
    let total_cost: f64 = entries.iter().map(|e| e.cost).sum();
    let request_count: i64 = entries.iter().map(|e| e.request_count).sum();
    let avg_cost_per_request = if request_count > 0 {
        total_cost / request_count as f64
    } else {
        0.0
    };

    let mut breakdown: Vec<BucketBreakdown> = entries
        .into_iter()
        .map(|e| BucketBreakdown {
            percentage: percentage_of(e.cost, total_cost),
            key: e.dimension,
            cost: e.cost,
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.cost
            .partial_cmp(&a.cost)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });

    if breakdown.len() > TRENDING_BREAKDOWN_TOP_N {
        let rest: Vec<BucketBreakdown> = breakdown.split_off(TRENDING_BREAKDOWN_TOP_N);
        let other_cost: f64 = rest.iter().map(|b| b.cost).sum();
        breakdown.push(BucketBreakdown {
            key: "other".to_string(),
            cost: other_cost,
            percentage: percentage_of(other_cost, total_cost),
        });
    }

    TrendingBucket {
        timestamp,
        total_cost,
        request_count,
        avg_cost_per_request,
        breakdown,
    }
}

/// Share of `total`, as a percentage rounded to one decimal
fn percentage_of(cost: f64, total: f64) -> f64 {
    if total > 0.0 {
        (cost / total * 1000.0).round() / 10.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, minute, 0).unwrap()
    }

    fn trend_row(bucket: DateTime<Utc>, dim: &str, cost: f64, count: i64) -> TrendRow {
        TrendRow {
            bucket,
            dimension: dim.to_string(),
            cost,
            request_count: count,
        }
    }

    #[test]
    fn test_hour_alignment() {
        assert_eq!(TrendingInterval::Hour.align(ts(10, 35)), ts(10, 0));
    }

    #[test]
    fn test_day_alignment() {
        let aligned = TrendingInterval::Day.align(ts(10, 35));
        assert_eq!(aligned, Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_week_alignment_is_monday() {
        // 2025-06-04 is a Wednesday; the containing week bucket starts
        // Monday 2025-06-02 (time_bucket origin 2000-01-03 is a Monday)
        let wednesday = Utc.with_ymd_and_hms(2025, 6, 4, 13, 0, 0).unwrap();
        let aligned = TrendingInterval::Week.align(wednesday);
        assert_eq!(aligned, Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_single_bucket_even_split() {
        let rows = vec![
            trend_row(ts(10, 0), "model-a", 0.05, 5),
            trend_row(ts(10, 0), "model-b", 0.05, 5),
        ];
        let trending = build_trending(ts(10, 0), ts(11, 0), TrendingInterval::Hour, rows);

        assert_eq!(trending.buckets.len(), 1);
        let bucket = &trending.buckets[0];
        assert_eq!(bucket.timestamp, ts(10, 0));
        assert!((bucket.total_cost - 0.10).abs() < 1e-12);
        assert_eq!(bucket.request_count, 10);
        assert!((bucket.avg_cost_per_request - 0.01).abs() < 1e-12);
        assert_eq!(bucket.breakdown.len(), 2);
        assert_eq!(bucket.breakdown[0].key, "model-a");
        assert_eq!(bucket.breakdown[0].percentage, 50.0);
        assert_eq!(bucket.breakdown[1].key, "model-b");
        assert_eq!(bucket.breakdown[1].percentage, 50.0);
    }

    #[test]
    fn test_empty_buckets_are_emitted() {
        let rows = vec![trend_row(ts(11, 0), "model-a", 0.02, 2)];
        let trending = build_trending(ts(10, 0), ts(13, 0), TrendingInterval::Hour, rows);

        assert_eq!(trending.buckets.len(), 3);
        assert_eq!(trending.buckets[0].total_cost, 0.0);
        assert_eq!(trending.buckets[0].request_count, 0);
        assert!(trending.buckets[0].breakdown.is_empty());
        assert_eq!(trending.buckets[1].total_cost, 0.02);
        assert_eq!(trending.buckets[2].request_count, 0);
    }

    #[test]
    fn test_breakdown_sorted_by_cost_desc() {
        let rows = vec![
            trend_row(ts(10, 0), "cheap", 0.01, 1),
            trend_row(ts(10, 0), "expensive", 0.09, 1),
        ];
        let trending = build_trending(ts(10, 0), ts(11, 0), TrendingInterval::Hour, rows);
        let bucket = &trending.buckets[0];
        assert_eq!(bucket.breakdown[0].key, "expensive");
        assert_eq!(bucket.breakdown[0].percentage, 90.0);
        assert_eq!(bucket.breakdown[1].percentage, 10.0);
    }

    #[test]
    fn test_breakdown_truncated_to_top_20_plus_other() {
        let rows: Vec<TrendRow> = (0..25)
            .map(|i| trend_row(ts(10, 0), &format!("model-{:02}", i), (25 - i) as f64, 1))
            .collect();
        let trending = build_trending(ts(10, 0), ts(11, 0), TrendingInterval::Hour, rows);
        let bucket = &trending.buckets[0];

        assert_eq!(bucket.breakdown.len(), 21);
        assert_eq!(bucket.breakdown[20].key, "other");
        // model-20..model-24 carry costs 5+4+3+2+1
        assert_eq!(bucket.breakdown[20].cost, 15.0);
        assert_eq!(bucket.breakdown[0].key, "model-00");
    }

    #[test]
    fn test_percentage_rounded_to_one_decimal() {
        let rows = vec![
            trend_row(ts(10, 0), "a", 1.0, 1),
            trend_row(ts(10, 0), "b", 1.0, 1),
            trend_row(ts(10, 0), "c", 1.0, 1),
        ];
        let trending = build_trending(ts(10, 0), ts(11, 0), TrendingInterval::Hour, rows);
        for entry in &trending.buckets[0].breakdown {
            assert_eq!(entry.percentage, 33.3);
        }
    }

    #[test]
    fn test_zero_requests_zero_average() {
        let trending = build_trending(ts(10, 0), ts(11, 0), TrendingInterval::Hour, vec![]);
        assert_eq!(trending.buckets[0].avg_cost_per_request, 0.0);
    }

    #[test]
    fn test_interval_and_group_by_parsing() {
        assert_eq!(TrendingInterval::parse("hour"), Some(TrendingInterval::Hour));
        assert_eq!(TrendingInterval::parse("week"), Some(TrendingInterval::Week));
        assert_eq!(TrendingInterval::parse("month"), None);
        assert_eq!(TrendingGroupBy::parse("model"), Some(TrendingGroupBy::Model));
        assert_eq!(TrendingGroupBy::parse("stage"), Some(TrendingGroupBy::Stage));
        assert_eq!(TrendingGroupBy::parse("user"), None);
    }
}
