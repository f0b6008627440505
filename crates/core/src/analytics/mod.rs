//! Analytics aggregator for the admin dashboard.
//!
//! A query range is turned into a [`ChartAxis`]: a granularity picked from
//! the span of the range and the complete, ordered list of buckets covering
//! it. Events are then folded into those buckets through a keyed lookup.
//! Buckets with no events stay in the series with a zero value.

pub mod range;

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderSale, OrderTotals};
use crate::domain::user::UserSignup;
use crate::format::{cents_to_major, format_date, format_month, format_year};

pub use range::{RangeOption, RangePreset, TimeRange};

/// Each resolution is used only while the range spans fewer than this many of its units.
pub const GRANULARITY_THRESHOLD: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Granularity {
    /// Cascade from the finest resolution to the coarsest.
    pub fn select(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if whole_days_between(start, end) < GRANULARITY_THRESHOLD {
            return Self::Daily;
        }
        if whole_weeks_between(start, end) < GRANULARITY_THRESHOLD {
            return Self::Weekly;
        }
        if whole_months_between(start, end) < GRANULARITY_THRESHOLD {
            return Self::Monthly;
        }
        Self::Yearly
    }

    /// First calendar day of the bucket containing `date`. Weeks start on Sunday.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => date,
            Self::Weekly => {
                date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
            }
            Self::Monthly => date.with_day(1).unwrap_or(date),
            Self::Yearly => date.with_ordinal(1).unwrap_or(date),
        }
    }

    fn next_bucket(&self, bucket_start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Daily => bucket_start.succ_opt(),
            Self::Weekly => bucket_start.checked_add_signed(Duration::days(7)),
            Self::Monthly => {
                let (year, month) = if bucket_start.month() == 12 {
                    (bucket_start.year() + 1, 1)
                } else {
                    (bucket_start.year(), bucket_start.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
            }
            Self::Yearly => NaiveDate::from_ymd_opt(bucket_start.year() + 1, 1, 1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub start: NaiveDate,
    pub label: String,
}

/// The ordered bucket skeleton for one chart query.
#[derive(Clone, Debug)]
pub struct ChartAxis {
    granularity: Granularity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    buckets: Vec<Bucket>,
    index: HashMap<NaiveDate, usize>,
}

impl ChartAxis {
    /// Builds the skeleton for `[start, end]`. A reversed range is swapped.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        let granularity = Granularity::select(start, end);
        let last_day = end.date_naive();

        let mut buckets = Vec::new();
        let mut cursor = Some(granularity.bucket_start(start.date_naive()));
        while let Some(bucket_start) = cursor.filter(|day| *day <= last_day) {
            buckets.push(Bucket {
                start: bucket_start,
                label: label_for(granularity, bucket_start, start, end),
            });
            cursor = granularity.next_bucket(bucket_start);
        }

        let index =
            buckets.iter().enumerate().map(|(position, bucket)| (bucket.start, position)).collect();

        Self { granularity, start, end, buckets, index }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Position of the bucket an event at `at` falls in, if the axis has one.
    pub fn position_of(&self, at: DateTime<Utc>) -> Option<usize> {
        let key = self.granularity.bucket_start(at.date_naive());
        self.index.get(&key).copied()
    }

    /// Folds `events` into a zero-initialised series.
    pub fn aggregate<E, V, T, F>(&self, events: &[E], timestamp: T, mut accumulate: F) -> Series<V>
    where
        V: Default + Clone,
        T: Fn(&E) -> DateTime<Utc>,
        F: FnMut(&mut V, &E),
    {
        let mut values = vec![V::default(); self.buckets.len()];
        let mut dropped_events = 0;

        for event in events {
            match self.position_of(timestamp(event)) {
                Some(position) => accumulate(&mut values[position], event),
                None => dropped_events += 1,
            }
        }

        let points = self
            .buckets
            .iter()
            .zip(values)
            .map(|(bucket, value)| SeriesPoint { date: bucket.label.clone(), value })
            .collect();

        Series { granularity: self.granularity, points, dropped_events }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint<V> {
    pub date: String,
    pub value: V,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series<V> {
    pub granularity: Granularity,
    pub points: Vec<SeriesPoint<V>>,
    /// Events whose bucket is not on the axis.
    pub dropped_events: usize,
}

/// Resolves open range bounds. An open start falls back to the start of day of
/// the earliest event, or `now` when there are none; an open end falls back to `now`.
pub fn resolve_bounds(
    range: &TimeRange,
    earliest_event: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = range
        .start
        .or_else(|| earliest_event.map(start_of_day))
        .unwrap_or(now);
    let end = range.end.unwrap_or(now);
    (start, end)
}

/// Sales per bucket in major currency units. `sales` is the range-filtered
/// set, ordered by creation time.
pub fn sales_series(range: &TimeRange, sales: &[OrderSale], now: DateTime<Utc>) -> Series<Decimal> {
    let earliest = sales.iter().map(|sale| sale.created_at).min();
    let (start, end) = resolve_bounds(range, earliest, now);

    ChartAxis::new(start, end).aggregate(sales, |sale| sale.created_at, |total, sale| {
        *total += cents_to_major(sale.price_paid_in_cents);
    })
}

/// New users per bucket.
pub fn signup_series(range: &TimeRange, signups: &[UserSignup], now: DateTime<Utc>) -> Series<u64> {
    let earliest = signups.iter().map(|signup| signup.created_at).min();
    let (start, end) = resolve_bounds(range, earliest, now);

    ChartAxis::new(start, end).aggregate(signups, |signup| signup.created_at, |count, _| {
        *count += 1;
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub amount: Decimal,
    pub number_of_sales: i64,
}

pub fn sales_summary(totals: OrderTotals) -> SalesSummary {
    SalesSummary { amount: cents_to_major(totals.sum_in_cents), number_of_sales: totals.count }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub user_count: i64,
    pub average_value_per_user: Decimal,
}

/// Average order value per user; zero when there are no users.
pub fn customer_summary(user_count: i64, total_order_cents: i64) -> CustomerSummary {
    let average_value_per_user = if user_count == 0 {
        Decimal::ZERO
    } else {
        cents_to_major(total_order_cents) / Decimal::from(user_count)
    };
    CustomerSummary { user_count, average_value_per_user }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSales {
    pub name: String,
    pub paid_in_cents: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRevenue {
    pub name: String,
    pub revenue: Decimal,
}

/// Revenue per product in major units, omitting products that earned nothing.
pub fn revenue_by_product(products: &[ProductSales]) -> Vec<ProductRevenue> {
    products
        .iter()
        .map(|product| ProductRevenue {
            name: product.name.clone(),
            revenue: product.paid_in_cents.iter().copied().map(cents_to_major).sum(),
        })
        .filter(|product| product.revenue > Decimal::ZERO)
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCounts {
    pub active_count: i64,
    pub inactive_count: i64,
}

pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn label_for(
    granularity: Granularity,
    bucket_start: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    match granularity {
        Granularity::Daily => format_date(bucket_start),
        Granularity::Weekly => {
            let week_end = bucket_start + Duration::days(6);
            let shown_start = bucket_start.max(start.date_naive());
            let shown_end = week_end.min(end.date_naive());
            format!("{} - {}", format_date(shown_start), format_date(shown_end))
        }
        Granularity::Monthly => format_month(bucket_start),
        Granularity::Yearly => format_year(bucket_start),
    }
}

fn whole_days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_days()
}

fn whole_weeks_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    whole_days_between(start, end) / 7
}

/// Calendar months from `start` to `end`, not counting a final partial month.
fn whole_months_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    if end < start {
        return -whole_months_between(end, start);
    }

    let mut months = i64::from(end.year() - start.year()) * 12 + i64::from(end.month())
        - i64::from(start.month());
    if months > 0 && (end.day(), end.time()) < (start.day(), start.time()) {
        months -= 1;
    }
    months
}
