//! # Report Aggregation
//!
//! Pure read-side math over committed transactions: report windows,
//! sales summaries and top-product rankings.
//!
//! ## Report Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Report Flow                                    │
//! │                                                                         │
//! │  date (local)  ──► ReportWindow::for_day(date, tz)                     │
//! │                         [midnight, next midnight)  in UTC               │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                   ledger.list_in_window(window)   (kasir-db)            │
//! │                              │                                          │
//! │                              ▼                                          │
//! │        ┌─────────────────────┴─────────────────────┐                    │
//! │        ▼                                           ▼                    │
//! │   summarize(txns)                        top_products(txns, 10)         │
//! │   total, count, items, average           group by product id            │
//! │        │                                 stable sort by qty desc        │
//! │        └─────────────────────┬─────────────────────┘                    │
//! │                              ▼                                          │
//! │                    DailyReport / RangeReport                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Local Days
//! A day is `[start_of_day(d), start_of_day(d + 1))`. Where local midnight is
//! skipped by a DST jump the day starts at the first valid local instant
//! after it; where midnight occurs twice the earliest occurrence wins. A day
//! may therefore be 23 or 25 hours long, but consecutive days always tile
//! the timeline with no gap or overlap.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::Transaction;

/// Longest stretch of local time a DST transition is searched across.
const MAX_GAP_MINUTES: i64 = 24 * 60;

// =============================================================================
// Report Window
// =============================================================================

/// A half-open time window `[start, end)` expressed in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    /// The local calendar day `date` in time zone `tz`.
    ///
    /// ## Example
    /// ```rust
    /// use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
    /// use kasir_core::ReportWindow;
    ///
    /// let jakarta = FixedOffset::east_opt(7 * 3600).unwrap();
    /// let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    /// let window = ReportWindow::for_day(day, &jakarta).unwrap();
    ///
    /// assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 14, 17, 0, 0).unwrap());
    /// assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 1, 15, 17, 0, 0).unwrap());
    /// ```
    pub fn for_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> CoreResult<Self> {
        Self::for_range(date, date, tz)
    }

    /// Every local calendar day from `start_date` through `end_date`, inclusive.
    pub fn for_range<Tz: TimeZone>(
        start_date: NaiveDate,
        end_date: NaiveDate,
        tz: &Tz,
    ) -> CoreResult<Self> {
        if start_date > end_date {
            return Err(CoreError::InvalidRange {
                start: start_date,
                end: end_date,
            });
        }

        let next_day = end_date
            .succ_opt()
            .ok_or(CoreError::UnresolvableDay { date: end_date })?;

        Ok(ReportWindow {
            start: start_of_day(start_date, tz)?,
            end: start_of_day(next_day, tz)?,
        })
    }

    /// Checks whether `at` falls inside the window.
    #[inline]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// First instant of the local calendar day `date`, as UTC.
pub fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> CoreResult<DateTime<Utc>> {
    let mut probe = date
        .and_hms_opt(0, 0, 0)
        .ok_or(CoreError::UnresolvableDay { date })?;

    for _ in 0..=MAX_GAP_MINUTES {
        if let Some(instant) = tz.from_local_datetime(&probe).earliest() {
            return Ok(instant.with_timezone(&Utc));
        }
        probe = probe
            .checked_add_signed(Duration::minutes(1))
            .ok_or(CoreError::UnresolvableDay { date })?;
    }

    Err(CoreError::UnresolvableDay { date })
}

/// Number of calendar dates from `start` through `end`, inclusive.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> CoreResult<i64> {
    if start > end {
        return Err(CoreError::InvalidRange { start, end });
    }
    Ok(end.signed_duration_since(start).num_days() + 1)
}

// =============================================================================
// Aggregates
// =============================================================================

/// Headline numbers of a set of transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub total_sales: Money,
    pub transaction_count: i64,
    pub items_sold: i64,
    /// `total_sales / transaction_count`, zero when there are no sales.
    pub average_transaction_value: Money,
}

/// A product's share of the sales in a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_id: i64,
    /// Name from the first snapshot seen in the window.
    pub product_name: String,
    pub quantity_sold: i64,
    pub revenue: Money,
}

/// Totals over the transaction headers; items are not needed.
pub fn summarize(transactions: &[Transaction]) -> CoreResult<SalesSummary> {
    let mut total_sales = Money::zero();
    let mut items_sold: i64 = 0;

    for txn in transactions {
        total_sales = total_sales
            .checked_add(txn.total_amount)
            .ok_or(CoreError::AmountOverflow { context: "total sales" })?;
        items_sold = items_sold
            .checked_add(txn.item_count)
            .ok_or(CoreError::AmountOverflow { context: "items sold" })?;
    }

    let transaction_count = transactions.len() as i64;

    Ok(SalesSummary {
        total_sales,
        transaction_count,
        items_sold,
        average_transaction_value: total_sales.divide_rounded(transaction_count),
    })
}

/// Ranks products by quantity sold, highest first, keeping at most `limit`.
///
/// Products are grouped by id in the order first encountered; the sort is
/// stable, so ties keep that order.
pub fn top_products(transactions: &[Transaction], limit: usize) -> CoreResult<Vec<TopProduct>> {
    let mut ranking: Vec<TopProduct> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();

    for item in transactions.iter().flat_map(|txn| txn.items.iter()) {
        let slot = *index.entry(item.product_id).or_insert_with(|| {
            ranking.push(TopProduct {
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                quantity_sold: 0,
                revenue: Money::zero(),
            });
            ranking.len() - 1
        });

        let entry = &mut ranking[slot];
        entry.quantity_sold = entry
            .quantity_sold
            .checked_add(item.quantity)
            .ok_or(CoreError::AmountOverflow { context: "quantity sold" })?;
        entry.revenue = entry
            .revenue
            .checked_add(item.subtotal)
            .ok_or(CoreError::AmountOverflow { context: "revenue" })?;
    }

    ranking.sort_by(|a, b| b.quantity_sold.cmp(&a.quantity_sold));
    ranking.truncate(limit);
    Ok(ranking)
}

// =============================================================================
// Reports
// =============================================================================

/// Sales for one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: NaiveDate,
    pub summary: SalesSummary,
    pub top_products: Vec<TopProduct>,
    /// The day's transactions, oldest first, with their items.
    pub transactions: Vec<Transaction>,
}

impl DailyReport {
    pub fn build(
        date: NaiveDate,
        transactions: Vec<Transaction>,
        top_limit: usize,
    ) -> CoreResult<Self> {
        Ok(DailyReport {
            date,
            summary: summarize(&transactions)?,
            top_products: top_products(&transactions, top_limit)?,
            transactions,
        })
    }
}

/// Sales across an inclusive range of local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_sales: Money,
    pub transaction_count: i64,
    /// `total_sales / days`, rounded half away from zero.
    pub average_daily: Money,
}

impl RangeReport {
    pub fn build(
        start_date: NaiveDate,
        end_date: NaiveDate,
        summary: &SalesSummary,
    ) -> CoreResult<Self> {
        let days = days_in_range(start_date, end_date)?.max(1);

        Ok(RangeReport {
            start_date,
            end_date,
            total_sales: summary.total_sales,
            transaction_count: summary.transaction_count,
            average_daily: summary.total_sales.divide_rounded(days),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionItem;
    use chrono::{FixedOffset, LocalResult, NaiveDateTime};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn txn(id: i64, lines: &[(i64, &str, i64, i64)]) -> Transaction {
        let items: Vec<TransactionItem> = lines
            .iter()
            .enumerate()
            .map(|(n, (product_id, name, qty, price))| TransactionItem {
                transaction_id: id,
                line_no: n as i64 + 1,
                product_id: *product_id,
                product_name: name.to_string(),
                quantity: *qty,
                price_per_unit: Money::from_minor(*price),
                subtotal: Money::from_minor(price * qty),
            })
            .collect();

        Transaction {
            id,
            created_at: Utc::now(),
            total_amount: items.iter().map(|i| i.subtotal).sum(),
            item_count: items.iter().map(|i| i.quantity).sum(),
            idempotency_key: None,
            items,
        }
    }

    /// A zone with one offset change at `transition` (UTC).
    #[derive(Debug, Clone)]
    struct ShiftZone {
        transition: NaiveDateTime,
        before: FixedOffset,
        after: FixedOffset,
    }

    impl ShiftZone {
        fn valid_with(&self, local: &NaiveDateTime, offset: FixedOffset) -> bool {
            let as_utc = *local - Duration::seconds(offset.local_minus_utc() as i64);
            if offset == self.before {
                as_utc < self.transition
            } else {
                as_utc >= self.transition
            }
        }
    }

    impl TimeZone for ShiftZone {
        type Offset = FixedOffset;

        fn from_offset(offset: &FixedOffset) -> Self {
            ShiftZone {
                transition: NaiveDateTime::MIN,
                before: *offset,
                after: *offset,
            }
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            match (
                self.valid_with(local, self.before),
                self.valid_with(local, self.after),
            ) {
                (true, true) if self.before != self.after => {
                    LocalResult::Ambiguous(self.before, self.after)
                }
                (true, _) => LocalResult::Single(self.before),
                (false, true) => LocalResult::Single(self.after),
                (false, false) => LocalResult::None,
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < self.transition {
                self.before
            } else {
                self.after
            }
        }
    }

    fn hours(h: i32) -> FixedOffset {
        FixedOffset::east_opt(h * 3600).unwrap()
    }

    #[test]
    fn test_day_window_in_utc() {
        let window = ReportWindow::for_day(date(2024, 1, 15), &Utc).unwrap();
        assert_eq!(window.start, utc(2024, 1, 15, 0, 0));
        assert_eq!(window.end, utc(2024, 1, 16, 0, 0));
        assert!(window.contains(utc(2024, 1, 15, 23, 59)));
        assert!(!window.contains(utc(2024, 1, 16, 0, 0)));
    }

    #[test]
    fn test_range_window_spans_inclusive_days() {
        let tz = hours(7);
        let window = ReportWindow::for_range(date(2024, 1, 1), date(2024, 1, 31), &tz).unwrap();
        assert_eq!(window.start, utc(2023, 12, 31, 17, 0));
        assert_eq!(window.end, utc(2024, 1, 31, 17, 0));
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let err = ReportWindow::for_range(date(2024, 2, 1), date(2024, 1, 1), &Utc).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRange { .. }));
        assert!(days_in_range(date(2024, 2, 1), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_skipped_midnight_starts_at_first_valid_instant() {
        // Clocks jump 00:00 → 01:00 local on 2024-03-31.
        let zone = ShiftZone {
            transition: utc(2024, 3, 31, 0, 0).naive_utc(),
            before: hours(0),
            after: hours(1),
        };

        let gap_day = ReportWindow::for_day(date(2024, 3, 31), &zone).unwrap();
        let day_before = ReportWindow::for_day(date(2024, 3, 30), &zone).unwrap();

        assert_eq!(gap_day.start, utc(2024, 3, 31, 0, 0));
        assert_eq!(gap_day.end, utc(2024, 3, 31, 23, 0));
        assert_eq!(day_before.end, gap_day.start);
    }

    #[test]
    fn test_repeated_midnight_uses_earliest() {
        // Clocks fall back 01:00 → 00:00 local on 2024-10-27.
        let zone = ShiftZone {
            transition: utc(2024, 10, 27, 0, 0).naive_utc(),
            before: hours(1),
            after: hours(0),
        };

        let window = ReportWindow::for_day(date(2024, 10, 27), &zone).unwrap();
        assert_eq!(window.start, utc(2024, 10, 26, 23, 0));
        assert_eq!(window.end, utc(2024, 10, 28, 0, 0));
        assert_eq!(window.end - window.start, Duration::hours(25));
    }

    #[test]
    fn test_summary_of_nothing_is_zero() {
        assert_eq!(summarize(&[]).unwrap(), SalesSummary::default());
    }

    #[test]
    fn test_summary_and_average() {
        let txns = vec![
            txn(1, &[(1, "Indomie Goreng", 2, 3500), (2, "Chitato BBQ", 1, 8000)]),
            txn(2, &[(1, "Indomie Goreng", 1, 3500)]),
        ];
        let summary = summarize(&txns).unwrap();
        assert_eq!(summary.total_sales, Money::from_minor(18500));
        assert_eq!(summary.transaction_count, 2);
        assert_eq!(summary.items_sold, 4);
        assert_eq!(summary.average_transaction_value, Money::from_minor(9250));
    }

    #[test]
    fn test_top_products_rank_and_snapshot_name() {
        let txns = vec![
            txn(1, &[(2, "Chitato BBQ", 1, 8000), (1, "Indomie Goreng", 2, 3500)]),
            txn(2, &[(1, "Indomie Goreng Jumbo", 3, 4000), (3, "Aqua 600ml", 1, 4000)]),
        ];
        let top = top_products(&txns, 10).unwrap();

        assert_eq!(top[0].product_id, 1);
        assert_eq!(top[0].product_name, "Indomie Goreng");
        assert_eq!(top[0].quantity_sold, 5);
        assert_eq!(top[0].revenue, Money::from_minor(19000));
        // Equal quantities keep first-seen order
        assert_eq!(top[1].product_id, 2);
        assert_eq!(top[2].product_id, 3);

        assert_eq!(top_products(&txns, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_range_report_average_daily() {
        let summary = SalesSummary {
            total_sales: Money::from_minor(1000),
            transaction_count: 4,
            items_sold: 4,
            average_transaction_value: Money::from_minor(250),
        };
        let report = RangeReport::build(date(2024, 1, 1), date(2024, 1, 3), &summary).unwrap();
        assert_eq!(report.average_daily, Money::from_minor(333));

        let single = RangeReport::build(date(2024, 1, 1), date(2024, 1, 1), &summary).unwrap();
        assert_eq!(single.average_daily, summary.total_sales);
    }

    #[test]
    fn test_daily_report_json_shape() {
        let report =
            DailyReport::build(date(2024, 1, 15), vec![txn(1, &[(1, "Aqua", 1, 4000)])], 10)
                .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["date"], "2024-01-15");
        assert_eq!(json["summary"]["totalSales"], 4000);
        assert_eq!(json["topProducts"][0]["quantitySold"], 1);
        assert_eq!(json["transactions"][0]["id"], 1);
    }

    proptest! {
        /// Every sold unit and every unit of revenue lands in exactly one ranking entry.
        #[test]
        fn ranking_conserves_quantity_and_revenue(
            carts in prop::collection::vec(
                prop::collection::vec((1i64..8, 1i64..20, 0i64..10_000), 1..6),
                0..20,
            )
        ) {
            let txns: Vec<Transaction> = carts
                .iter()
                .enumerate()
                .map(|(n, lines)| {
                    let lines: Vec<(i64, &str, i64, i64)> =
                        lines.iter().map(|(p, q, price)| (*p, "x", *q, *price)).collect();
                    txn(n as i64 + 1, &lines)
                })
                .collect();

            let summary = summarize(&txns).unwrap();
            let ranking = top_products(&txns, usize::MAX).unwrap();

            let qty: i64 = ranking.iter().map(|t| t.quantity_sold).sum();
            let revenue: Money = ranking.iter().map(|t| t.revenue).sum();
            prop_assert_eq!(qty, summary.items_sold);
            prop_assert_eq!(revenue, summary.total_sales);
            prop_assert!(ranking.windows(2).all(|w| w[0].quantity_sold >= w[1].quantity_sold));
        }
    }
}
