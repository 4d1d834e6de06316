//! # Report Aggregator
//!
//! Read-only sales reports over committed transactions.
//!
//! ## Report Windows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  daily_report(2024-01-15) in Asia/Jakarta (UTC+7)                       │
//! │                                                                         │
//! │   local   2024-01-15 00:00 ─────────────────► 2024-01-16 00:00         │
//! │   UTC     2024-01-14 17:00 ─────────────────► 2024-01-15 17:00         │
//! │           [start                                       end)            │
//! │                                                                         │
//! │  range_report(d1, d2) = [start_of_day(d1), start_of_day(d2 + 1))       │
//! │  range_report(d, d)   covers exactly the window of daily_report(d)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reports read only committed rows and write nothing, so running one twice
//! with no checkout in between gives identical results.

use chrono::{NaiveDate, TimeZone};
use tracing::debug;

use kasir_core::report::summarize;
use kasir_core::{DailyReport, RangeReport, ReportWindow};
use kasir_db::Database;

use crate::error::ReportResult;

/// Builds daily and range reports from the ledger.
#[derive(Debug, Clone)]
pub struct ReportAggregator {
    db: Database,
    top_limit: usize,
}

impl ReportAggregator {
    pub fn new(db: Database, top_limit: usize) -> Self {
        ReportAggregator { db, top_limit }
    }

    /// Totals, top products and the transactions of local day `date` in `tz`.
    pub async fn daily_report_in<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
    ) -> ReportResult<DailyReport> {
        let window = ReportWindow::for_day(date, tz)?;
        let transactions = self.db.ledger().list_in_window(&window).await?;

        debug!(
            %date,
            start = %window.start,
            end = %window.end,
            transactions = transactions.len(),
            "Building daily report"
        );

        Ok(DailyReport::build(date, transactions, self.top_limit)?)
    }

    /// Totals across local days `start_date` through `end_date` inclusive.
    pub async fn range_report_in<Tz: TimeZone>(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        tz: &Tz,
    ) -> ReportResult<RangeReport> {
        let window = ReportWindow::for_range(start_date, end_date, tz)?;
        let headers = self.db.ledger().headers_in_window(&window).await?;
        let summary = summarize(&headers)?;

        debug!(
            %start_date,
            %end_date,
            transactions = summary.transaction_count,
            "Building range report"
        );

        Ok(RangeReport::build(start_date, end_date, &summary)?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
