//! Ticket counts for the current calendar month against the one before it.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use deskflow_shared::Caller;
use deskflow_store::StatusCounts;
use serde::Serialize;
use tracing::debug;

use super::tickets::{visible_assignee, TicketService};
use crate::error::ServiceError;

/// One bucket compared across two periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Trend {
    pub current: u64,
    pub previous: u64,
    /// `current - previous`.
    pub delta: i64,
    /// `|delta|`.
    pub difference: u64,
    /// `"+"`, `"-"` or `""`.
    pub indicator: &'static str,
}

impl Trend {
    pub fn between(current: u64, previous: u64) -> Self {
        let indicator = match current.cmp(&previous) {
            Ordering::Greater => "+",
            Ordering::Less => "-",
            Ordering::Equal => "",
        };
        let difference = current.abs_diff(previous);
        let delta = i64::try_from(difference).unwrap_or(i64::MAX);
        Self {
            current,
            previous,
            delta: if current < previous { -delta } else { delta },
            difference,
            indicator,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketSummary {
    pub period_start: DateTime<Utc>,
    pub previous_period_start: DateTime<Utc>,
    /// Every ticket created in the period, whatever its status.
    pub new: Trend,
    pub open: Trend,
    /// "In Progress" plus "Pending".
    pub in_progress: Trend,
    pub closed: Trend,
}

impl TicketSummary {
    fn from_counts(
        period_start: DateTime<Utc>,
        previous_period_start: DateTime<Utc>,
        current: StatusCounts,
        previous: StatusCounts,
    ) -> Self {
        Self {
            period_start,
            previous_period_start,
            new: Trend::between(current.total, previous.total),
            open: Trend::between(current.open, previous.open),
            in_progress: Trend::between(
                current.in_progress + current.pending,
                previous.in_progress + previous.pending,
            ),
            closed: Trend::between(current.closed, previous.closed),
        }
    }
}

/// `[previous month start, this month start, next month start)` around `now`.
pub(crate) fn month_windows(
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>, DateTime<Utc>), ServiceError> {
    let (year, month) = (now.year(), now.month());
    let (prev_year, prev_month) = if month == 1 { (year - 1, 12) } else { (year, month - 1) };
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };

    let start_of = |y: i32, m: u32| {
        NaiveDate::from_ymd_opt(y, m, 1)
            .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
            .ok_or_else(|| ServiceError::Internal(format!("no first day for {y}-{m}")))
    };

    Ok((
        start_of(prev_year, prev_month)?,
        start_of(year, month)?,
        start_of(next_year, next_month)?,
    ))
}

impl TicketService {
    /// Counts for this month and last month, scoped to the caller's own
    /// tickets unless their role sees everything.
    pub async fn get_ticket_summary(&self, caller: Caller) -> Result<TicketSummary, ServiceError> {
        let (previous_start, current_start, next_start) = month_windows(self.clock().now())?;
        let assigned_id = visible_assignee(caller, None);

        let (current, previous) = self
            .store()
            .call("ticket", move |db, _| {
                let current = db.count_tickets_by_status(current_start, next_start, assigned_id)?;
                let previous =
                    db.count_tickets_by_status(previous_start, current_start, assigned_id)?;
                Ok((current, previous))
            })
            .await?;

        debug!(
            user_id = caller.user_id,
            current = current.total,
            previous = previous.total,
            "Ticket summary computed"
        );
        Ok(TicketSummary::from_counts(
            current_start,
            previous_start,
            current,
            previous,
        ))
    }
}
