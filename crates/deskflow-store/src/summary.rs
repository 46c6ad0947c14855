//! Aggregate counts backing the ticket summary.

use chrono::{DateTime, Utc};
use deskflow_shared::TicketStatus;
use rusqlite::types::Value;
use rusqlite::params_from_iter;

use crate::database::{encode_ts, Database};
use crate::error::Result;
use crate::models::StatusCounts;

impl Database {
    /// Count tickets created in `[from, until)`, grouped by status.  With
    /// `assigned_id` set, only that user's tickets are counted.
    pub fn count_tickets_by_status(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        assigned_id: Option<i64>,
    ) -> Result<StatusCounts> {
        let mut sql = String::from(
            "SELECT UPPER(status), COUNT(*)
             FROM tickets
             WHERE created_at >= ? AND created_at < ?",
        );
        let mut args = vec![Value::Text(encode_ts(from)), Value::Text(encode_ts(until))];
        if let Some(assigned_id) = assigned_id {
            sql.push_str(" AND assigned_id = ?");
            args.push(Value::Integer(assigned_id));
        }
        sql.push_str(" GROUP BY UPPER(status)");

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, n) = row?;
            let n = n.unsigned_abs();
            counts.total += n;
            match status.parse::<TicketStatus>() {
                Ok(TicketStatus::Open) => counts.open += n,
                Ok(TicketStatus::InProgress) => counts.in_progress += n,
                Ok(TicketStatus::Pending) => counts.pending += n,
                Ok(TicketStatus::Closed) => counts.closed += n,
                Err(_) => tracing::warn!(status = %status, "ticket with unknown status in summary"),
            }
        }
        Ok(counts)
    }
}
