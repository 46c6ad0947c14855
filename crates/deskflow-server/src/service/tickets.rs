use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deskflow_shared::constants::SEED_ACTIVITY_DESCRIPTION;
use deskflow_shared::{Caller, Clock, TicketStatus, TicketType};
use deskflow_store::{
    NewActivity, NewDocument, NewTicket, Ticket, TicketChanges, TicketFilter,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{audit, check_uploads, non_blank, Store};
use crate::error::ServiceError;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Fields of the ticket creation form.  Everything arrives as text.
#[derive(Debug, Clone, Default)]
pub struct TicketForm {
    pub ticket_type: String,
    pub subject: String,
    /// Raw JSON; blank means `{}`.
    pub content: Option<String>,
    pub reporter_id: Option<String>,
    pub assigned_id: Option<String>,
    pub priority: String,
    pub status: Option<String>,
    pub report_date: Option<String>,
    /// Description of the seed activity.
    pub description: Option<String>,
    pub documents: Vec<NewDocument>,
}

/// JSON body of a ticket update.  Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketUpdate {
    pub ticket_type: Option<String>,
    pub subject: Option<String>,
    pub content: Option<Value>,
    pub reporter_id: Option<i64>,
    pub assigned_id: Option<i64>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub report_date: Option<String>,
}

/// Query string of the ticket listing.  Blank values are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketQuery {
    pub ticket_type: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub report_start_date: Option<String>,
    pub report_end_date: Option<String>,
    pub terms: Option<String>,
    pub assigned_id: Option<String>,
    pub reporter_id: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TicketService {
    store: Store,
    clock: Arc<dyn Clock>,
    max_document_size: usize,
}

impl TicketService {
    pub fn new(store: Store, clock: Arc<dyn Clock>, max_document_size: usize) -> Self {
        Self {
            store,
            clock,
            max_document_size,
        }
    }

    pub async fn add_ticket(&self, caller: Caller, form: TicketForm) -> Result<Ticket, ServiceError> {
        check_uploads(&form.documents, self.max_document_size)?;

        let ticket_type: TicketType = form.ticket_type.parse()?;
        let subject = required(&form.subject, "subject")?;
        let priority = required(&form.priority, "priority")?;
        let content = parse_content(form.content.as_deref())?;
        let status = match non_blank(form.status) {
            Some(raw) => raw.parse()?,
            None => TicketStatus::Open,
        };
        let report_date = match non_blank(form.report_date) {
            Some(raw) => parse_datetime(&raw)?,
            None => self.clock.now(),
        };
        let reporter_id = parse_id(form.reporter_id, "reporter_id")?.or(Some(caller.user_id));
        let assigned_id = parse_id(form.assigned_id, "assigned_id")?;

        let ticket = NewTicket {
            ticket_type,
            subject,
            original_document_no: original_document_no(&content),
            content,
            reporter_id,
            assigned_id,
            priority,
            status,
            report_date,
            activities: vec![NewActivity {
                description: non_blank(form.description)
                    .unwrap_or_else(|| SEED_ACTIVITY_DESCRIPTION.to_string()),
                documents: form.documents,
            }],
        };

        let audit = audit(caller, self.clock.as_ref());
        let created = self
            .store
            .call("ticket", move |db, files| db.add_ticket(&ticket, audit, files))
            .await?;

        info!(
            ticket_id = created.id,
            ticket_no = %created.ticket_no,
            user_id = caller.user_id,
            "Ticket created"
        );
        Ok(created)
    }

    pub async fn get_tickets(&self, caller: Caller, query: TicketQuery) -> Result<Vec<Ticket>, ServiceError> {
        let mut filter = parse_query(query)?;
        filter.assigned_id = visible_assignee(caller, filter.assigned_id);

        self.store
            .call("ticket", move |db, _| db.get_tickets(&filter))
            .await
    }

    pub async fn get_ticket_by_id(&self, id: i64) -> Result<Ticket, ServiceError> {
        self.store
            .call("ticket", move |db, _| db.get_ticket_by_id(id))
            .await
    }

    pub async fn update_ticket(
        &self,
        caller: Caller,
        id: i64,
        update: TicketUpdate,
    ) -> Result<Ticket, ServiceError> {
        let changes = TicketChanges {
            ticket_type: update.ticket_type.as_deref().map(str::parse).transpose()?,
            subject: match update.subject {
                Some(s) => Some(required(&s, "subject")?),
                None => None,
            },
            content: update.content,
            reporter_id: update.reporter_id,
            assigned_id: update.assigned_id,
            priority: match update.priority {
                Some(p) => Some(required(&p, "priority")?),
                None => None,
            },
            status: update.status.as_deref().map(str::parse).transpose()?,
            report_date: update.report_date.as_deref().map(parse_datetime).transpose()?,
        };
        if changes.is_empty() {
            return Err(ServiceError::Validation("nothing to update".into()));
        }
        self.ensure_can_modify(caller, id).await?;

        let audit = audit(caller, self.clock.as_ref());
        let ticket = self
            .store
            .call("ticket", move |db, _| db.update_ticket(id, &changes, audit))
            .await?;

        info!(ticket_id = id, user_id = caller.user_id, "Ticket updated");
        Ok(ticket)
    }

    /// Move the ticket to `status`, `Closed` when none is given.
    pub async fn close_ticket(
        &self,
        caller: Caller,
        id: i64,
        status: Option<String>,
    ) -> Result<Ticket, ServiceError> {
        let status = match non_blank(status) {
            Some(raw) => raw.parse()?,
            None => TicketStatus::Closed,
        };
        self.ensure_can_modify(caller, id).await?;

        let audit = audit(caller, self.clock.as_ref());
        let ticket = self
            .store
            .call("ticket", move |db, _| db.close_ticket(id, status, audit))
            .await?;

        info!(ticket_id = id, status = %status, user_id = caller.user_id, "Ticket status set");
        Ok(ticket)
    }

    pub async fn replace_ticket_documents(
        &self,
        caller: Caller,
        id: i64,
        documents: Vec<NewDocument>,
    ) -> Result<Ticket, ServiceError> {
        check_uploads(&documents, self.max_document_size)?;
        self.ensure_can_modify(caller, id).await?;

        let count = documents.len();
        let audit = audit(caller, self.clock.as_ref());
        let ticket = self
            .store
            .call("ticket", move |db, files| {
                db.replace_ticket_documents(id, &documents, audit, files)
            })
            .await?;

        info!(ticket_id = id, documents = count, "Ticket documents replaced");
        Ok(ticket)
    }

    pub async fn delete_ticket(&self, caller: Caller, id: i64) -> Result<(), ServiceError> {
        self.ensure_can_modify(caller, id).await?;
        let deleted = self
            .store
            .call("ticket", move |db, files| db.delete_ticket(id, files))
            .await?;
        if !deleted {
            return Err(ServiceError::NotFound("ticket".into()));
        }

        info!(ticket_id = id, user_id = caller.user_id, "Ticket deleted");
        Ok(())
    }

    /// Standard users may only change tickets assigned to them.
    async fn ensure_can_modify(&self, caller: Caller, id: i64) -> Result<(), ServiceError> {
        if caller.role.can_view_all_tickets() {
            return Ok(());
        }
        let ticket = self.get_ticket_by_id(id).await?;
        if ticket.assigned_id != Some(caller.user_id) {
            warn!(ticket_id = id, user_id = caller.user_id, "Change to another user's ticket refused");
            return Err(ServiceError::Forbidden("ticket is not assigned to you".into()));
        }
        Ok(())
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Assignee constraint actually applied for `caller`.  Standard users only
/// ever see their own tickets; privileged roles keep whatever they asked for.
pub(crate) fn visible_assignee(caller: Caller, requested: Option<i64>) -> Option<i64> {
    if caller.role.can_view_all_tickets() {
        requested
    } else {
        Some(caller.user_id)
    }
}

/// `content.original_payload.document_no`, when present and non-empty.
fn original_document_no(content: &Value) -> Option<String> {
    content
        .get("original_payload")
        .and_then(|payload| payload.get("document_no"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|no| !no.is_empty())
        .map(str::to_string)
}

fn required(value: &str, field: &str) -> Result<String, ServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn parse_content(raw: Option<&str>) -> Result<Value, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Value::Object(Default::default())),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| ServiceError::Validation(format!("content is not valid JSON: {e}"))),
    }
}

fn parse_id(raw: Option<String>, field: &str) -> Result<Option<i64>, ServiceError> {
    non_blank(raw)
        .map(|v| {
            v.parse::<i64>()
                .map_err(|_| ServiceError::Validation(format!("{field} must be a number")))
        })
        .transpose()
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date (midnight UTC).
pub(crate) fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, ServiceError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    Err(ServiceError::Validation(format!("invalid date '{raw}'")))
}

fn parse_query(query: TicketQuery) -> Result<TicketFilter, ServiceError> {
    fn number<T: std::str::FromStr>(raw: Option<String>, field: &str) -> Result<Option<T>, ServiceError> {
        non_blank(raw)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| ServiceError::InvalidQuery(format!("{field} must be a non-negative number")))
            })
            .transpose()
    }

    fn date(raw: Option<String>, field: &str) -> Result<Option<NaiveDate>, ServiceError> {
        non_blank(raw)
            .map(|v| {
                let day = v.get(..10).unwrap_or(&v);
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map_err(|_| ServiceError::InvalidQuery(format!("{field} must be YYYY-MM-DD")))
            })
            .transpose()
    }

    let invalid = |e: deskflow_shared::SharedError| ServiceError::InvalidQuery(e.to_string());

    Ok(TicketFilter {
        ticket_type: non_blank(query.ticket_type)
            .map(|t| t.parse::<TicketType>())
            .transpose()
            .map_err(invalid)?,
        priority: non_blank(query.priority),
        status: non_blank(query.status)
            .map(|s| s.parse::<TicketStatus>())
            .transpose()
            .map_err(invalid)?,
        report_start: date(query.report_start_date, "report_start_date")?,
        report_end: date(query.report_end_date, "report_end_date")?,
        terms: non_blank(query.terms),
        assigned_id: number(query.assigned_id, "assigned_id")?,
        reporter_id: number(query.reporter_id, "reporter_id")?,
        limit: number(query.limit, "limit")?,
        offset: number(query.offset, "offset")?,
    })
}
