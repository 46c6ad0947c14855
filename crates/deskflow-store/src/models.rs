//! Domain model structs persisted in the SQLite database.
//!
//! Read models derive `Serialize` so the server can hand them straight to the
//! JSON envelope.  Write inputs (`New*`, `*Changes`) are plain structs built
//! by the service layer.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use deskflow_shared::{Role, TicketStatus, TicketType};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Who performs a write, and when.  Stamped onto `created_*`/`updated_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Audit {
    pub actor: i64,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An account.  The password hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub phone: String,
    pub workplace: String,
    pub team: String,
    /// Stored path of the profile photo.
    pub photo: Option<String>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Accounts synced from the directory start without a password.
    pub fn has_password(&self) -> bool {
        self.password_hash
            .as_deref()
            .is_some_and(|h| !h.is_empty())
    }
}

/// The only user fields projected into ticket and activity responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub phone: String,
    pub workplace: String,
    pub team: String,
}

/// Partial user update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub phone: Option<String>,
    pub workplace: Option<String>,
    pub team: Option<String>,
}

/// One record pushed by the external directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryUser {
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub workplace: String,
    #[serde(default)]
    pub team: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A file attached to an activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: i64,
    pub activity_id: i64,
    pub document_no: String,
    pub document_name: String,
    pub document_size: i64,
    /// Location handed back by the [`DocumentStore`](crate::DocumentStore).
    pub document_path: String,
    pub document_type: String,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An uploaded file waiting to be stored.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub file_name: String,
    pub document_type: String,
    pub content: Bytes,
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Activity {
    pub id: i64,
    pub ticket_id: i64,
    pub description: String,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub updater: Option<UserRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub description: String,
    pub documents: Vec<NewDocument>,
}

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    /// Also the serial embedded in `ticket_no`.
    pub id: i64,
    pub ticket_no: String,
    pub ticket_type: TicketType,
    pub subject: String,
    pub content: serde_json::Value,
    pub reporter_id: Option<i64>,
    pub assigned_id: Option<i64>,
    pub priority: String,
    pub status: TicketStatus,
    pub report_date: DateTime<Utc>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reporter: Option<UserRef>,
    pub assigned: Option<UserRef>,
    pub updater: Option<UserRef>,
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub ticket_type: TicketType,
    pub subject: String,
    pub content: serde_json::Value,
    pub reporter_id: Option<i64>,
    pub assigned_id: Option<i64>,
    pub priority: String,
    pub status: TicketStatus,
    pub report_date: DateTime<Utc>,
    /// Pre-assigned document number carried in
    /// `content.original_payload.document_no`, applied to the creation batch.
    pub original_document_no: Option<String>,
    pub activities: Vec<NewActivity>,
}

/// Partial ticket update; `None` leaves the column untouched.  The ticket
/// number is never part of it.
#[derive(Debug, Clone, Default)]
pub struct TicketChanges {
    pub ticket_type: Option<TicketType>,
    pub subject: Option<String>,
    pub content: Option<serde_json::Value>,
    pub reporter_id: Option<i64>,
    pub assigned_id: Option<i64>,
    pub priority: Option<String>,
    pub status: Option<TicketStatus>,
    pub report_date: Option<DateTime<Utc>>,
}

impl TicketChanges {
    pub fn is_empty(&self) -> bool {
        self.ticket_type.is_none()
            && self.subject.is_none()
            && self.content.is_none()
            && self.reporter_id.is_none()
            && self.assigned_id.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.report_date.is_none()
    }
}

/// Filters for [`Database::get_tickets`](crate::Database::get_tickets).
/// Every set field narrows the result (logical AND).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub ticket_type: Option<TicketType>,
    pub priority: Option<String>,
    pub status: Option<TicketStatus>,
    /// Inclusive lower bound on the report date.
    pub report_start: Option<NaiveDate>,
    /// Inclusive upper bound on the report date.
    pub report_end: Option<NaiveDate>,
    /// Substring of the subject.
    pub terms: Option<String>,
    pub assigned_id: Option<i64>,
    pub reporter_id: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Ticket counts for one period, grouped by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: u64,
    pub open: u64,
    pub in_progress: u64,
    pub pending: u64,
    pub closed: u64,
}
