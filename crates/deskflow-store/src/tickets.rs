//! CRUD operations for [`Ticket`] records.
//!
//! Ticket creation is the one place with a real concurrency hazard: two
//! writers must never derive the same serial.  The serial comes from the
//! `ticket_sequence` row, bumped inside an IMMEDIATE transaction, so the
//! read-and-increment happens under SQLite's write lock.  The UNIQUE
//! constraint on `ticket_no` backs this up; a collision moves the counter
//! past the taken serial and the insert is retried.

use deskflow_shared::numbering::ticket_number;
use deskflow_shared::{TicketStatus, TicketType};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::activities::activities_for_ticket;
use crate::database::{commit_within, conversion_error, decode_ts, encode_ts, Database};
use crate::documents::{
    insert_documents, paths_for_activity, paths_for_ticket, remove_stored, DocumentStore,
    Numbering, SavedFiles,
};
use crate::error::{classify, is_unique_violation, Result, StoreError};
use crate::models::{Audit, NewDocument, NewTicket, Ticket, TicketChanges, TicketFilter, UserRef};

/// Attempts at allocating a ticket number before giving up with
/// [`StoreError::Conflict`].
pub const MAX_NUMBER_ATTEMPTS: u32 = 3;

const TICKET_SELECT: &str = "
    SELECT t.id, t.ticket_no, t.ticket_type, t.subject, t.content, t.reporter_id,
           t.assigned_id, t.priority, t.status, t.report_date, t.created_by, t.updated_by,
           t.created_at, t.updated_at, r.username, a.username, u.username
    FROM tickets t
    LEFT JOIN users r ON r.id = t.reporter_id
    LEFT JOIN users a ON a.id = t.assigned_id
    LEFT JOIN users u ON u.id = t.updated_by";

enum Attempt {
    Created(i64),
    Collided(i64),
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a ticket with its activities and documents in one transaction.
    ///
    /// Files are written through `files` while the transaction is open and
    /// removed again if it does not commit.
    pub fn add_ticket(
        &mut self,
        ticket: &NewTicket,
        audit: Audit,
        files: &dyn DocumentStore,
    ) -> Result<Ticket> {
        if ticket.activities.is_empty() {
            return Err(StoreError::Validation(
                "a ticket needs at least one activity".into(),
            ));
        }

        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            match self.try_add_ticket(ticket, audit, files)? {
                Attempt::Created(id) => {
                    tracing::info!(ticket_id = id, attempt, "ticket created");
                    return self.get_ticket_by_id(id);
                }
                Attempt::Collided(serial) => {
                    tracing::warn!(serial, attempt, "ticket number collision, retrying");
                    self.skip_serial(serial)?;
                }
            }
        }

        Err(StoreError::Conflict(format!(
            "could not allocate a ticket number after {MAX_NUMBER_ATTEMPTS} attempts"
        )))
    }

    fn try_add_ticket(
        &mut self,
        ticket: &NewTicket,
        audit: Audit,
        files: &dyn DocumentStore,
    ) -> Result<Attempt> {
        let deadline = self.deadline();
        let mut saved = SavedFiles::new(files);
        let tx = self.write_tx()?;

        let serial = next_serial(&tx)?;
        let ticket_no = ticket_number(serial.unsigned_abs(), ticket.ticket_type, audit.at);
        let at = encode_ts(audit.at);

        let inserted = tx.execute(
            "INSERT INTO tickets (id, ticket_no, ticket_type, subject, content, reporter_id,
                                  assigned_id, priority, status, report_date, created_by,
                                  updated_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?12, ?12)",
            params![
                serial,
                ticket_no,
                ticket.ticket_type.label(),
                ticket.subject,
                serde_json::to_string(&ticket.content)?,
                ticket.reporter_id,
                ticket.assigned_id,
                ticket.priority,
                ticket.status.label(),
                encode_ts(ticket.report_date),
                audit.actor,
                at,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(Attempt::Collided(serial)),
            Err(e) => return Err(classify(e)),
        }

        let numbering = Numbering {
            serial,
            ticket_type: ticket.ticket_type,
            fixed: ticket.original_document_no.as_deref(),
        };

        for activity in &ticket.activities {
            tx.execute(
                "INSERT INTO activities (ticket_id, description, created_by, updated_by,
                                         created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3, ?4, ?4)",
                params![serial, activity.description, audit.actor, at],
            )
            .map_err(classify)?;
            let activity_id = tx.last_insert_rowid();

            insert_documents(&tx, &mut saved, activity_id, &numbering, &activity.documents, audit)?;
        }

        commit_within(tx, &deadline)?;
        saved.keep();

        tracing::debug!(ticket_id = serial, ticket_no = %ticket_no, "ticket committed");
        Ok(Attempt::Created(serial))
    }

    /// Move the counter past a serial whose number is already taken.
    fn skip_serial(&mut self, serial: i64) -> Result<()> {
        let tx = self.write_tx()?;
        tx.execute(
            "UPDATE ticket_sequence SET last_serial = MAX(last_serial, ?1) WHERE name = 'ticket'",
            params![serial],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single ticket with its activities, documents and user
    /// projections.
    pub fn get_ticket_by_id(&self, id: i64) -> Result<Ticket> {
        let sql = format!("{TICKET_SELECT} WHERE t.id = ?1");
        let mut ticket = self
            .conn()
            .query_row(&sql, params![id], row_to_ticket)
            .map_err(StoreError::from_lookup)?;

        ticket.activities = activities_for_ticket(self.conn(), id, false)?;
        Ok(ticket)
    }

    /// List tickets matching `filter`, newest first (ties broken by id,
    /// highest first).
    pub fn get_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if let Some(ticket_type) = filter.ticket_type {
            clauses.push("UPPER(t.ticket_type) = UPPER(?)");
            args.push(Value::Text(ticket_type.label().to_string()));
        }
        if let Some(priority) = &filter.priority {
            clauses.push("UPPER(t.priority) = UPPER(?)");
            args.push(Value::Text(priority.trim().to_string()));
        }
        if let Some(status) = filter.status {
            clauses.push("UPPER(t.status) = UPPER(?)");
            args.push(Value::Text(status.label().to_string()));
        }
        if let Some(start) = filter.report_start {
            clauses.push("substr(t.report_date, 1, 10) >= ?");
            args.push(Value::Text(start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = filter.report_end {
            clauses.push("substr(t.report_date, 1, 10) <= ?");
            args.push(Value::Text(end.format("%Y-%m-%d").to_string()));
        }
        if let Some(terms) = filter.terms.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            clauses.push("t.subject LIKE ? ESCAPE '\\'");
            args.push(Value::Text(format!("%{}%", escape_like(terms))));
        }
        if let Some(assigned_id) = filter.assigned_id {
            clauses.push("t.assigned_id = ?");
            args.push(Value::Integer(assigned_id));
        }
        if let Some(reporter_id) = filter.reporter_id {
            clauses.push("t.reporter_id = ?");
            args.push(Value::Integer(reporter_id));
        }

        let mut sql = String::from(TICKET_SELECT);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY t.created_at DESC, t.id DESC");

        // A zero limit means no limit.
        let limit = filter.limit.filter(|l| *l > 0);
        if limit.is_some() || filter.offset.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
            args.push(Value::Integer(limit.map_or(-1, i64::from)));
            args.push(Value::Integer(filter.offset.map_or(0, i64::from)));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), row_to_ticket)?;

        let mut tickets = Vec::new();
        for row in rows {
            let mut ticket = row?;
            ticket.activities = activities_for_ticket(self.conn(), ticket.id, false)?;
            tickets.push(ticket);
        }
        Ok(tickets)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Apply the set fields of `changes` and stamp the updater.  The ticket
    /// number is left alone even if the type changes.
    pub fn update_ticket(&self, id: i64, changes: &TicketChanges, audit: Audit) -> Result<Ticket> {
        let mut sets: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if let Some(ticket_type) = changes.ticket_type {
            sets.push("ticket_type = ?");
            args.push(Value::Text(ticket_type.label().to_string()));
        }
        if let Some(subject) = &changes.subject {
            sets.push("subject = ?");
            args.push(Value::Text(subject.clone()));
        }
        if let Some(content) = &changes.content {
            sets.push("content = ?");
            args.push(Value::Text(serde_json::to_string(content)?));
        }
        if let Some(reporter_id) = changes.reporter_id {
            sets.push("reporter_id = ?");
            args.push(Value::Integer(reporter_id));
        }
        if let Some(assigned_id) = changes.assigned_id {
            sets.push("assigned_id = ?");
            args.push(Value::Integer(assigned_id));
        }
        if let Some(priority) = &changes.priority {
            sets.push("priority = ?");
            args.push(Value::Text(priority.clone()));
        }
        if let Some(status) = changes.status {
            sets.push("status = ?");
            args.push(Value::Text(status.label().to_string()));
        }
        if let Some(report_date) = changes.report_date {
            sets.push("report_date = ?");
            args.push(Value::Text(encode_ts(report_date)));
        }

        sets.push("updated_by = ?");
        args.push(Value::Integer(audit.actor));
        sets.push("updated_at = ?");
        args.push(Value::Text(encode_ts(audit.at)));
        args.push(Value::Integer(id));

        let sql = format!("UPDATE tickets SET {} WHERE id = ?", sets.join(", "));
        let affected = self
            .conn()
            .execute(&sql, params_from_iter(args))
            .map_err(classify)?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        tracing::info!(ticket_id = id, updated_by = audit.actor, "ticket updated");
        self.get_ticket_by_id(id)
    }

    /// Status-only transition.
    pub fn close_ticket(&self, id: i64, status: TicketStatus, audit: Audit) -> Result<Ticket> {
        let affected = self
            .conn()
            .execute(
                "UPDATE tickets SET status = ?1, updated_by = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.label(), audit.actor, encode_ts(audit.at), id],
            )
            .map_err(classify)?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        tracing::info!(ticket_id = id, status = %status, "ticket status changed");
        self.get_ticket_by_id(id)
    }

    /// Swap the documents of the ticket's first activity for `documents`.
    /// Old files are removed only once the new set is committed.
    pub fn replace_ticket_documents(
        &mut self,
        id: i64,
        documents: &[NewDocument],
        audit: Audit,
        files: &dyn DocumentStore,
    ) -> Result<Ticket> {
        let deadline = self.deadline();
        let mut saved = SavedFiles::new(files);
        let tx = self.write_tx()?;

        let ticket_type = ticket_type_of(&tx, id)?;
        let activity_id: i64 = tx
            .query_row(
                "SELECT id FROM activities WHERE ticket_id = ?1 ORDER BY id ASC LIMIT 1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::Validation(format!("ticket {id} has no activity")))?;

        let old_paths = paths_for_activity(&tx, activity_id)?;
        tx.execute("DELETE FROM documents WHERE activity_id = ?1", params![activity_id])?;

        let numbering = Numbering {
            serial: id,
            ticket_type,
            fixed: None,
        };
        insert_documents(&tx, &mut saved, activity_id, &numbering, documents, audit)?;

        let at = encode_ts(audit.at);
        tx.execute(
            "UPDATE activities SET updated_by = ?1, updated_at = ?2 WHERE id = ?3",
            params![audit.actor, at, activity_id],
        )
        .map_err(classify)?;
        tx.execute(
            "UPDATE tickets SET updated_by = ?1, updated_at = ?2 WHERE id = ?3",
            params![audit.actor, at, id],
        )
        .map_err(classify)?;

        commit_within(tx, &deadline)?;
        saved.keep();
        remove_stored(files, &old_paths);

        tracing::info!(
            ticket_id = id,
            activity_id,
            replaced = old_paths.len(),
            added = documents.len(),
            "ticket documents replaced"
        );
        self.get_ticket_by_id(id)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a ticket.  Activities and documents go with it through the
    /// schema's cascade; their stored files are removed after commit.
    /// Returns `true` if a row was deleted.
    pub fn delete_ticket(&mut self, id: i64, files: &dyn DocumentStore) -> Result<bool> {
        let tx = self.write_tx()?;
        let paths = paths_for_ticket(&tx, id)?;
        let affected = tx.execute("DELETE FROM tickets WHERE id = ?1", params![id])?;
        tx.commit()?;

        if affected > 0 {
            remove_stored(files, &paths);
            tracing::info!(ticket_id = id, documents = paths.len(), "ticket deleted");
        }
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bump and return the ticket serial.  Never hands out a value at or below
/// an existing ticket id, even if rows were inserted behind the counter.
fn next_serial(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "UPDATE ticket_sequence
         SET last_serial = MAX(last_serial, (SELECT COALESCE(MAX(id), 0) FROM tickets)) + 1
         WHERE name = 'ticket'
         RETURNING last_serial",
        [],
        |row| row.get(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            StoreError::Migration("ticket_sequence row is missing".into())
        }
        other => StoreError::Sqlite(other),
    })
}

pub(crate) fn ticket_type_of(conn: &Connection, id: i64) -> Result<TicketType> {
    let raw: String = conn
        .query_row(
            "SELECT ticket_type FROM tickets WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .map_err(StoreError::from_lookup)?;
    raw.parse()
        .map_err(|e| StoreError::Sqlite(conversion_error(0, e)))
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn user_ref(id: Option<i64>, username: Option<String>) -> Option<UserRef> {
    Some(UserRef {
        id: id?,
        username: username?,
    })
}

/// Map a row of [`TICKET_SELECT`] to a [`Ticket`] without its activities.
fn row_to_ticket(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ticket> {
    let type_str: String = row.get(2)?;
    let content_str: String = row.get(4)?;
    let status_str: String = row.get(8)?;
    let report_str: String = row.get(9)?;
    let created_str: String = row.get(12)?;
    let updated_str: String = row.get(13)?;

    let reporter_id: Option<i64> = row.get(5)?;
    let assigned_id: Option<i64> = row.get(6)?;
    let updated_by: Option<i64> = row.get(11)?;

    Ok(Ticket {
        id: row.get(0)?,
        ticket_no: row.get(1)?,
        ticket_type: type_str.parse().map_err(|e| conversion_error(2, e))?,
        subject: row.get(3)?,
        content: serde_json::from_str(&content_str).map_err(|e| conversion_error(4, e))?,
        reporter_id,
        assigned_id,
        priority: row.get(7)?,
        status: status_str.parse().map_err(|e| conversion_error(8, e))?,
        report_date: decode_ts(9, &report_str)?,
        created_by: row.get(10)?,
        updated_by,
        created_at: decode_ts(12, &created_str)?,
        updated_at: decode_ts(13, &updated_str)?,
        reporter: user_ref(reporter_id, row.get(14)?),
        assigned: user_ref(assigned_id, row.get(15)?),
        updater: user_ref(updated_by, row.get(16)?),
        activities: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use std::thread;

    use bytes::Bytes;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use deskflow_shared::Role;
    use serde_json::json;

    use super::*;
    use crate::deadline::Deadline;
    use crate::documents::testing::MemoryStore;
    use crate::models::{NewActivity, NewUser};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    fn seed_user(db: &Database, name: &str) -> i64 {
        db.add_user(
            &NewUser {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                password_hash: None,
                role: Role::Standard,
                phone: String::new(),
                workplace: String::new(),
                team: String::new(),
            },
            None,
            at(2024, 1, 1),
        )
        .unwrap()
        .id
    }

    fn doc(name: &str) -> NewDocument {
        NewDocument {
            file_name: name.to_string(),
            document_type: "evidence".to_string(),
            content: Bytes::from_static(b"%PDF-1.4"),
        }
    }

    fn new_ticket(assigned_id: Option<i64>, docs: Vec<NewDocument>) -> NewTicket {
        NewTicket {
            ticket_type: TicketType::IncidentReport,
            subject: "Printer on fire".to_string(),
            content: json!({"floor": 3}),
            reporter_id: assigned_id,
            assigned_id,
            priority: "High".to_string(),
            status: TicketStatus::Open,
            report_date: at(2024, 3, 14),
            original_document_no: None,
            activities: vec![NewActivity {
                description: "Initial Activity".to_string(),
                documents: docs,
            }],
        }
    }

    #[test]
    fn add_ticket_numbers_ticket_and_documents() {
        let mut db = Database::open_in_memory().unwrap();
        let store = MemoryStore::default();
        let user = seed_user(&db, "alice");
        let audit = Audit { actor: user, at: at(2024, 3, 15) };

        let ticket = db
            .add_ticket(&new_ticket(Some(user), vec![doc("scan.pdf")]), audit, &store)
            .unwrap();

        assert_eq!(ticket.ticket_no, "1/SV-HR/INC/III/2024");
        assert_eq!(ticket.activities.len(), 1);
        let documents = &ticket.activities[0].documents;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].document_no, "1/SV-HR/1-INC/III/2024");
        assert_eq!(documents[0].document_size, 8);
        assert!(store.contains(&documents[0].document_path));
        assert_eq!(ticket.assigned.as_ref().unwrap().username, "alice");
        assert_eq!(ticket.content, json!({"floor": 3}));

        let second = db
            .add_ticket(&new_ticket(Some(user), vec![]), audit, &store)
            .unwrap();
        assert_eq!(second.ticket_no, "2/SV-HR/INC/III/2024");
    }

    #[test]
    fn original_document_number_wins() {
        let mut db = Database::open_in_memory().unwrap();
        let store = MemoryStore::default();
        let user = seed_user(&db, "alice");

        let mut input = new_ticket(Some(user), vec![doc("a.pdf"), doc("b.pdf")]);
        input.original_document_no = Some("EXT-99".to_string());

        let ticket = db
            .add_ticket(&input, Audit { actor: user, at: at(2024, 3, 15) }, &store)
            .unwrap();
        let numbers: Vec<_> = ticket.activities[0]
            .documents
            .iter()
            .map(|d| d.document_no.as_str())
            .collect();
        assert_eq!(numbers, ["EXT-99", "EXT-99"]);
    }

    #[test]
    fn ticket_without_activity_is_rejected_without_writes() {
        let mut db = Database::open_in_memory().unwrap();
        let store = MemoryStore::default();
        let user = seed_user(&db, "alice");

        let mut input = new_ticket(Some(user), vec![]);
        input.activities.clear();

        let err = db
            .add_ticket(&input, Audit { actor: user, at: at(2024, 3, 15) }, &store)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(db.get_tickets(&TicketFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn failed_document_leaves_nothing_behind() {
        let mut db = Database::open_in_memory().unwrap();
        let store = MemoryStore::failing_on("broken");
        let user = seed_user(&db, "alice");

        let input = new_ticket(Some(user), vec![doc("ok.pdf"), doc("broken.pdf")]);
        let err = db
            .add_ticket(&input, Audit { actor: user, at: at(2024, 3, 15) }, &store)
            .unwrap_err();

        assert!(matches!(err, StoreError::DocumentStore(_)));
        assert!(db.get_tickets(&TicketFilter::default()).unwrap().is_empty());
        let activities: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM activities", [], |r| r.get(0))
            .unwrap();
        let documents: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!((activities, documents), (0, 0));
        assert_eq!(store.len(), 0, "the first file must be cleaned up");

        // The rolled-back serial is handed out again.
        let ok = db
            .add_ticket(&new_ticket(Some(user), vec![]), Audit { actor: user, at: at(2024, 3, 15) }, &MemoryStore::default())
            .unwrap();
        assert!(ok.ticket_no.starts_with("1/"));
    }

    #[test]
    fn unknown_assignee_is_an_invalid_reference() {
        let mut db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "alice");

        let err = db
            .add_ticket(
                &new_ticket(Some(4242), vec![]),
                Audit { actor: user, at: at(2024, 3, 15) },
                &MemoryStore::default(),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference(_)));
    }

    #[test]
    fn concurrent_creation_yields_distinct_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tickets.db");

        let user = {
            let db = Database::open_at(&path).unwrap();
            seed_user(&db, "alice")
        };

        const WRITERS: usize = 8;
        const PER_WRITER: usize = 5;

        // Open every connection up front so the threads only contend on
        // ticket creation.
        let handles: Vec<_> = (0..WRITERS)
            .map(|_| Database::open_at(&path).unwrap())
            .map(|mut db| {
                thread::spawn(move || {
                    let store = MemoryStore::default();
                    (0..PER_WRITER)
                        .map(|_| {
                            db.add_ticket(
                                &new_ticket(Some(user), vec![doc("a.pdf")]),
                                Audit { actor: user, at: at(2024, 3, 15) },
                                &store,
                            )
                            .unwrap()
                            .ticket_no
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut numbers: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = numbers.len();
        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), total);
        assert_eq!(total, WRITERS * PER_WRITER);
    }

    #[test]
    fn counter_skips_rows_inserted_behind_it() {
        let mut db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "alice");
        db.conn()
            .execute(
                "INSERT INTO tickets (id, ticket_no, ticket_type, subject, content, priority,
                                      status, report_date, created_at, updated_at)
                 VALUES (10, 'legacy-10', 'Incident Report', 's', '{}', 'Low', 'Open',
                         '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z',
                         '2024-01-01T00:00:00.000000Z')",
                [],
            )
            .unwrap();

        let ticket = db
            .add_ticket(&new_ticket(Some(user), vec![]), Audit { actor: user, at: at(2024, 3, 15) }, &MemoryStore::default())
            .unwrap();
        assert_eq!(ticket.id, 11);
    }

    #[test]
    fn colliding_number_is_retried() {
        let mut db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "alice");
        // A row whose number claims serial 1 but whose id does not.
        db.conn()
            .execute(
                "INSERT INTO tickets (id, ticket_no, ticket_type, subject, content, priority,
                                      status, report_date, created_at, updated_at)
                 VALUES (-5, '1/SV-HR/INC/III/2024', 'Incident Report', 's', '{}', 'Low', 'Open',
                         '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z',
                         '2024-01-01T00:00:00.000000Z')",
                [],
            )
            .unwrap();

        let ticket = db
            .add_ticket(&new_ticket(Some(user), vec![]), Audit { actor: user, at: at(2024, 3, 15) }, &MemoryStore::default())
            .unwrap();
        assert_eq!(ticket.ticket_no, "2/SV-HR/INC/III/2024");
    }

    #[test]
    fn filters_and_ordering() {
        let mut db = Database::open_in_memory().unwrap();
        let store = MemoryStore::default();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let base = at(2024, 3, 15);

        let mut first = new_ticket(Some(alice), vec![]);
        first.subject = "VPN down".into();
        first.report_date = at(2024, 3, 1);
        db.add_ticket(&first, Audit { actor: alice, at: base }, &store).unwrap();

        let mut second = new_ticket(Some(bob), vec![]);
        second.ticket_type = TicketType::RequestFulfillment;
        second.priority = "low".into();
        second.report_date = at(2024, 3, 10);
        db.add_ticket(&second, Audit { actor: alice, at: base }, &store).unwrap();

        let mut third = new_ticket(Some(alice), vec![]);
        third.subject = "50% packet loss".into();
        third.report_date = at(2024, 3, 20);
        db.add_ticket(&third, Audit { actor: alice, at: base + Duration::minutes(5) }, &store)
            .unwrap();

        // Newest first; equal created_at falls back to id descending.
        let all = db.get_tickets(&TicketFilter::default()).unwrap();
        let ids: Vec<i64> = all.iter().map(|t| t.id).collect();
        assert_eq!(ids, [3, 2, 1]);

        let by_assignee = db
            .get_tickets(&TicketFilter { assigned_id: Some(alice), ..Default::default() })
            .unwrap();
        assert_eq!(by_assignee.iter().map(|t| t.id).collect::<Vec<_>>(), [3, 1]);

        let by_priority = db
            .get_tickets(&TicketFilter { priority: Some("LOW".into()), ..Default::default() })
            .unwrap();
        assert_eq!(by_priority.len(), 1);
        assert_eq!(by_priority[0].ticket_type, TicketType::RequestFulfillment);

        let by_type = db
            .get_tickets(&TicketFilter {
                ticket_type: Some(TicketType::IncidentReport),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_type.len(), 2);

        let ranged = db
            .get_tickets(&TicketFilter {
                report_start: NaiveDate::from_ymd_opt(2024, 3, 10),
                report_end: NaiveDate::from_ymd_opt(2024, 3, 20),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ranged.iter().map(|t| t.id).collect::<Vec<_>>(), [3, 2]);

        let open_ended = db
            .get_tickets(&TicketFilter {
                report_end: NaiveDate::from_ymd_opt(2024, 3, 1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(open_ended.iter().map(|t| t.id).collect::<Vec<_>>(), [1]);

        let literal_percent = db
            .get_tickets(&TicketFilter { terms: Some("50%".into()), ..Default::default() })
            .unwrap();
        assert_eq!(literal_percent.len(), 1);

        let vpn = db
            .get_tickets(&TicketFilter { terms: Some("vpn".into()), ..Default::default() })
            .unwrap();
        assert_eq!(vpn[0].id, 1);

        let page = db
            .get_tickets(&TicketFilter { limit: Some(1), offset: Some(1), ..Default::default() })
            .unwrap();
        assert_eq!(page.iter().map(|t| t.id).collect::<Vec<_>>(), [2]);

        let skipped = db
            .get_tickets(&TicketFilter { offset: Some(2), ..Default::default() })
            .unwrap();
        assert_eq!(skipped.iter().map(|t| t.id).collect::<Vec<_>>(), [1]);
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let mut db = Database::open_in_memory().unwrap();
        let store = MemoryStore::default();
        let alice = seed_user(&db, "alice");
        let audit = Audit { actor: alice, at: at(2024, 3, 15) };
        db.add_ticket(&new_ticket(Some(alice), vec![]), audit, &store).unwrap();
        db.add_ticket(&new_ticket(Some(alice), vec![]), audit, &store).unwrap();

        let all = db
            .get_tickets(&TicketFilter { limit: Some(0), ..Default::default() })
            .unwrap();
        assert_eq!(all.len(), 2);

        let offset_only = db
            .get_tickets(&TicketFilter { limit: Some(0), offset: Some(1), ..Default::default() })
            .unwrap();
        assert_eq!(offset_only.iter().map(|t| t.id).collect::<Vec<_>>(), [1]);
    }

    #[test]
    fn passed_deadline_rolls_back_creation() {
        let mut db = Database::open_in_memory().unwrap();
        let store = MemoryStore::default();
        let user = seed_user(&db, "alice");
        let audit = Audit { actor: user, at: at(2024, 3, 15) };

        let deadline = Deadline::none();
        deadline.cancel();
        db.set_deadline(deadline);

        let err = db
            .add_ticket(&new_ticket(Some(user), vec![doc("scan.pdf")]), audit, &store)
            .unwrap_err();
        assert!(matches!(err, StoreError::DeadlineExceeded));

        let tickets: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM tickets", [], |r| r.get(0))
            .unwrap();
        let documents: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!((tickets, documents), (0, 0));
        assert_eq!(store.len(), 0);

        // Replacement is refused the same way and keeps the old documents.
        db.set_deadline(Deadline::none());
        let ticket = db
            .add_ticket(&new_ticket(Some(user), vec![doc("old.pdf")]), audit, &store)
            .unwrap();
        assert!(ticket.ticket_no.starts_with("1/"), "rolled-back serial is reused");

        let deadline = Deadline::none();
        deadline.cancel();
        db.set_deadline(deadline);
        let err = db
            .replace_ticket_documents(ticket.id, &[doc("new.pdf")], audit, &store)
            .unwrap_err();
        assert!(matches!(err, StoreError::DeadlineExceeded));
        assert_eq!(store.len(), 1);

        db.set_deadline(Deadline::none());
        let kept = db.get_ticket_by_id(ticket.id).unwrap();
        assert_eq!(kept.activities[0].documents[0].document_name, "old.pdf");
    }

    #[test]
    fn update_keeps_ticket_number() {
        let mut db = Database::open_in_memory().unwrap();
        let store = MemoryStore::default();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        let created = db
            .add_ticket(&new_ticket(Some(alice), vec![]), Audit { actor: alice, at: at(2024, 3, 15) }, &store)
            .unwrap();

        let later = at(2024, 4, 2);
        let updated = db
            .update_ticket(
                created.id,
                &TicketChanges {
                    ticket_type: Some(TicketType::ComplaintHandling),
                    assigned_id: Some(bob),
                    subject: Some("Printer smoking".into()),
                    ..Default::default()
                },
                Audit { actor: bob, at: later },
            )
            .unwrap();

        assert_eq!(updated.ticket_no, created.ticket_no);
        assert_eq!(updated.ticket_type, TicketType::ComplaintHandling);
        assert_eq!(updated.subject, "Printer smoking");
        assert_eq!(updated.priority, "High");
        assert_eq!(updated.updater.unwrap().username, "bob");
        assert_eq!(updated.updated_at, later);

        let missing = db.update_ticket(999, &TicketChanges::default(), Audit { actor: bob, at: later });
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }

    #[test]
    fn close_only_touches_status() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let created = db
            .add_ticket(&new_ticket(Some(alice), vec![]), Audit { actor: alice, at: at(2024, 3, 15) }, &MemoryStore::default())
            .unwrap();

        let closed = db
            .close_ticket(created.id, TicketStatus::Closed, Audit { actor: alice, at: at(2024, 3, 16) })
            .unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);
        assert_eq!(closed.subject, created.subject);
    }

    #[test]
    fn replace_documents_swaps_first_activity_files() {
        let mut db = Database::open_in_memory().unwrap();
        let store = MemoryStore::default();
        let alice = seed_user(&db, "alice");
        let created = db
            .add_ticket(&new_ticket(Some(alice), vec![doc("old.pdf")]), Audit { actor: alice, at: at(2024, 3, 15) }, &store)
            .unwrap();
        let old_path = created.activities[0].documents[0].document_path.clone();

        let replaced = db
            .replace_ticket_documents(
                created.id,
                &[doc("new-1.pdf"), doc("new-2.pdf")],
                Audit { actor: alice, at: at(2024, 3, 20) },
                &store,
            )
            .unwrap();

        let documents = &replaced.activities[0].documents;
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1].document_no, "1/SV-HR/2-INC/III/2024");
        assert!(!store.contains(&old_path));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn delete_cascades_to_children_and_files() {
        let mut db = Database::open_in_memory().unwrap();
        let store = MemoryStore::default();
        let alice = seed_user(&db, "alice");
        let created = db
            .add_ticket(&new_ticket(Some(alice), vec![doc("a.pdf")]), Audit { actor: alice, at: at(2024, 3, 15) }, &store)
            .unwrap();
        let activity_id = created.activities[0].id;
        let document_id = created.activities[0].documents[0].id;

        assert!(db.delete_ticket(created.id, &store).unwrap());

        assert!(matches!(db.get_ticket_by_id(created.id), Err(StoreError::NotFound)));
        assert!(matches!(db.get_activity_by_id(activity_id), Err(StoreError::NotFound)));
        assert!(matches!(db.get_document_by_id(document_id), Err(StoreError::NotFound)));
        assert_eq!(store.len(), 0);

        assert!(!db.delete_ticket(created.id, &store).unwrap());
    }

    #[test]
    fn deleted_user_is_nulled_out_of_ticket() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let created = db
            .add_ticket(&new_ticket(Some(bob), vec![]), Audit { actor: alice, at: at(2024, 3, 15) }, &MemoryStore::default())
            .unwrap();

        assert!(db.delete_user(bob).unwrap());
        let ticket = db.get_ticket_by_id(created.id).unwrap();
        assert_eq!(ticket.assigned_id, None);
        assert!(ticket.assigned.is_none());
    }
}
