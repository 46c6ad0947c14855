//! CRUD operations for [`Activity`] records.

use deskflow_shared::TicketStatus;
use rusqlite::{params, Connection};

use crate::database::{commit_within, decode_ts, encode_ts, Database};
use crate::documents::{
    documents_for_activity, insert_documents, paths_for_activity, remove_stored, DocumentStore,
    Numbering, SavedFiles,
};
use crate::error::{classify, Result, StoreError};
use crate::models::{Activity, Audit, NewActivity, UserRef};
use crate::tickets::ticket_type_of;

const ACTIVITY_SELECT: &str = "
    SELECT a.id, a.ticket_id, a.description, a.created_by, a.updated_by,
           a.created_at, a.updated_at, u.username
    FROM activities a
    LEFT JOIN users u ON u.id = a.updated_by";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Append an activity (and its documents) to an existing ticket.
    ///
    /// When the ticket had exactly one activity before this one, its status
    /// moves to "In Progress".
    pub fn add_activity(
        &mut self,
        ticket_id: i64,
        activity: &NewActivity,
        audit: Audit,
        files: &dyn DocumentStore,
    ) -> Result<Activity> {
        let deadline = self.deadline();
        let mut saved = SavedFiles::new(files);
        let tx = self.write_tx()?;

        let ticket_type = ticket_type_of(&tx, ticket_id)?;
        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM activities WHERE ticket_id = ?1",
            params![ticket_id],
            |row| row.get(0),
        )?;

        let at = encode_ts(audit.at);
        tx.execute(
            "INSERT INTO activities (ticket_id, description, created_by, updated_by,
                                     created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3, ?4, ?4)",
            params![ticket_id, activity.description, audit.actor, at],
        )
        .map_err(classify)?;
        let activity_id = tx.last_insert_rowid();

        let numbering = Numbering {
            serial: ticket_id,
            ticket_type,
            fixed: None,
        };
        insert_documents(&tx, &mut saved, activity_id, &numbering, &activity.documents, audit)?;

        if existing == 1 {
            tx.execute(
                "UPDATE tickets SET status = ?1, updated_by = ?2, updated_at = ?3 WHERE id = ?4",
                params![TicketStatus::InProgress.label(), audit.actor, at, ticket_id],
            )
            .map_err(classify)?;
            tracing::info!(ticket_id, "second activity moved ticket to In Progress");
        }

        commit_within(tx, &deadline)?;
        saved.keep();

        tracing::info!(ticket_id, activity_id, documents = activity.documents.len(), "activity added");
        self.get_activity_by_id(activity_id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single activity with its documents.
    pub fn get_activity_by_id(&self, id: i64) -> Result<Activity> {
        let sql = format!("{ACTIVITY_SELECT} WHERE a.id = ?1");
        let mut activity = self
            .conn()
            .query_row(&sql, params![id], row_to_activity)
            .map_err(StoreError::from_lookup)?;
        activity.documents = documents_for_activity(self.conn(), id)?;
        Ok(activity)
    }

    /// Activities of a ticket, newest first.
    pub fn get_activities_by_ticket(&self, ticket_id: i64) -> Result<Vec<Activity>> {
        ticket_type_of(self.conn(), ticket_id)?;
        activities_for_ticket(self.conn(), ticket_id, true)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_activity(&self, id: i64, description: &str, audit: Audit) -> Result<Activity> {
        let affected = self
            .conn()
            .execute(
                "UPDATE activities SET description = ?1, updated_by = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![description, audit.actor, encode_ts(audit.at), id],
            )
            .map_err(classify)?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        tracing::info!(activity_id = id, "activity updated");
        self.get_activity_by_id(id)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete an activity and, through the cascade, its documents.  Returns
    /// `true` if a row was deleted.
    pub fn delete_activity(&mut self, id: i64, files: &dyn DocumentStore) -> Result<bool> {
        let tx = self.write_tx()?;
        let paths = paths_for_activity(&tx, id)?;
        let affected = tx.execute("DELETE FROM activities WHERE id = ?1", params![id])?;
        tx.commit()?;

        if affected > 0 {
            remove_stored(files, &paths);
            tracing::info!(activity_id = id, documents = paths.len(), "activity deleted");
        }
        Ok(affected > 0)
    }
}

/// Activities of one ticket with their documents.  Creation order unless
/// `newest_first`.
pub(crate) fn activities_for_ticket(
    conn: &Connection,
    ticket_id: i64,
    newest_first: bool,
) -> Result<Vec<Activity>> {
    let order = if newest_first {
        "ORDER BY a.created_at DESC, a.id DESC"
    } else {
        "ORDER BY a.id ASC"
    };
    let sql = format!("{ACTIVITY_SELECT} WHERE a.ticket_id = ?1 {order}");

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params![ticket_id], row_to_activity)?;

    let mut activities = Vec::new();
    for row in rows {
        let mut activity = row?;
        activity.documents = documents_for_activity(conn, activity.id)?;
        activities.push(activity);
    }
    Ok(activities)
}

fn row_to_activity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Activity> {
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;
    let updated_by: Option<i64> = row.get(4)?;
    let updater_name: Option<String> = row.get(7)?;

    Ok(Activity {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        description: row.get(2)?,
        created_by: row.get(3)?,
        updated_by,
        updater: updated_by
            .zip(updater_name)
            .map(|(id, username)| UserRef { id, username }),
        created_at: decode_ts(5, &created_str)?,
        updated_at: decode_ts(6, &updated_str)?,
        documents: Vec::new(),
    })
}
