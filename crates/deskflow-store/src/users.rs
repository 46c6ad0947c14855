//! CRUD operations for [`User`] records.

use chrono::{DateTime, Utc};
use deskflow_shared::Role;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};
use uuid::Uuid;

use crate::database::{commit_within, decode_ts, encode_ts, Database};
use crate::error::{classify, is_unique_violation, Result, StoreError};
use crate::documents::{remove_stored, sanitize_file_name, DocumentStore, SavedFiles};
use crate::models::{Audit, DirectoryUser, NewDocument, NewUser, SyncStats, User, UserChanges};

const USER_SELECT: &str = "
    SELECT id, username, email, password_hash, role, phone, workplace, team,
           created_by, updated_by, created_at, updated_at, photo
    FROM users";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user.  A taken email is a [`StoreError::Conflict`].
    pub fn add_user(
        &self,
        user: &NewUser,
        created_by: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<User> {
        let at = encode_ts(at);
        self.conn()
            .execute(
                "INSERT INTO users (username, email, password_hash, role, phone, workplace, team,
                                    created_by, updated_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, ?9)",
                params![
                    user.username,
                    user.email.trim(),
                    user.password_hash,
                    user.role.label(),
                    user.phone,
                    user.workplace,
                    user.team,
                    created_by,
                    at,
                ],
            )
            .map_err(|e| email_conflict(e, &user.email))?;

        let id = self.conn().last_insert_rowid();
        tracing::info!(user_id = id, role = %user.role, "user created");
        self.get_user_by_id(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user_by_id(&self, id: i64) -> Result<User> {
        let sql = format!("{USER_SELECT} WHERE id = ?1");
        self.conn()
            .query_row(&sql, params![id], row_to_user)
            .map_err(StoreError::from_lookup)
    }

    /// Case-insensitive email lookup.
    pub fn find_user_by_email(&self, email: &str) -> Result<User> {
        let sql = format!("{USER_SELECT} WHERE email = ?1");
        self.conn()
            .query_row(&sql, params![email.trim()], row_to_user)
            .map_err(StoreError::from_lookup)
    }

    /// All users, newest first.
    pub fn get_users(&self) -> Result<Vec<User>> {
        let sql = format!("{USER_SELECT} ORDER BY created_at DESC, id DESC");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_user(&self, id: i64, changes: &UserChanges, audit: Audit) -> Result<User> {
        let mut sets: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        let text_fields = [
            ("username = ?", &changes.username),
            ("email = ?", &changes.email),
            ("phone = ?", &changes.phone),
            ("workplace = ?", &changes.workplace),
            ("team = ?", &changes.team),
        ];
        for (set, value) in text_fields {
            if let Some(value) = value {
                sets.push(set);
                args.push(Value::Text(value.trim().to_string()));
            }
        }
        if let Some(role) = changes.role {
            sets.push("role = ?");
            args.push(Value::Text(role.label().to_string()));
        }

        sets.push("updated_by = ?");
        args.push(Value::Integer(audit.actor));
        sets.push("updated_at = ?");
        args.push(Value::Text(encode_ts(audit.at)));
        args.push(Value::Integer(id));

        let sql = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
        let affected = self
            .conn()
            .execute(&sql, params_from_iter(args))
            .map_err(|e| email_conflict(e, changes.email.as_deref().unwrap_or_default()))?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        tracing::info!(user_id = id, "user updated");
        self.get_user_by_id(id)
    }

    pub fn update_password(&self, id: i64, password_hash: &str, audit: Audit) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET password_hash = ?1, updated_by = ?2, updated_at = ?3 WHERE id = ?4",
            params![password_hash, audit.actor, encode_ts(audit.at), id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        tracing::info!(user_id = id, "password changed");
        Ok(())
    }

    /// Point the user's photo at `photo_path`.  Returns the updated user and
    /// the path it replaced, if any.
    pub fn update_user_photo(
        &mut self,
        id: i64,
        photo: &NewDocument,
        audit: Audit,
        files: &dyn DocumentStore,
    ) -> Result<User> {
        let previous = self.get_user_by_id(id)?.photo;
        let destination = format!(
            "photo/{id}/{}-{}",
            Uuid::new_v4(),
            sanitize_file_name(&photo.file_name)
        );

        let deadline = self.deadline();
        let tx = self.write_tx()?;
        let mut saved = SavedFiles::new(files);
        let stored_path = saved.save(&photo.content, &destination)?;

        let affected = tx.execute(
            "UPDATE users SET photo = ?1, updated_by = ?2, updated_at = ?3 WHERE id = ?4",
            params![stored_path, audit.actor, encode_ts(audit.at), id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        commit_within(tx, &deadline)?;
        saved.keep();
        if let Some(previous) = previous {
            remove_stored(files, &[previous]);
        }

        tracing::info!(user_id = id, path = %stored_path, "photo updated");
        self.get_user_by_id(id)
    }

    /// Upsert directory records by email in one transaction.  Existing
    /// accounts keep their password; new ones start without one.
    pub fn sync_directory_users(
        &mut self,
        records: &[DirectoryUser],
        at: DateTime<Utc>,
    ) -> Result<SyncStats> {
        let at = encode_ts(at);
        let deadline = self.deadline();
        let tx = self.write_tx()?;
        let mut stats = SyncStats::default();

        for record in records {
            let email = record.email.trim();
            let existing: Option<i64> = tx
                .query_row("SELECT id FROM users WHERE email = ?1", params![email], |row| {
                    row.get(0)
                })
                .optional()?;

            match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE users SET username = ?1, role = ?2, phone = ?3, workplace = ?4,
                                          team = ?5, updated_at = ?6
                         WHERE id = ?7",
                        params![
                            record.username,
                            record.role.label(),
                            record.phone,
                            record.workplace,
                            record.team,
                            at,
                            id
                        ],
                    )?;
                    stats.updated += 1;
                }
                None => {
                    tx.execute(
                        "INSERT INTO users (username, email, password_hash, role, phone, workplace,
                                            team, created_at, updated_at)
                         VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7, ?7)",
                        params![
                            record.username,
                            email,
                            record.role.label(),
                            record.phone,
                            record.workplace,
                            record.team,
                            at
                        ],
                    )?;
                    stats.created += 1;
                }
            }
        }

        commit_within(tx, &deadline)?;
        tracing::info!(created = stats.created, updated = stats.updated, "directory users synced");
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a user.  Ticket references to them are nulled by the schema.
    /// Returns `true` if a row was deleted.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn email_conflict(e: rusqlite::Error, email: &str) -> StoreError {
    if is_unique_violation(&e) {
        StoreError::Conflict(format!("email {email} is already registered"))
    } else {
        classify(e)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role_str: String = row.get(4)?;
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: Role::from_label(&role_str),
        phone: row.get(5)?,
        workplace: row.get(6)?,
        team: row.get(7)?,
        photo: row.get(12)?,
        created_by: row.get(8)?,
        updated_by: row.get(9)?,
        created_at: decode_ts(10, &created_str)?,
        updated_at: decode_ts(11, &updated_str)?,
    })
}
