//! v001 -- Initial schema creation.
//!
//! Creates `users`, `ticket_sequence`, `tickets`, `activities` and
//! `documents`.  Ticket children cascade on delete; user references are
//! nulled out when the user goes away.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT,                       -- NULL until a password is set
    role          TEXT NOT NULL,
    phone         TEXT NOT NULL DEFAULT '',
    workplace     TEXT NOT NULL DEFAULT '',
    team          TEXT NOT NULL DEFAULT '',
    created_by    INTEGER,
    updated_by    INTEGER,
    created_at    TEXT NOT NULL,              -- RFC-3339 UTC, microseconds
    updated_at    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Ticket serial counter (one row per sequence)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS ticket_sequence (
    name        TEXT PRIMARY KEY NOT NULL,
    last_serial INTEGER NOT NULL
);

INSERT OR IGNORE INTO ticket_sequence (name, last_serial) VALUES ('ticket', 0);

-- ----------------------------------------------------------------
-- Tickets
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS tickets (
    id          INTEGER PRIMARY KEY,          -- == serial embedded in ticket_no
    ticket_no   TEXT NOT NULL UNIQUE,
    ticket_type TEXT NOT NULL,
    subject     TEXT NOT NULL,
    content     TEXT NOT NULL DEFAULT '{}',   -- JSON
    reporter_id INTEGER,
    assigned_id INTEGER,
    priority    TEXT NOT NULL,
    status      TEXT NOT NULL,
    report_date TEXT NOT NULL,
    created_by  INTEGER,
    updated_by  INTEGER,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,

    FOREIGN KEY (reporter_id) REFERENCES users(id) ON DELETE SET NULL,
    FOREIGN KEY (assigned_id) REFERENCES users(id) ON DELETE SET NULL,
    FOREIGN KEY (updated_by)  REFERENCES users(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_tickets_created ON tickets(created_at DESC, id DESC);
CREATE INDEX IF NOT EXISTS idx_tickets_assigned ON tickets(assigned_id);

-- ----------------------------------------------------------------
-- Activities
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS activities (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    ticket_id   INTEGER NOT NULL,
    description TEXT NOT NULL,
    created_by  INTEGER,
    updated_by  INTEGER,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,

    FOREIGN KEY (ticket_id)  REFERENCES tickets(id) ON DELETE CASCADE,
    FOREIGN KEY (updated_by) REFERENCES users(id)   ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_activities_ticket ON activities(ticket_id);

-- ----------------------------------------------------------------
-- Documents
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS documents (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    activity_id   INTEGER NOT NULL,
    document_no   TEXT NOT NULL,
    document_name TEXT NOT NULL,
    document_size INTEGER NOT NULL,
    document_path TEXT NOT NULL,
    document_type TEXT NOT NULL,
    created_by    INTEGER,
    updated_by    INTEGER,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,

    FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_documents_activity ON documents(activity_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
