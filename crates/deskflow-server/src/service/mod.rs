//! Use-case layer between the HTTP handlers and the store.
//!
//! Services validate input, stamp audit fields from the [`Caller`] and the
//! injected [`Clock`], apply role scoping, and translate store errors into
//! [`ServiceError`].  Every store call runs on the blocking pool.

pub mod accounts;
pub mod activities;
pub mod documents;
pub mod summary;
pub mod tickets;
pub mod users;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use deskflow_shared::{Caller, Clock};
use deskflow_store::{Audit, Database, Deadline, DocumentStore, NewDocument};

use crate::blob_store::FsDocumentStore;
use crate::error::ServiceError;

pub use accounts::AccountService;
pub use activities::ActivityService;
pub use documents::DocumentService;
pub use summary::TicketSummary;
pub use tickets::TicketService;
pub use users::UserService;

/// The single SQLite connection plus the document directory, shared by all
/// services.
#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
    files: Arc<FsDocumentStore>,
    request_timeout: Option<Duration>,
}

impl Store {
    pub fn new(db: Database, files: FsDocumentStore) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            files: Arc::new(files),
            request_timeout: None,
        }
    }

    /// Give every store call a deadline of `timeout` from when it starts.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn files(&self) -> &FsDocumentStore {
        &self.files
    }

    /// Run `op` against the database on the blocking pool.  `entity` names
    /// what a not-found error refers to.
    pub async fn call<T, F>(&self, entity: &'static str, op: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut Database, &dyn DocumentStore) -> deskflow_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = self
            .request_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout))
            .map_or_else(Deadline::none, Deadline::at);
        self.call_within(entity, deadline, op).await
    }

    /// [`Store::call`] with an explicit deadline.
    ///
    /// The closure keeps running if the awaiting request is dropped, so the
    /// deadline is cancelled on drop and multi-table writes roll back instead
    /// of committing for a client that is gone.
    pub async fn call_within<T, F>(
        &self,
        entity: &'static str,
        deadline: Deadline,
        op: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut Database, &dyn DocumentStore) -> deskflow_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let files = Arc::clone(&self.files);
        let cancel_on_drop = CancelOnDrop(Some(deadline.clone()));

        let result = tokio::task::spawn_blocking(move || {
            // A panic mid-transaction rolled it back; the connection is still usable.
            let mut db = db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            db.set_deadline(deadline);
            let result = op(&mut *db, &*files);
            db.set_deadline(Deadline::none());
            result
        })
        .await?;
        cancel_on_drop.disarm();

        result.map_err(|e| ServiceError::from_store(entity, e))
    }

    /// Hold the connection so store calls queue behind the test.
    #[cfg(test)]
    pub(crate) fn lock_db(&self) -> std::sync::MutexGuard<'_, Database> {
        self.db.lock().unwrap()
    }
}

/// Cancels the wrapped deadline unless disarmed first.
struct CancelOnDrop(Option<Deadline>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(deadline) = self.0.take() {
            tracing::debug!("store call abandoned, cancelling its deadline");
            deadline.cancel();
        }
    }
}

/// Audit stamp for a write by `caller` at the clock's current instant.
pub(crate) fn audit(caller: Caller, clock: &dyn Clock) -> Audit {
    Audit {
        actor: caller.user_id,
        at: clock.now(),
    }
}

/// Reject empty or oversized uploads before anything touches the disk.
pub(crate) fn check_uploads(documents: &[NewDocument], max_size: usize) -> Result<(), ServiceError> {
    for doc in documents {
        if doc.file_name.trim().is_empty() {
            return Err(ServiceError::Validation("document without a file name".into()));
        }
        if doc.content.len() > max_size {
            return Err(ServiceError::Validation(format!(
                "document '{}' is {} bytes, the limit is {}",
                doc.file_name,
                doc.content.len(),
                max_size
            )));
        }
    }
    Ok(())
}

/// Treat blank optional text as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
