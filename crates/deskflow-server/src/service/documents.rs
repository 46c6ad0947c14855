use deskflow_store::Document;
use tracing::debug;

use super::Store;
use crate::error::ServiceError;

/// Read access to stored documents.  Writes go through tickets and
/// activities.
#[derive(Clone)]
pub struct DocumentService {
    store: Store,
}

impl DocumentService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get_document_by_id(&self, id: i64) -> Result<Document, ServiceError> {
        self.store
            .call("document", move |db, _| db.get_document_by_id(id))
            .await
    }

    /// Metadata plus the stored bytes.
    pub async fn download_document(&self, id: i64) -> Result<(Document, Vec<u8>), ServiceError> {
        let document = self.get_document_by_id(id).await?;
        let content = self.store.files().read(&document.document_path).await?;

        debug!(document_id = id, size = content.len(), "Document downloaded");
        Ok((document, content))
    }
}
