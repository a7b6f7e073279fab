//! In-memory implementation of DocumentRepository
//!
//! This implementation is primarily intended for testing and development purposes.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    join_path, DocumentHandle, DocumentInfo, DocumentQuery, DocumentRepository, DocumentSummary,
    FolderInfo, NewDocument, PropertyValue, RepositoryError, RepositoryObject, RepositoryResult,
    PROPERTY_DESCRIPTION,
};

/// Aspect a document must carry to show up in structured queries
const TITLED_ASPECT: &str = "P:cm:titled";

/// A mutating call made against the repository, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOperation {
    Create(String),
    Delete(String),
}

#[derive(Debug, Clone)]
struct StoredDocument {
    folder_path: String,
    info: DocumentInfo,
    content: Vec<u8>,
    properties: BTreeMap<String, PropertyValue>,
}

/// In-memory implementation of DocumentRepository
///
/// Folders must be registered up front; documents are keyed by full path.
/// All data is lost when the instance is dropped. Mutating calls are only
/// logged once [`InMemoryRepository::with_recording`] is applied.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    folders: Arc<RwLock<HashMap<String, FolderInfo>>>,
    documents: Arc<RwLock<BTreeMap<String, StoredDocument>>>,
    operations: Option<Arc<RwLock<Vec<RecordedOperation>>>>,
}

impl InMemoryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Log mutating calls for [`InMemoryRepository::operations`]
    ///
    /// Clones made afterwards share the log.
    pub fn with_recording(mut self) -> Self {
        self.operations = Some(Arc::default());
        self
    }

    /// Create a repository with the given folders
    pub async fn with_folders(paths: &[&str]) -> Self {
        let repository = Self::new();
        for path in paths {
            repository.add_folder(path).await;
        }
        repository
    }

    /// Register a folder
    pub async fn add_folder(&self, path: &str) -> FolderInfo {
        let folder = FolderInfo {
            id: format!("workspace://SpacesStore/{}", uuid::Uuid::new_v4()),
            path: path.trim_end_matches('/').to_string(),
        };
        self.folders
            .write()
            .await
            .insert(folder.path.clone(), folder.clone());
        folder
    }

    /// Names of the documents in a folder, sorted
    pub async fn document_names(&self, folder_path: &str) -> Vec<String> {
        let folder_path = folder_path.trim_end_matches('/');
        self.documents
            .read()
            .await
            .values()
            .filter(|doc| doc.folder_path == folder_path)
            .map(|doc| doc.info.name.clone())
            .collect()
    }

    /// Content of a document as UTF-8 text
    pub async fn content_string(&self, path: &str) -> Option<String> {
        self.documents
            .read()
            .await
            .get(path)
            .map(|doc| String::from_utf8_lossy(&doc.content).into_owned())
    }

    /// Properties a document was created with
    pub async fn properties(&self, path: &str) -> Option<BTreeMap<String, PropertyValue>> {
        self.documents
            .read()
            .await
            .get(path)
            .map(|doc| doc.properties.clone())
    }

    /// Mutating calls made so far, in order; empty unless recording
    pub async fn operations(&self) -> Vec<RecordedOperation> {
        match &self.operations {
            Some(operations) => operations.read().await.clone(),
            None => Vec::new(),
        }
    }

    async fn record(&self, operation: RecordedOperation) {
        if let Some(operations) = &self.operations {
            operations.write().await.push(operation);
        }
    }
}

#[async_trait]
impl DocumentRepository for InMemoryRepository {
    async fn resolve(&self, path: &str) -> RepositoryResult<RepositoryObject> {
        let trimmed = path.trim_end_matches('/');

        if let Some(folder) = self.folders.read().await.get(trimmed) {
            return Ok(RepositoryObject::Folder(folder.clone()));
        }

        match self.documents.read().await.get(trimmed) {
            Some(doc) => Ok(RepositoryObject::Document(doc.info.clone())),
            None => Err(RepositoryError::NotFound(path.to_string())),
        }
    }

    async fn create_document(
        &self,
        folder_path: &str,
        document: NewDocument,
    ) -> RepositoryResult<DocumentHandle> {
        let folder_path = folder_path.trim_end_matches('/');
        if !self.folders.read().await.contains_key(folder_path) {
            return Err(RepositoryError::NotFound(folder_path.to_string()));
        }

        let path = join_path(folder_path, &document.name);
        let mut documents = self.documents.write().await;
        if documents.contains_key(&path) {
            return Err(RepositoryError::AlreadyExists(path));
        }

        let info = DocumentInfo {
            id: format!("workspace://SpacesStore/{}", uuid::Uuid::new_v4()),
            name: document.name.clone(),
            description: document
                .properties
                .get(PROPERTY_DESCRIPTION)
                .map(|value| value.to_string()),
            creation_date: Utc::now(),
            content_type: Some(document.content_type.clone()),
        };

        debug!(%path, size = document.content.len(), "Storing document");
        documents.insert(
            path.clone(),
            StoredDocument {
                folder_path: folder_path.to_string(),
                info: info.clone(),
                content: document.content,
                properties: document.properties,
            },
        );
        drop(documents);
        self.record(RecordedOperation::Create(path)).await;

        Ok(info)
    }

    async fn delete_document(&self, path: &str, _force: bool) -> RepositoryResult<()> {
        let removed = self.documents.write().await.remove(path);
        match removed {
            Some(_) => {
                self.record(RecordedOperation::Delete(path.to_string())).await;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(path.to_string())),
        }
    }

    async fn query(&self, query: &DocumentQuery) -> RepositoryResult<Vec<DocumentSummary>> {
        let folder_path = self
            .folders
            .read()
            .await
            .values()
            .find(|folder| folder.id == query.folder_id)
            .map(|folder| folder.path.clone())
            .ok_or_else(|| RepositoryError::NotFound(query.folder_id.clone()))?;

        // BTreeMap iteration keeps the rows ordered by path, hence by name within a folder
        let rows = self
            .documents
            .read()
            .await
            .values()
            .filter(|doc| doc.folder_path == folder_path)
            .filter(|doc| doc.info.name.ends_with(&query.name_suffix))
            .filter(|doc| {
                doc.properties
                    .get(crate::PROPERTY_OBJECT_TYPE_ID)
                    .map(|value| value.to_string().contains(TITLED_ASPECT))
                    .unwrap_or(false)
            })
            .map(|doc| DocumentSummary {
                name: doc.info.name.clone(),
                description: doc.info.description.clone(),
                creation_date: doc.info.creation_date,
            })
            .collect();

        Ok(rows)
    }

    async fn get_content(&self, path: &str) -> RepositoryResult<Vec<u8>> {
        match self.documents.read().await.get(path) {
            Some(doc) => Ok(doc.content.clone()),
            None => Err(RepositoryError::NotFound(path.to_string())),
        }
    }
}
