//! Kickstart Repository
//!
//! Narrow gateway to the two remote systems a workflow deployment touches:
//! the content repository holding the deployed documents ([`DocumentRepository`])
//! and the HTTP API of the workflow engine and form modules ([`HttpApi`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use thiserror::Error;

/// A folder in the content repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderInfo {
    /// Repository object id
    pub id: String,
    /// Absolute path, e.g. "/Data Dictionary/Models"
    pub path: String,
}

/// A document in the content repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Repository object id
    pub id: String,
    /// Document name (last path segment)
    pub name: String,
    /// Description from the titled aspect, if any
    pub description: Option<String>,
    /// Creation time as reported by the repository
    pub creation_date: DateTime<Utc>,
    /// Mime type of the content stream
    pub content_type: Option<String>,
}

/// Handle returned when a document has been created
pub type DocumentHandle = DocumentInfo;

/// Result of resolving a path
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryObject {
    Folder(FolderInfo),
    Document(DocumentInfo),
}

/// Value of a document property set at creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Boolean(bool),
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::String(value) => write!(f, "{}", value),
            PropertyValue::Boolean(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

/// Property id of the object type
pub const PROPERTY_OBJECT_TYPE_ID: &str = "cmis:objectTypeId";

/// Property id of the titled-aspect description
pub const PROPERTY_DESCRIPTION: &str = "cm:description";

/// Object type of plain documents
pub const DOCUMENT_TYPE: &str = "cmis:document";

/// A document to be created in a folder
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub name: String,
    pub content_type: String,
    pub content: Vec<u8>,
    /// Repository properties; the object type defaults to `cmis:document`
    pub properties: BTreeMap<String, PropertyValue>,
}

impl NewDocument {
    /// Create a plain document
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            content,
            properties: BTreeMap::new(),
        }
    }

    /// Set a repository property
    pub fn with_property(mut self, id: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(id.into(), value.into());
        self
    }

    /// The object type id, `cmis:document` when none was set
    pub fn object_type_id(&self) -> String {
        match self.properties.get(PROPERTY_OBJECT_TYPE_ID) {
            Some(value) => value.to_string(),
            None => DOCUMENT_TYPE.to_string(),
        }
    }
}

/// Structured query over the documents of one folder
///
/// Selects description, name and creation date of titled documents whose name
/// ends with `name_suffix`, ordered by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    /// Repository id of the folder to search in
    pub folder_id: String,
    /// Required suffix of the document name
    pub name_suffix: String,
}

impl DocumentQuery {
    /// Create a new query
    pub fn new(folder_id: impl Into<String>, name_suffix: impl Into<String>) -> Self {
        Self {
            folder_id: folder_id.into(),
            name_suffix: name_suffix.into(),
        }
    }

    /// Render the query as CMIS query language text
    pub fn statement(&self) -> String {
        format!(
            "select t.cm:description, d.cmis:name, d.cmis:creationDate \
             from cmis:document as d join cm:titled as t on d.cmis:objectId = t.cmis:objectId \
             where in_folder(d, '{}') and d.cmis:name LIKE '%{}' order by d.cmis:name",
            escape_query_literal(&self.folder_id),
            escape_query_literal(&self.name_suffix),
        )
    }
}

fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// One row returned by a [`DocumentQuery`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub name: String,
    pub description: Option<String>,
    pub creation_date: DateTime<Utc>,
}

/// Errors that can occur while talking to the remote systems
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Repository backend error: {0}")]
    BackendError(#[from] anyhow::Error), // Catch-all for transport issues

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Not a folder: {0}")]
    NotAFolder(String),

    #[error("Not a document: {0}")]
    NotADocument(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Remote call failed with status {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl RepositoryError {
    /// Whether the error reports a missing object
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

/// Result type for gateway operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Join a folder path and a child name
pub fn join_path(folder_path: &str, name: &str) -> String {
    format!("{}/{}", folder_path.trim_end_matches('/'), name)
}

/// Contract of the content repository
#[async_trait]
pub trait DocumentRepository: Send + Sync + Debug {
    /// Resolve a path to a folder or document
    async fn resolve(&self, path: &str) -> RepositoryResult<RepositoryObject>;

    /// Create a document in a folder
    async fn create_document(
        &self,
        folder_path: &str,
        document: NewDocument,
    ) -> RepositoryResult<DocumentHandle>;

    /// Delete a document; `force` removes all versions
    async fn delete_document(&self, path: &str, force: bool) -> RepositoryResult<()>;

    /// Run a structured query
    async fn query(&self, query: &DocumentQuery) -> RepositoryResult<Vec<DocumentSummary>>;

    /// Read the content stream of a document
    async fn get_content(&self, path: &str) -> RepositoryResult<Vec<u8>>;

    /// Resolve a path that must be a folder
    async fn resolve_folder(&self, path: &str) -> RepositoryResult<FolderInfo> {
        match self.resolve(path).await? {
            RepositoryObject::Folder(folder) => Ok(folder),
            RepositoryObject::Document(_) => Err(RepositoryError::NotAFolder(path.to_string())),
        }
    }

    /// Resolve a path that must be a document
    async fn resolve_document(&self, path: &str) -> RepositoryResult<DocumentInfo> {
        match self.resolve(path).await? {
            RepositoryObject::Document(document) => Ok(document),
            RepositoryObject::Folder(_) => Err(RepositoryError::NotADocument(path.to_string())),
        }
    }

    /// Check whether a path exists
    async fn exists(&self, path: &str) -> RepositoryResult<bool> {
        match self.resolve(path).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

// Re-export modules so they can be used from other crates
pub mod cmis;
pub mod http;
pub mod memory;

pub use http::{BasicAuth, HttpApi, HttpResponse};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_statement() {
        let query = DocumentQuery::new("workspace://SpacesStore/abc", ".bpmn20.xml");
        assert_eq!(
            query.statement(),
            "select t.cm:description, d.cmis:name, d.cmis:creationDate \
             from cmis:document as d join cm:titled as t on d.cmis:objectId = t.cmis:objectId \
             where in_folder(d, 'workspace://SpacesStore/abc') and d.cmis:name LIKE '%.bpmn20.xml' \
             order by d.cmis:name"
        );
    }

    #[test]
    fn test_query_statement_escapes_quotes() {
        let query = DocumentQuery::new("it's", ".xml");
        assert!(query.statement().contains("in_folder(d, 'it\\'s')"));
    }

    #[test]
    fn test_new_document_object_type() {
        let plain = NewDocument::new("a.png", "image/png", vec![1, 2, 3]);
        assert_eq!(plain.object_type_id(), "cmis:document");

        let model = NewDocument::new("m.xml", "application/xml", vec![])
            .with_property(PROPERTY_OBJECT_TYPE_ID, "D:cm:dictionaryModel")
            .with_property("cm:modelActive", true);
        assert_eq!(model.object_type_id(), "D:cm:dictionaryModel");
        assert_eq!(model.properties.get("cm:modelActive"), Some(&PropertyValue::Boolean(true)));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/Data Dictionary/Models", "x.xml"), "/Data Dictionary/Models/x.xml");
        assert_eq!(join_path("/Data Dictionary/Models/", "x.xml"), "/Data Dictionary/Models/x.xml");
    }
}
