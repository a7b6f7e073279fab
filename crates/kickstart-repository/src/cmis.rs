//! CMIS browser-binding implementation of DocumentRepository
//!
//! Talks JSON to a CMIS 1.1 browser binding endpoint. The repository and root
//! folder URLs are discovered once in [`CmisBrowserRepository::connect`]; the
//! resulting client is meant to live for the whole process.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, Url};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::{
    http::BasicAuth, DocumentHandle, DocumentInfo, DocumentQuery, DocumentRepository,
    DocumentSummary, FolderInfo, NewDocument, RepositoryError, RepositoryObject, RepositoryResult,
    PROPERTY_DESCRIPTION, PROPERTY_OBJECT_TYPE_ID,
};

/// CMIS browser-binding client
#[derive(Debug, Clone)]
pub struct CmisBrowserRepository {
    /// URL of the repository (queries are sent here)
    repository_url: String,

    /// URL of the root folder (paths are appended here)
    root_folder_url: String,

    /// Repository credentials
    auth: BasicAuth,

    /// HTTP client
    client: Client,
}

impl CmisBrowserRepository {
    /// Connect to a browser-binding service URL and pick its first repository
    pub async fn connect(
        service_url: &str,
        auth: BasicAuth,
        timeout: Duration,
    ) -> RepositoryResult<Self> {
        let client = build_client(timeout)?;

        info!(%service_url, "Fetching CMIS repository info");
        let response = client
            .get(service_url)
            .basic_auth(&auth.username, Some(&auth.password))
            .send()
            .await
            .map_err(|e| RepositoryError::BackendError(e.into()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Failed to fetch repository info: {}", error_text);
            return Err(RepositoryError::RemoteStatus {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let infos: Map<String, Value> = response
            .json()
            .await
            .map_err(|e| RepositoryError::InvalidResponse(e.to_string()))?;

        let (repository_id, repository) = infos
            .iter()
            .next()
            .ok_or_else(|| RepositoryError::InvalidResponse("No repositories available".to_string()))?;

        let repository_url = repository["repositoryUrl"]
            .as_str()
            .ok_or_else(|| RepositoryError::InvalidResponse("Missing repositoryUrl".to_string()))?
            .to_string();
        let root_folder_url = repository["rootFolderUrl"]
            .as_str()
            .ok_or_else(|| RepositoryError::InvalidResponse("Missing rootFolderUrl".to_string()))?
            .to_string();

        info!(%repository_id, "Connected to CMIS repository");
        Ok(Self {
            repository_url,
            root_folder_url,
            auth,
            client,
        })
    }

    /// Create a client for already known repository and root folder URLs
    pub fn with_urls(
        repository_url: impl Into<String>,
        root_folder_url: impl Into<String>,
        auth: BasicAuth,
        timeout: Duration,
    ) -> RepositoryResult<Self> {
        Ok(Self {
            repository_url: repository_url.into(),
            root_folder_url: root_folder_url.into(),
            auth,
            client: build_client(timeout)?,
        })
    }

    /// URL of an object addressed by path
    ///
    /// Each path element becomes one encoded URL segment, so names holding
    /// `?`, `#` or `%` still address the object rather than the query.
    fn object_url(&self, path: &str) -> RepositoryResult<Url> {
        let mut url = Url::parse(&self.root_folder_url).map_err(|e| {
            RepositoryError::ConfigurationError(format!(
                "Invalid root folder URL {}: {}",
                self.root_folder_url, e
            ))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                RepositoryError::ConfigurationError(format!(
                    "Root folder URL cannot take a path: {}",
                    self.root_folder_url
                ))
            })?
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    /// Map an unexpected response to an error
    async fn status_error(path: &str, response: reqwest::Response) -> RepositoryError {
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => RepositoryError::NotFound(path.to_string()),
            StatusCode::CONFLICT => RepositoryError::AlreadyExists(path.to_string()),
            _ => {
                let error_text = response.text().await.unwrap_or_default();
                error!(%status, %path, "CMIS call failed: {}", error_text);
                RepositoryError::RemoteStatus {
                    status: status.as_u16(),
                    message: error_text,
                }
            }
        }
    }
}

fn build_client(timeout: Duration) -> RepositoryResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RepositoryError::ConfigurationError(format!("Failed to create HTTP client: {}", e)))
}

/// Look up a property in a succinct property map
///
/// Query results may key properties by their qualified query name
/// (e.g. `d.cmis:name`), so a suffix match is accepted as a fallback.
fn property<'a>(properties: &'a Map<String, Value>, id: &str) -> Option<&'a Value> {
    properties.get(id).or_else(|| {
        let suffix = format!(".{}", id);
        properties
            .iter()
            .find(|(key, _)| key.ends_with(&suffix))
            .map(|(_, value)| value)
    })
}

fn string_property(properties: &Map<String, Value>, id: &str) -> Option<String> {
    match property(properties, id)? {
        Value::String(value) => Some(value.clone()),
        Value::Array(values) => values.first().and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

fn date_property(properties: &Map<String, Value>, id: &str) -> RepositoryResult<DateTime<Utc>> {
    match property(properties, id) {
        Some(Value::Number(millis)) => millis
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| RepositoryError::InvalidResponse(format!("Invalid {}: {}", id, millis))),
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|e| RepositoryError::InvalidResponse(format!("Invalid {}: {}", id, e))),
        _ => Err(RepositoryError::InvalidResponse(format!("Missing {}", id))),
    }
}

fn succinct_properties(object: &Value) -> RepositoryResult<&Map<String, Value>> {
    object["succinctProperties"]
        .as_object()
        .ok_or_else(|| RepositoryError::InvalidResponse("Missing succinctProperties".to_string()))
}

fn document_from_properties(properties: &Map<String, Value>) -> RepositoryResult<DocumentInfo> {
    Ok(DocumentInfo {
        id: string_property(properties, "cmis:objectId")
            .ok_or_else(|| RepositoryError::InvalidResponse("Missing cmis:objectId".to_string()))?,
        name: string_property(properties, "cmis:name")
            .ok_or_else(|| RepositoryError::InvalidResponse("Missing cmis:name".to_string()))?,
        description: string_property(properties, PROPERTY_DESCRIPTION),
        creation_date: date_property(properties, "cmis:creationDate")?,
        content_type: string_property(properties, "cmis:contentStreamMimeType"),
    })
}

fn object_from_properties(path: &str, properties: &Map<String, Value>) -> RepositoryResult<RepositoryObject> {
    match string_property(properties, "cmis:baseTypeId").as_deref() {
        Some("cmis:folder") => Ok(RepositoryObject::Folder(FolderInfo {
            id: string_property(properties, "cmis:objectId")
                .ok_or_else(|| RepositoryError::InvalidResponse("Missing cmis:objectId".to_string()))?,
            path: string_property(properties, "cmis:path").unwrap_or_else(|| path.to_string()),
        })),
        Some("cmis:document") => Ok(RepositoryObject::Document(document_from_properties(properties)?)),
        other => Err(RepositoryError::InvalidResponse(format!(
            "Unsupported base type {:?} at {}",
            other, path
        ))),
    }
}

/// Build the createDocument form
///
/// A combined type id such as `D:bpm:workflowDefinition,P:cm:titled` is split
/// into the primary type and the secondary (aspect) types.
fn create_document_form(document: NewDocument) -> RepositoryResult<Form> {
    let object_type = document.object_type_id();
    let mut type_ids = object_type.split(',').map(str::trim);
    let primary_type = type_ids.next().unwrap_or(crate::DOCUMENT_TYPE).to_string();
    let secondary_types: Vec<String> = type_ids.map(str::to_string).collect();

    let mut form = Form::new()
        .text("cmisaction", "createDocument")
        .text("succinct", "true")
        .text("versioningState", "major");

    let mut index = 0;
    let mut push_property = |form: Form, id: &str, value: String| {
        let form = form
            .text(format!("propertyId[{}]", index), id.to_string())
            .text(format!("propertyValue[{}]", index), value);
        index += 1;
        form
    };

    form = push_property(form, "cmis:name", document.name.clone());
    form = push_property(form, PROPERTY_OBJECT_TYPE_ID, primary_type);
    for (id, value) in &document.properties {
        if id != PROPERTY_OBJECT_TYPE_ID {
            form = push_property(form, id, value.to_string());
        }
    }

    if !secondary_types.is_empty() {
        let position = index;
        form = form.text(
            format!("propertyId[{}]", position),
            "cmis:secondaryObjectTypeIds",
        );
        for (value_index, type_id) in secondary_types.into_iter().enumerate() {
            form = form.text(format!("propertyValue[{}][{}]", position, value_index), type_id);
        }
    }

    let part = Part::bytes(document.content)
        .file_name(document.name)
        .mime_str(&document.content_type)
        .map_err(|e| RepositoryError::ConfigurationError(format!("Invalid content type: {}", e)))?;

    Ok(form.part("content", part))
}

#[async_trait]
impl DocumentRepository for CmisBrowserRepository {
    async fn resolve(&self, path: &str) -> RepositoryResult<RepositoryObject> {
        debug!(%path, "Resolving object by path");
        let response = self
            .client
            .get(self.object_url(path)?)
            .query(&[("cmisselector", "object"), ("succinct", "true")])
            .basic_auth(&self.auth.username, Some(&self.auth.password))
            .send()
            .await
            .map_err(|e| RepositoryError::BackendError(e.into()))?;

        if response.status() != StatusCode::OK {
            return Err(Self::status_error(path, response).await);
        }

        let object: Value = response
            .json()
            .await
            .map_err(|e| RepositoryError::InvalidResponse(e.to_string()))?;
        object_from_properties(path, succinct_properties(&object)?)
    }

    async fn create_document(
        &self,
        folder_path: &str,
        document: NewDocument,
    ) -> RepositoryResult<DocumentHandle> {
        let target = crate::join_path(folder_path, &document.name);
        debug!(%target, size = document.content.len(), "Creating document");

        let form = create_document_form(document)?;
        let response = self
            .client
            .post(self.object_url(folder_path)?)
            .basic_auth(&self.auth.username, Some(&self.auth.password))
            .multipart(form)
            .send()
            .await
            .map_err(|e| RepositoryError::BackendError(e.into()))?;

        if !response.status().is_success() {
            // A missing folder and a name clash both surface here
            let err = Self::status_error(&target, response).await;
            return Err(match err {
                RepositoryError::NotFound(_) => RepositoryError::NotFound(folder_path.to_string()),
                other => other,
            });
        }

        let object: Value = response
            .json()
            .await
            .map_err(|e| RepositoryError::InvalidResponse(e.to_string()))?;
        document_from_properties(succinct_properties(&object)?)
    }

    async fn delete_document(&self, path: &str, force: bool) -> RepositoryResult<()> {
        debug!(%path, force, "Deleting document");
        let all_versions = if force { "true" } else { "false" };
        let response = self
            .client
            .post(self.object_url(path)?)
            .basic_auth(&self.auth.username, Some(&self.auth.password))
            .form(&[("cmisaction", "delete"), ("allVersions", all_versions)])
            .send()
            .await
            .map_err(|e| RepositoryError::BackendError(e.into()))?;

        if !response.status().is_success() {
            return Err(Self::status_error(path, response).await);
        }
        Ok(())
    }

    async fn query(&self, query: &DocumentQuery) -> RepositoryResult<Vec<DocumentSummary>> {
        let statement = query.statement();
        info!(%statement, "Executing CMIS query");

        let response = self
            .client
            .get(&self.repository_url)
            .query(&[
                ("cmisselector", "query"),
                ("q", statement.as_str()),
                ("succinct", "true"),
                ("searchAllVersions", "false"),
            ])
            .basic_auth(&self.auth.username, Some(&self.auth.password))
            .send()
            .await
            .map_err(|e| RepositoryError::BackendError(e.into()))?;

        if !response.status().is_success() {
            return Err(Self::status_error(&self.repository_url, response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RepositoryError::InvalidResponse(e.to_string()))?;

        let results = body["results"]
            .as_array()
            .ok_or_else(|| RepositoryError::InvalidResponse("Missing results".to_string()))?;

        results
            .iter()
            .map(|row| {
                let properties = succinct_properties(row)?;
                Ok(DocumentSummary {
                    name: string_property(properties, "cmis:name")
                        .ok_or_else(|| RepositoryError::InvalidResponse("Missing cmis:name".to_string()))?,
                    description: string_property(properties, PROPERTY_DESCRIPTION),
                    creation_date: date_property(properties, "cmis:creationDate")?,
                })
            })
            .collect()
    }

    async fn get_content(&self, path: &str) -> RepositoryResult<Vec<u8>> {
        debug!(%path, "Reading content stream");
        let response = self
            .client
            .get(self.object_url(path)?)
            .query(&[("cmisselector", "content")])
            .basic_auth(&self.auth.username, Some(&self.auth.password))
            .send()
            .await
            .map_err(|e| RepositoryError::BackendError(e.into()))?;

        if response.status() != StatusCode::OK {
            return Err(Self::status_error(path, response).await);
        }

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| RepositoryError::BackendError(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FOLDER: &str = "/Data Dictionary/Workflow Definitions";

    // Create a client pointing at the mock server
    fn create_test_client(mock_server: &MockServer) -> CmisBrowserRepository {
        CmisBrowserRepository::with_urls(
            format!("{}/cmis/browser/-default-", mock_server.uri()),
            format!("{}/cmis/browser/-default-/root", mock_server.uri()),
            BasicAuth::new("admin", "admin"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_connect_discovers_urls() {
        let mock_server = MockServer::start().await;
        let repository_url = format!("{}/cmis/browser/-default-", mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/cmis/browser"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "-default-": {
                    "repositoryId": "-default-",
                    "repositoryUrl": repository_url,
                    "rootFolderUrl": format!("{}/root", repository_url),
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = CmisBrowserRepository::connect(
            &format!("{}/cmis/browser", mock_server.uri()),
            BasicAuth::new("admin", "admin"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(client.repository_url, repository_url);
        assert_eq!(client.root_folder_url, format!("{}/root", repository_url));
    }

    #[tokio::test]
    async fn test_resolve_folder_and_document() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server);

        Mock::given(method("GET"))
            .and(path("/cmis/browser/-default-/root/Data%20Dictionary/Workflow%20Definitions"))
            .and(query_param("cmisselector", "object"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "succinctProperties": {
                    "cmis:baseTypeId": "cmis:folder",
                    "cmis:objectId": "folder-1",
                    "cmis:path": FOLDER,
                }
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/cmis/browser/-default-/root/Data%20Dictionary/Workflow%20Definitions/hire.bpmn20.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "succinctProperties": {
                    "cmis:baseTypeId": "cmis:document",
                    "cmis:objectId": "doc-1",
                    "cmis:name": "hire.bpmn20.xml",
                    "cm:description": "Hire",
                    "cmis:creationDate": 1678886400000i64,
                    "cmis:contentStreamMimeType": "application/xml",
                }
            })))
            .mount(&mock_server)
            .await;

        let folder = client.resolve_folder(FOLDER).await.unwrap();
        assert_eq!(folder.id, "folder-1");

        let document = client
            .resolve_document(&format!("{}/hire.bpmn20.xml", FOLDER))
            .await
            .unwrap();
        assert_eq!(document.name, "hire.bpmn20.xml");
        assert_eq!(document.description.as_deref(), Some("Hire"));
        assert_eq!(document.creation_date.timestamp_millis(), 1678886400000);
    }

    #[tokio::test]
    async fn test_resolve_missing_is_not_found() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server);

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let err = client.resolve("/nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!client.exists("/nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_document_splits_aspects() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server);

        Mock::given(method("POST"))
            .and(path("/cmis/browser/-default-/root/Data%20Dictionary/Workflow%20Definitions"))
            .and(body_string_contains("createDocument"))
            .and(body_string_contains("D:bpm:workflowDefinition"))
            .and(body_string_contains("cmis:secondaryObjectTypeIds"))
            .and(body_string_contains("P:cm:titled"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "succinctProperties": {
                    "cmis:baseTypeId": "cmis:document",
                    "cmis:objectId": "doc-2",
                    "cmis:name": "hire.bpmn20.xml",
                    "cmis:creationDate": 1678886400000i64,
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let document = NewDocument::new("hire.bpmn20.xml", "application/xml", b"<definitions/>".to_vec())
            .with_property(PROPERTY_OBJECT_TYPE_ID, "D:bpm:workflowDefinition,P:cm:titled")
            .with_property("bpm:definitionDeployed", true);

        let handle = client.create_document(FOLDER, document).await.unwrap();
        assert_eq!(handle.id, "doc-2");
    }

    #[tokio::test]
    async fn test_create_document_conflict() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server);

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("nameConstraintViolation"))
            .mount(&mock_server)
            .await;

        let result = client
            .create_document(FOLDER, NewDocument::new("a.png", "image/png", vec![1]))
            .await;
        assert!(matches!(result, Err(RepositoryError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_delete_document() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server);

        Mock::given(method("POST"))
            .and(path("/cmis/browser/-default-/root/Data%20Dictionary/Workflow%20Definitions/a.png"))
            .and(body_string_contains("cmisaction=delete"))
            .and(body_string_contains("allVersions=true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        client
            .delete_document(&format!("{}/a.png", FOLDER), true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reserved_characters_stay_in_the_path() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server);
        let document_path = format!("{}/ready?.bpmn20.xml", FOLDER);

        Mock::given(method("GET"))
            .and(path(
                "/cmis/browser/-default-/root/Data%20Dictionary/Workflow%20Definitions/ready%3F.bpmn20.xml",
            ))
            .and(query_param("cmisselector", "object"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "succinctProperties": {
                    "cmis:baseTypeId": "cmis:document",
                    "cmis:objectId": "doc-3",
                    "cmis:name": "ready?.bpmn20.xml",
                    "cmis:creationDate": 1678886400000i64,
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path(
                "/cmis/browser/-default-/root/Data%20Dictionary/Workflow%20Definitions/ready%3F.bpmn20.xml",
            ))
            .and(body_string_contains("cmisaction=delete"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let document = client.resolve_document(&document_path).await.unwrap();
        assert_eq!(document.name, "ready?.bpmn20.xml");
        client.delete_document(&document_path, true).await.unwrap();
    }

    #[test]
    fn test_object_url_encodes_segments() {
        let client = CmisBrowserRepository::with_urls(
            "http://cmis.test/cmis/browser/-default-",
            "http://cmis.test/cmis/browser/-default-/root/",
            BasicAuth::new("admin", "admin"),
            Duration::from_secs(5),
        )
        .unwrap();

        let url = client.object_url("/Data Dictionary/a#b%c.json").unwrap();
        assert_eq!(
            url.as_str(),
            "http://cmis.test/cmis/browser/-default-/root/Data%20Dictionary/a%23b%25c.json"
        );
        assert_eq!(url.query(), None);
    }

    #[tokio::test]
    async fn test_query_reads_qualified_properties() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server);

        Mock::given(method("GET"))
            .and(path("/cmis/browser/-default-"))
            .and(query_param("cmisselector", "query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "succinctProperties": {
                        "t.cm:description": "Alpha",
                        "d.cmis:name": "alpha.bpmn20.xml",
                        "d.cmis:creationDate": 1678886400000i64,
                    }},
                    { "succinctProperties": {
                        "cm:description": "Beta",
                        "cmis:name": "beta.bpmn20.xml",
                        "cmis:creationDate": "2023-03-15T13:20:00Z",
                    }}
                ]
            })))
            .mount(&mock_server)
            .await;

        let rows = client
            .query(&DocumentQuery::new("folder-1", ".bpmn20.xml"))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "alpha.bpmn20.xml");
        assert_eq!(rows[0].description.as_deref(), Some("Alpha"));
        assert_eq!(rows[1].description.as_deref(), Some("Beta"));
    }

    #[tokio::test]
    async fn test_get_content() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server);

        Mock::given(method("GET"))
            .and(query_param("cmisselector", "content"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"{\"name\":\"x\"}".to_vec()))
            .mount(&mock_server)
            .await;

        let content = client.get_content(&format!("{}/x.json", FOLDER)).await.unwrap();
        assert_eq!(content, b"{\"name\":\"x\"}".to_vec());
    }
}
