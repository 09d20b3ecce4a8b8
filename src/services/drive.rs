//! Remote folder storage: the object store capability and a Google Drive
//! implementation over the Drive v3 REST API.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{BotError, Result};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
const FILE_FIELDS: &str = "id, name, mimeType, parents, webContentLink";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Mime types the roster accepts
pub const IMAGE_MIME_TYPES: &[&str] = &["image/gif", "image/jpeg", "image/png"];

/// A file in a remote folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub parent_folder_id: Option<String>,
    pub content_link: String,
}

impl RemoteFile {
    pub fn is_image(&self) -> bool {
        IMAGE_MIME_TYPES.contains(&self.mime_type.as_str())
    }
}

/// Folder-like remote storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every image (and sub-folder) directly inside a folder, following pagination
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>>;

    async fn upload_file(
        &self,
        name: &str,
        folder_id: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<RemoteFile>;
}

/// Shared object store type
pub type SharedObjectStore = Arc<dyn ObjectStore>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    parents: Vec<String>,
    web_content_link: Option<String>,
}

impl From<DriveFile> for RemoteFile {
    fn from(file: DriveFile) -> Self {
        let content_link = file
            .web_content_link
            .unwrap_or_else(|| format!("{}/files/{}?alt=media", DRIVE_API, file.id));
        RemoteFile {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            parent_folder_id: file.parents.into_iter().next(),
            content_link,
        }
    }
}

/// Google Drive store authenticated with an OAuth bearer token
pub struct GoogleDriveStore {
    access_token: String,
    http_client: reqwest::Client,
}

impl GoogleDriveStore {
    pub fn new(access_token: String, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BotError::Internal {
                message: format!("Failed to build Drive HTTP client: {}", e),
            })?;

        Ok(Self {
            access_token,
            http_client,
        })
    }

    pub fn from_env(timeout: Duration) -> Option<Result<Self>> {
        let token = std::env::var("DRIVE_ACCESS_TOKEN").ok()?;
        Some(Self::new(token, timeout))
    }

    async fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<FileList> {
        let query = folder_query(folder_id);
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);

        let mut request = self
            .http_client
            .get(format!("{}/files", DRIVE_API))
            .bearer_auth(&self.access_token)
            .query(&[
                ("q", query.as_str()),
                ("fields", fields.as_str()),
                ("pageSize", "1000"),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(BotError::ObjectStore {
                message: format!(
                    "listing folder {} failed with status {}",
                    folder_id,
                    response.status()
                ),
            });
        }

        Ok(response.json::<FileList>().await?)
    }
}

#[async_trait]
impl ObjectStore for GoogleDriveStore {
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(folder_id, page_token.as_deref()).await?;
            let count = page.files.len();
            files.extend(page.files.into_iter().map(RemoteFile::from));

            match page.next_page_token {
                Some(token) if count > 0 => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} files in folder {}", files.len(), folder_id);
        Ok(files)
    }

    async fn upload_file(
        &self,
        name: &str,
        folder_id: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<RemoteFile> {
        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id],
        });
        let boundary = format!("biasbot-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related_body(&boundary, &metadata.to_string(), mime_type, &bytes);

        let response = self
            .http_client
            .post(format!("{}/files", DRIVE_UPLOAD_API))
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BotError::ObjectStore {
                message: format!("upload of '{}' failed with status {}", name, response.status()),
            });
        }

        let file: DriveFile = response.json().await?;
        Ok(file.into())
    }
}

fn folder_query(folder_id: &str) -> String {
    let mime_clauses: Vec<String> = IMAGE_MIME_TYPES
        .iter()
        .chain(std::iter::once(&FOLDER_MIME_TYPE))
        .map(|m| format!("mimeType = \"{}\"", m))
        .collect();
    format!(
        "\"{}\" in parents and ({})",
        folder_id,
        mime_clauses.join(" or ")
    )
}

fn multipart_related_body(
    boundary: &str,
    metadata_json: &str,
    mime_type: &str,
    bytes: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + metadata_json.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {t}\r\n\r\n",
            b = boundary,
            m = metadata_json,
            t = mime_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
