use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/drive/v2/";
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    /// Lists one page of the children of `folder_id`. Callers follow
    /// `next_page_token` until it comes back absent.
    pub async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<FilePage, DriveError> {
        let mut url = self.endpoint("files")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", &format!("trashed = false and '{folder_id}' in parents"));
            query.append_pair("maxResults", &PAGE_SIZE.to_string());
            if let Some(token) = page_token.filter(|t| !t.is_empty()) {
                query.append_pair("pageToken", token);
            }
        }
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Opens a streaming response for the raw content of a file. The body is
    /// consumed by the caller chunk by chunk.
    pub async fn fetch_content(&self, file_id: &str) -> Result<reqwest::Response, DriveError> {
        let mut url = self.endpoint(&format!("files/{file_id}"))?;
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}

/// One file-or-folder record from the remote listing API. Immutable for the
/// duration of a sync run once fetched.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteEntry {
    pub id: String,
    #[serde(rename = "title")]
    pub name: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
    /// Absent for entries with no retrievable byte content.
    #[serde(rename = "fileSize", default)]
    pub size: Option<u64>,
    #[serde(rename = "md5Checksum", default)]
    pub md5: Option<String>,
    /// RFC 3339 remote last-modification timestamp.
    #[serde(rename = "modifiedDate", default)]
    pub modified: Option<String>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FilePage {
    pub items: Vec<RemoteEntry>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}
