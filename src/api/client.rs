//! HTTP client for the feed server
//!
//! The server keeps the login in a session cookie, so one cookie-enabled
//! client is shared by every call. File uploads are streamed from disk.

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::capture::MediaFormat;
use crate::config::ServerConfig;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    points: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOutcome {
    pub created: bool,
    pub message: String,
}

/// Response to a successful upload
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    pub message: String,
    /// Point total after the upload
    pub points: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Video,
    Image,
}

/// One entry of the feed, newest first
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPost {
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub filename: String,
    pub emotion: String,
    pub time: String,
}

/// Media payload of an upload
#[derive(Debug)]
pub enum UploadBody {
    /// In-memory bytes, e.g. a finished recording
    Bytes {
        data: Vec<u8>,
        filename: String,
        format: MediaFormat,
    },
    /// A file streamed from disk
    File {
        path: PathBuf,
        filename: String,
        len: u64,
        format: MediaFormat,
    },
}

#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    base_url: String,
    media_path: String,
}

impl FeedClient {
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            media_path: format!("/{}", config.media_path.trim_matches('/')),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Where the server serves an uploaded file
    pub fn media_url(&self, filename: &str) -> String {
        format!("{}{}/{}", self.base_url, self.media_path, filename)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/login"))
            .json(&Credentials { email, password })
            .send()
            .await?;
        let response = check_status(response).await?;
        let login: LoginResponse = decode(response).await?;
        info!("Logged in as {} ({})", email, login.message);
        Ok(login)
    }

    /// Create an account. A rejection (e.g. duplicate email) is not an error.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome, ApiError> {
        let response = self
            .client
            .post(self.url("/register"))
            .json(&Credentials { email, password })
            .send()
            .await?;
        let created = response.status().is_success();
        let body: MessageResponse = decode(response).await?;
        Ok(RegisterOutcome {
            created,
            message: body.message,
        })
    }

    /// Current point total
    pub async fn points(&self) -> Result<i64, ApiError> {
        let response = self.client.get(self.url("/get_points")).send().await?;
        let response = check_status(response).await?;
        let body: PointsResponse = decode(response).await?;
        Ok(body.points)
    }

    /// Submit one media file tagged with an emotion
    pub async fn upload(&self, emotion: &str, body: UploadBody) -> Result<UploadReceipt, ApiError> {
        let part = match body {
            UploadBody::Bytes {
                data,
                filename,
                format,
            } => {
                debug!("Uploading {} ({} bytes in memory)", filename, data.len());
                Part::bytes(data)
                    .file_name(filename)
                    .mime_str(format.mime())?
            }
            UploadBody::File {
                path,
                filename,
                len,
                format,
            } => {
                debug!("Uploading {} ({} bytes from {:?})", filename, len, path);
                let file = File::open(&path).await?;
                // Stream the file instead of loading it into RAM
                let stream = ReaderStream::new(file);
                Part::stream_with_length(Body::wrap_stream(stream), len)
                    .file_name(filename)
                    .mime_str(format.mime())?
            }
        };

        let form = Form::new()
            .text("emotion", emotion.to_string())
            .part("file", part);

        let response = self
            .client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;
        decode(response).await
    }

    pub async fn feed(&self) -> Result<Vec<FeedPost>, ApiError> {
        let response = self.client.get(self.url("/feed")).send().await?;
        let response = check_status(response).await?;
        decode(response).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let response = self.client.get(self.url("/logout")).send().await?;
        check_status(response).await?;
        info!("Logged out");
        Ok(())
    }
}

/// Turn a non-2xx response into [`ApiError::Status`], keeping the server's message
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<MessageResponse>(&text)
        .map(|body| body.message)
        .unwrap_or_else(|_| format!("request failed with status {}", status));

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}
