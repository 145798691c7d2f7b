use crate::errors::AppError;
use crate::models::{
    AttachmentCreate, Badge, Company, CompanyCreate, JobContactCreate, JobCreate,
};
use reqwest::{multipart, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;

/// Header carrying the id of a freshly created record.
pub const RECORD_UUID_HEADER: &str = "x-record-uuid";
/// Message fragment of the 400 returned when a company name is taken.
pub const DUPLICATE_NAME_MARKER: &str = "Name must be unique";

pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(30);
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of a create call that has a recoverable conflict path.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(String),
    /// The remote rejected the name as a duplicate.
    Conflict(String),
    Failed(AppError),
}

/// Client for the ServiceM8 REST API, bound to one credential.
#[derive(Clone)]
pub struct ServiceM8Client {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ServiceM8Client {
    /// Creates a new `ServiceM8Client`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://api.servicem8.com/api_1.0`.
    /// * `api_key` - The credential sent as `X-API-Key`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_http_client(client, base_url, api_key))
    }

    /// Builds a client over an existing connection pool.
    pub fn with_http_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Lists one page of companies.
    pub async fn list_companies(&self, top: usize, skip: usize) -> Result<Vec<Company>, AppError> {
        let url = self.url("company.json");
        tracing::debug!("Listing companies: $top={} $skip={}", top, skip);

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("$top", top.to_string()), ("$skip", skip.to_string())])
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?;

        let response = ensure_success(response, "company search").await?;
        let companies = response.json().await.map_err(|e| {
            AppError::InvalidResponse(format!("Failed to parse company list: {}", e))
        })?;

        Ok(companies)
    }

    /// Creates a company, reporting a duplicate-name rejection as
    /// [`CreateOutcome::Conflict`] instead of an error.
    pub async fn create_company(&self, company: &CompanyCreate) -> CreateOutcome {
        tracing::info!("Creating company '{}'", company.name);

        let response = match self.post_json("company.json", company).await {
            Ok(response) => response,
            Err(e) => return CreateOutcome::Failed(e),
        };

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            if error_message(&body).contains(DUPLICATE_NAME_MARKER) {
                tracing::info!("Company name '{}' already exists", company.name);
                return CreateOutcome::Conflict(company.name.clone());
            }
            return CreateOutcome::Failed(classify_status(
                StatusCode::BAD_REQUEST,
                body,
                "company create",
            ));
        }

        match ensure_success(response, "company create").await {
            Ok(response) => match record_uuid(&response) {
                Some(uuid) => {
                    tracing::info!("✓ Company created: {}", uuid);
                    CreateOutcome::Created(uuid)
                }
                None => CreateOutcome::Failed(AppError::InvalidResponse(
                    "Company create response missing record id".to_string(),
                )),
            },
            Err(e) => CreateOutcome::Failed(e),
        }
    }

    /// Creates a job and returns its id.
    pub async fn create_job(&self, job: &JobCreate) -> Result<String, AppError> {
        tracing::info!("Creating job for company {}", job.company_uuid);

        let response = self.post_json("job.json", job).await?;
        let response = ensure_success(response, "job create").await?;

        let uuid = record_uuid(&response).ok_or_else(|| {
            AppError::InvalidResponse("Job create response missing record id".to_string())
        })?;
        tracing::info!("✓ Job created: {}", uuid);
        Ok(uuid)
    }

    /// Creates a job contact. The id header is optional on this endpoint.
    pub async fn create_job_contact(
        &self,
        contact: &JobContactCreate,
    ) -> Result<Option<String>, AppError> {
        let response = self.post_json("jobcontact.json", contact).await?;
        let response = ensure_success(response, "job contact create").await?;
        Ok(record_uuid(&response))
    }

    /// Lists all badges for the account.
    pub async fn list_badges(&self) -> Result<Vec<Badge>, AppError> {
        let response = self
            .client
            .get(self.url("badge.json"))
            .header("X-API-Key", &self.api_key)
            .header("Accept", "application/json")
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?;

        let response = ensure_success(response, "badge list").await?;
        let badges = response
            .json()
            .await
            .map_err(|e| AppError::InvalidResponse(format!("Failed to parse badge list: {}", e)))?;

        Ok(badges)
    }

    /// Creates the attachment metadata record. `None` when the remote
    /// answered without an id.
    pub async fn create_attachment(
        &self,
        attachment: &AttachmentCreate,
    ) -> Result<Option<String>, AppError> {
        let response = self.post_json("Attachment.json", attachment).await?;
        let response = ensure_success(response, "attachment create").await?;
        Ok(record_uuid(&response))
    }

    /// Uploads the binary for an attachment record as multipart form data.
    pub async fn upload_attachment_file(
        &self,
        attachment_uuid: &str,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), AppError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| AppError::Internal(format!("Invalid MIME type '{}': {}", mime_type, e)))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(&format!("Attachment/{}.file", attachment_uuid)))
            .header("X-API-Key", &self.api_key)
            .header("Accept", "application/json")
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await?;

        ensure_success(response, "attachment upload").await?;
        Ok(())
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, AppError> {
        let response = self
            .client
            .post(self.url(path))
            .header("X-API-Key", &self.api_key)
            .header("Accept", "application/json")
            .json(body)
            .timeout(CREATE_TIMEOUT)
            .send()
            .await?;
        Ok(response)
    }
}

fn record_uuid(response: &Response) -> Option<String> {
    response
        .headers()
        .get(RECORD_UUID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Extracts `message` from a JSON error body, or returns the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn classify_status(status: StatusCode, body: String, action: &str) -> AppError {
    let message = format!("{} failed: {}", action, error_message(&body));
    let code = status.as_u16();
    match code {
        429 => AppError::RateLimited(message),
        400..=499 => AppError::Client {
            status: code,
            message,
        },
        _ => AppError::Server {
            status: code,
            message,
        },
    }
}

async fn ensure_success(response: Response, action: &str) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    tracing::debug!("{} returned {}: {}", action, status, body);
    Err(classify_status(status, body, action))
}
