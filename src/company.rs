//! Find-or-create of the company record a job hangs off.
//!
//! The remote API has no exact-match query for companies, so lookups page
//! through the full list. Company names are globally unique on the remote
//! side; a create that collides falls back to reusing the same-named record,
//! then to a timestamp-suffixed name.

use crate::errors::AppError;
use crate::models::{Company, CompanyCreate, Payload};
use crate::sm8_client::{CreateOutcome, ServiceM8Client};
use chrono::{DateTime, Local};

pub const COMPANY_PAGE_SIZE: usize = 100;
/// Upper bound on pages scanned per lookup.
pub const MAX_SEARCH_PAGES: usize = 50;

/// Lazily fetched, bounded sequence of company pages.
pub struct CompanyPages<'a> {
    client: &'a ServiceM8Client,
    page_size: usize,
    max_pages: usize,
    next_page: usize,
    exhausted: bool,
}

impl<'a> CompanyPages<'a> {
    pub fn new(client: &'a ServiceM8Client) -> Self {
        Self::with_limits(client, COMPANY_PAGE_SIZE, MAX_SEARCH_PAGES)
    }

    pub fn with_limits(client: &'a ServiceM8Client, page_size: usize, max_pages: usize) -> Self {
        Self {
            client,
            page_size,
            max_pages,
            next_page: 0,
            exhausted: false,
        }
    }

    /// Fetches the next page, or `None` once a short page was seen or the
    /// page cap is reached.
    pub async fn next(&mut self) -> Option<Result<Vec<Company>, AppError>> {
        if self.exhausted {
            return None;
        }
        if self.next_page >= self.max_pages {
            tracing::warn!(
                "Company search stopped after {} pages without a match",
                self.max_pages
            );
            self.exhausted = true;
            return None;
        }

        let skip = self.next_page * self.page_size;
        self.next_page += 1;

        match self.client.list_companies(self.page_size, skip).await {
            Ok(page) => {
                if page.len() < self.page_size {
                    self.exhausted = true;
                }
                Some(Ok(page))
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }

    /// Consumes pages until `predicate` matches a company.
    pub async fn find<F>(mut self, predicate: F) -> Result<Option<Company>, AppError>
    where
        F: Fn(&Company) -> bool,
    {
        while let Some(page) = self.next().await {
            if let Some(company) = page?.into_iter().find(|c| predicate(c)) {
                return Ok(Some(company));
            }
        }
        Ok(None)
    }
}

/// Case-insensitive exact match on email. Search failures count as no match.
pub async fn find_company_by_email(client: &ServiceM8Client, email: &str) -> Option<Company> {
    let wanted = email.trim().to_lowercase();
    let result = CompanyPages::new(client)
        .find(|c| {
            c.email
                .as_deref()
                .is_some_and(|e| e.trim().to_lowercase() == wanted)
        })
        .await;

    result.unwrap_or_else(|e| {
        tracing::warn!("Company search by email failed: {}", e);
        None
    })
}

/// Case-insensitive exact match on name. Search failures count as no match.
pub async fn find_company_by_name(client: &ServiceM8Client, name: &str) -> Option<Company> {
    let wanted = name.to_lowercase();
    let result = CompanyPages::new(client)
        .find(|c| c.name.as_deref().is_some_and(|n| n.to_lowercase() == wanted))
        .await;

    result.unwrap_or_else(|e| {
        tracing::warn!("Company search by name failed: {}", e);
        None
    })
}

/// `first + " " + (last | company | "Unknown")`, trimmed.
pub fn company_name(payload: &Payload) -> String {
    let first = payload.get(Payload::CONTACT_FIRST).unwrap_or_default();
    let rest = payload
        .get(Payload::CONTACT_LAST)
        .or_else(|| payload.get(Payload::COMPANY_NAME))
        .unwrap_or("Unknown");
    format!("{} {}", first, rest).trim().to_string()
}

pub fn disambiguated_name(name: &str, now: DateTime<Local>) -> String {
    format!("{} ({})", name, now.format("%Y-%m-%d %H:%M"))
}

pub fn company_create(payload: &Payload, name: String) -> CompanyCreate {
    let billing_address = payload
        .get(Payload::BILLING_ADDRESS)
        .or_else(|| payload.get(Payload::JOB_ADDRESS))
        .unwrap_or_default()
        .to_string();

    CompanyCreate {
        name,
        first_name: payload.get_or_empty(Payload::CONTACT_FIRST),
        last_name: payload.get_or_empty(Payload::CONTACT_LAST),
        email: payload.get_or_empty(Payload::CONTACT_EMAIL),
        mobile: payload.get_or_empty(Payload::CONTACT_MOBILE),
        phone: payload.get_or_empty(Payload::CONTACT_PHONE),
        billing_address,
    }
}

/// How the company id was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanyResolution {
    /// Matched by email during the duplicate check.
    ExistingByEmail(String),
    Created(String),
    /// Create collided; the same-named company was reused.
    ReusedByName(String),
    /// Create collided and no match was found; created under a suffixed name.
    CreatedDisambiguated { id: String, name: String },
}

impl CompanyResolution {
    pub fn id(&self) -> &str {
        match self {
            CompanyResolution::ExistingByEmail(id)
            | CompanyResolution::Created(id)
            | CompanyResolution::ReusedByName(id) => id,
            CompanyResolution::CreatedDisambiguated { id, .. } => id,
        }
    }
}

/// Finds or creates the company for a payload. Any error returned is fatal
/// for the submission.
pub async fn resolve_company(
    client: &ServiceM8Client,
    payload: &Payload,
    check_duplicates: bool,
) -> Result<CompanyResolution, AppError> {
    if check_duplicates {
        if let Some(email) = payload.get(Payload::CONTACT_EMAIL) {
            if let Some(company) = find_company_by_email(client, email).await {
                tracing::info!("Using existing company {} (matched by email)", company.uuid);
                return Ok(CompanyResolution::ExistingByEmail(company.uuid));
            }
        }
    }

    let name = company_name(payload);
    let mut body = company_create(payload, name.clone());

    match client.create_company(&body).await {
        CreateOutcome::Created(id) => Ok(CompanyResolution::Created(id)),
        CreateOutcome::Failed(e) => Err(e),
        CreateOutcome::Conflict(_) => {
            if let Some(existing) = find_company_by_name(client, &name).await {
                tracing::info!("Found existing company by name: {}", existing.uuid);
                return Ok(CompanyResolution::ReusedByName(existing.uuid));
            }

            body.name = disambiguated_name(&name, Local::now());
            match client.create_company(&body).await {
                CreateOutcome::Created(id) => {
                    tracing::info!("Created company with unique name: {}", body.name);
                    Ok(CompanyResolution::CreatedDisambiguated {
                        id,
                        name: body.name,
                    })
                }
                CreateOutcome::Conflict(name) => Err(AppError::Conflict(format!(
                    "Company name '{}' still conflicts after disambiguation",
                    name
                ))),
                CreateOutcome::Failed(e) => Err(e),
            }
        }
    }
}
