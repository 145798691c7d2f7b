use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single value captured by the form.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SubmissionValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    /// Multi-value fields, typically a list of file identifiers.
    Many(Vec<SubmissionValue>),
    /// Unanswered optional field.
    Null,
}

impl SubmissionValue {
    /// Scalar value as text. Lists and nulls have no textual form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SubmissionValue::Text(s) => Some(s.clone()),
            SubmissionValue::Number(n) => Some(n.to_string()),
            SubmissionValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            SubmissionValue::Many(_) | SubmissionValue::Null => None,
        }
    }

    /// Flattens the value into file identifiers. Empty strings are dropped.
    pub fn file_ids(&self) -> Vec<String> {
        match self {
            SubmissionValue::Many(values) => values.iter().flat_map(|v| v.file_ids()).collect(),
            SubmissionValue::Bool(_) | SubmissionValue::Null => Vec::new(),
            other => other
                .as_text()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .into_iter()
                .collect(),
        }
    }
}

/// Raw, immutable form submission.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Submission {
    /// Identifier used to correlate log lines.
    pub id: String,
    pub data: BTreeMap<String, SubmissionValue>,
}

impl Submission {
    pub fn new(id: impl Into<String>, data: BTreeMap<String, SubmissionValue>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.data.get(key).and_then(SubmissionValue::as_text)
    }

    pub fn file_ids(&self, key: &str) -> Vec<String> {
        self.data
            .get(key)
            .map(SubmissionValue::file_ids)
            .unwrap_or_default()
    }
}

/// Target-schema representation of one submission.
///
/// Field names are the remote API's (`contact_first`, `job_address`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub fields: BTreeMap<String, String>,
    pub badges: Vec<String>,
}

impl Payload {
    pub const STATUS: &'static str = "status";
    pub const CONTACT_FIRST: &'static str = "contact_first";
    pub const CONTACT_LAST: &'static str = "contact_last";
    pub const COMPANY_NAME: &'static str = "company_name";
    pub const CONTACT_EMAIL: &'static str = "contact_email";
    pub const CONTACT_MOBILE: &'static str = "contact_mobile";
    pub const CONTACT_PHONE: &'static str = "contact_phone";
    pub const JOB_ADDRESS: &'static str = "job_address";
    pub const JOB_DESCRIPTION: &'static str = "job_description";
    pub const BILLING_ADDRESS: &'static str = "billing_address";

    /// Non-empty value of a field.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Field value or the empty string.
    pub fn get_or_empty(&self, field: &str) -> String {
        self.get(field).unwrap_or_default().to_string()
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }
}

/// Company as returned by `GET /company.json`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Company {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of `POST /company.json`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompanyCreate {
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile: String,
    pub phone: String,
    pub billing_address: String,
}

/// Body of `POST /job.json`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobCreate {
    pub status: String,
    pub company_uuid: String,
    pub job_address: String,
    pub job_description: String,
    /// JSON-encoded array of badge uuids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badges: Option<String>,
}

/// Body of `POST /jobcontact.json`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobContactCreate {
    pub job_uuid: String,
    pub first: String,
    pub last: String,
    pub email: String,
    pub mobile: String,
    pub phone: String,
    #[serde(rename = "type")]
    pub contact_type: String,
}

/// Body of `POST /Attachment.json`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttachmentCreate {
    pub related_object: String,
    pub related_object_uuid: String,
    pub attachment_name: String,
    pub file_type: String,
    pub active: bool,
}

/// Badge as returned by `GET /badge.json`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Badge {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
}
