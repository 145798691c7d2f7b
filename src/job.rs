use crate::errors::AppError;
use crate::models::{JobCreate, Payload};
use crate::sm8_client::ServiceM8Client;

/// Builds the job body. The payload's `status` wins over the default; the
/// badge list goes over the wire as a JSON-encoded string.
pub fn job_create(
    company_id: &str,
    payload: &Payload,
    default_status: &str,
    badge_ids: &[String],
) -> JobCreate {
    let badges = if badge_ids.is_empty() {
        None
    } else {
        serde_json::to_string(badge_ids).ok()
    };

    JobCreate {
        status: payload
            .get(Payload::STATUS)
            .unwrap_or(default_status)
            .to_string(),
        company_uuid: company_id.to_string(),
        job_address: payload.get_or_empty(Payload::JOB_ADDRESS),
        job_description: payload.get_or_empty(Payload::JOB_DESCRIPTION),
        badges,
    }
}

/// Issues the single job create call. Never retried.
pub async fn create_job(
    client: &ServiceM8Client,
    company_id: &str,
    payload: &Payload,
    default_status: &str,
    badge_ids: &[String],
) -> Result<String, AppError> {
    let body = job_create(company_id, payload, default_status, badge_ids);
    client.create_job(&body).await
}
