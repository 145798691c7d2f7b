use crate::errors::AppError;
use crate::models::{JobContactCreate, Payload};
use crate::sm8_client::ServiceM8Client;

pub const JOB_CONTACT_TYPE: &str = "JOB";

pub fn job_contact_create(job_id: &str, payload: &Payload) -> JobContactCreate {
    JobContactCreate {
        job_uuid: job_id.to_string(),
        first: payload.get_or_empty(Payload::CONTACT_FIRST),
        last: payload.get_or_empty(Payload::CONTACT_LAST),
        email: payload.get_or_empty(Payload::CONTACT_EMAIL),
        mobile: payload.get_or_empty(Payload::CONTACT_MOBILE),
        phone: payload.get_or_empty(Payload::CONTACT_PHONE),
        contact_type: JOB_CONTACT_TYPE.to_string(),
    }
}

/// Creates the job-scoped contact. The caller treats an error as a warning:
/// the job already exists at this point.
pub async fn create_contact(
    client: &ServiceM8Client,
    job_id: &str,
    payload: &Payload,
) -> Result<Option<String>, AppError> {
    client
        .create_job_contact(&job_contact_create(job_id, payload))
        .await
}
