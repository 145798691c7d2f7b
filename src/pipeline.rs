//! Submission orchestration.
//!
//! One run per submission, in order:
//! 1. Resolve credential and default status.
//! 2. Build the payload (rejected here, before any network call, if the
//!    required name fields are missing).
//! 3. Resolve the lead-source badge.
//! 4. Find or create the company.
//! 5. Create the job (exactly once).
//! 6. Create the job contact (failure is a warning).
//! 7. Upload attachments (each file on its own, failures are warnings).
//!
//! Anything failing up to and including step 5 is fatal; after the job
//! exists the user-visible outcome is success.

use crate::attachments::{upload_attachments, AttachmentOutcome, FileStore};
use crate::badges::{resolve_badge, BadgeCache};
use crate::company::{resolve_company, CompanyResolution};
use crate::config::{resolve_settings, GlobalSettings, PipelineConfig};
use crate::contact::create_contact;
use crate::errors::{AppError, ResultExt};
use crate::job::create_job;
use crate::mapping::MappingRules;
use crate::models::Submission;
use crate::sm8_client::ServiceM8Client;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

pub const RATE_LIMITED_MESSAGE: &str = "System is busy. Please try again in a few minutes.";

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub submission_id: String,
    pub company: Option<CompanyResolution>,
    pub job_id: Option<String>,
    pub contact_id: Option<String>,
    pub attachments: Vec<AttachmentOutcome>,
    /// Non-fatal problems after the job was created.
    pub warnings: Vec<String>,
    /// The fatal error, if the run stopped early.
    pub error: Option<AppError>,
    /// Message for the person who submitted the form.
    pub user_message: String,
}

impl PipelineOutcome {
    fn new(submission_id: &str) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            company: None,
            job_id: None,
            contact_id: None,
            attachments: Vec::new(),
            warnings: Vec::new(),
            error: None,
            user_message: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.job_id.is_some()
    }

    pub fn company_id(&self) -> Option<&str> {
        self.company.as_ref().map(CompanyResolution::id)
    }
}

/// Shared pieces every run needs. Cheap to clone.
#[derive(Clone)]
pub struct SubmissionPipeline {
    http: reqwest::Client,
    base_url: String,
    badge_cache: BadgeCache,
    file_store: Arc<dyn FileStore>,
}

impl SubmissionPipeline {
    pub fn new(
        base_url: impl Into<String>,
        badge_cache: BadgeCache,
        file_store: Arc<dyn FileStore>,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            badge_cache,
            file_store,
        })
    }

    pub fn badge_cache(&self) -> &BadgeCache {
        &self.badge_cache
    }

    pub fn client_for(&self, credential: &str) -> ServiceM8Client {
        ServiceM8Client::with_http_client(self.http.clone(), self.base_url.clone(), credential)
    }

    /// Runs the pipeline for one submission. Always runs to completion.
    pub async fn process(
        &self,
        submission: &Submission,
        pipeline: &PipelineConfig,
        global: &GlobalSettings,
    ) -> PipelineOutcome {
        let span = tracing::info_span!("submission", id = %submission.id);
        async move {
            let start = Instant::now();
            let mut outcome = PipelineOutcome::new(&submission.id);

            match self.run(submission, pipeline, global, &mut outcome).await {
                Ok(()) => {
                    outcome.user_message = pipeline.success_message.clone();
                    tracing::info!(
                        job_id = outcome.job_id.as_deref().unwrap_or_default(),
                        warnings = outcome.warnings.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Submission synchronized"
                    );
                }
                Err(e) => {
                    if e.is_rate_limited() {
                        tracing::error!("ServiceM8 rate limit exceeded: {}", e);
                        outcome.user_message = RATE_LIMITED_MESSAGE.to_string();
                    } else {
                        tracing::error!(kind = e.kind(), "Submission failed: {}", e);
                        outcome.user_message = pipeline.error_message.clone();
                    }
                    outcome.error = Some(e);
                }
            }

            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        submission: &Submission,
        pipeline: &PipelineConfig,
        global: &GlobalSettings,
        outcome: &mut PipelineOutcome,
    ) -> Result<(), AppError> {
        let verbose = pipeline.debug || global.debug;
        let notice = |message: String| {
            if verbose {
                tracing::info!("{}", message);
            } else {
                tracing::debug!("{}", message);
            }
        };

        let settings = resolve_settings(pipeline, global)?;
        let rules = MappingRules::new(&pipeline.field_mapping_rules, &pipeline.custom_mapping_text);
        let mut payload = rules.apply(submission, &settings.default_status)?;
        notice(format!("Payload built with {} fields", payload.fields.len()));

        let client = self.client_for(&settings.credential);

        if !pipeline.lead_source_field.is_empty() {
            if let Some(source_value) = submission.text(&pipeline.lead_source_field) {
                if let Some(badge_id) = resolve_badge(
                    &self.badge_cache,
                    &client,
                    &source_value,
                    &pipeline.badge_mapping_text,
                )
                .await
                {
                    notice(format!("Lead source '{}' -> badge {}", source_value, badge_id));
                    payload.badges.push(badge_id);
                }
            }
        }

        let company = resolve_company(&client, &payload, pipeline.check_duplicates)
            .await
            .context("resolving company")?;
        let company_id = company.id().to_string();
        notice(format!("Company ready: {}", company_id));
        outcome.company = Some(company);

        let job_id = create_job(
            &client,
            &company_id,
            &payload,
            &settings.default_status,
            &payload.badges,
        )
        .await
        .context("creating job")?;
        outcome.job_id = Some(job_id.clone());

        match create_contact(&client, &job_id, &payload).await {
            Ok(contact_id) => {
                notice(format!("Job contact created for job {}", job_id));
                outcome.contact_id = contact_id;
            }
            Err(e) => {
                tracing::warn!("Job {} created but contact details couldn't be added: {}", job_id, e);
                outcome
                    .warnings
                    .push(format!("contact creation failed: {}", e));
            }
        }

        if !pipeline.attachment_field.is_empty() {
            let file_ids = submission.file_ids(&pipeline.attachment_field);
            if !file_ids.is_empty() {
                let attachments =
                    upload_attachments(&client, self.file_store.as_ref(), &job_id, &file_ids)
                        .await;
                for attachment in &attachments {
                    match attachment {
                        AttachmentOutcome::Skipped { file_id, reason } => outcome
                            .warnings
                            .push(format!("file {} skipped: {}", file_id, reason)),
                        AttachmentOutcome::Failed { file_id, error } => outcome
                            .warnings
                            .push(format!("file {} failed: {}", file_id, error)),
                        AttachmentOutcome::Uploaded { .. } => {}
                    }
                }
                outcome.attachments = attachments;
            }
        }

        Ok(())
    }
}
