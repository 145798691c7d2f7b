/// Integration tests with a mocked ServiceM8 API
/// Exercises the full submission pipeline without hitting the real service
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{FromRequest, Path, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Json;
use rust_sm8_sync::attachments::{AttachmentOutcome, FileStore, StoredFile, MAX_FILE_SIZE};
use rust_sm8_sync::badges::{resolve_badge, BadgeCache};
use rust_sm8_sync::company::{find_company_by_email, CompanyResolution};
use rust_sm8_sync::config::{Config, GlobalSettings, PipelineConfig};
use rust_sm8_sync::errors::AppError;
use rust_sm8_sync::handlers::{self, AppState, SettingsUpdate, SubmissionRequest};
use rust_sm8_sync::models::{Submission, SubmissionValue};
use rust_sm8_sync::pipeline::{SubmissionPipeline, RATE_LIMITED_MESSAGE};
use rust_sm8_sync::sm8_client::ServiceM8Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test_api_key_123";

/// In-memory uploads keyed by file id
#[derive(Default)]
struct MemoryFileStore {
    files: HashMap<String, (StoredFile, Vec<u8>)>,
}

impl MemoryFileStore {
    fn with_file(mut self, id: &str, size: u64, bytes: &[u8]) -> Self {
        let file = StoredFile {
            id: id.to_string(),
            filename: id.to_string(),
            size,
            mime_type: "application/octet-stream".to_string(),
        };
        self.files.insert(id.to_string(), (file, bytes.to_vec()));
        self
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn load(&self, id: &str) -> Option<StoredFile> {
        self.files.get(id).map(|(file, _)| file.clone())
    }

    async fn read(&self, file: &StoredFile) -> Result<Vec<u8>, AppError> {
        self.files
            .get(&file.id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| AppError::NotFound(file.id.clone()))
    }
}

fn global_settings() -> GlobalSettings {
    GlobalSettings {
        api_key: API_KEY.to_string(),
        default_job_status: "Quote".to_string(),
        cache_badges: true,
        cache_duration_secs: 3600,
        debug: false,
    }
}

fn pipeline_config() -> PipelineConfig {
    let mut rules = BTreeMap::new();
    rules.insert("contact_first_name".to_string(), "first".to_string());
    rules.insert("contact_last_name".to_string(), "last".to_string());
    rules.insert("contact_email".to_string(), "email".to_string());
    rules.insert("contact_mobile".to_string(), "mobile".to_string());
    rules.insert("job_address".to_string(), "address".to_string());
    rules.insert("description".to_string(), "message".to_string());

    PipelineConfig {
        field_mapping_rules: rules,
        ..PipelineConfig::default()
    }
}

fn submission(pairs: &[(&str, &str)]) -> Submission {
    let data = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), SubmissionValue::Text(v.to_string())))
        .collect();
    Submission::new("sub-1", data)
}

fn ada() -> Submission {
    submission(&[
        ("first", "Ada"),
        ("last", "Lovelace"),
        ("email", "ada@example.com"),
        ("mobile", "(04) 1234-5678"),
        ("address", "1 Analytical Way"),
        ("message", "Fix the engine"),
    ])
}

fn pipeline_for(server: &MockServer, store: MemoryFileStore) -> SubmissionPipeline {
    SubmissionPipeline::new(
        server.uri(),
        BadgeCache::new(Duration::from_secs(3600), true),
        Arc::new(store),
    )
    .unwrap()
}

fn created(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("x-record-uuid", id)
        .set_body_json(serde_json::json!({"errorCode": 0, "message": "OK"}))
}

fn name_taken() -> ResponseTemplate {
    ResponseTemplate::new(400)
        .set_body_json(serde_json::json!({"errorCode": 400, "message": "Name must be unique"}))
}

fn companies(count: usize, offset: usize) -> serde_json::Value {
    let list: Vec<_> = (0..count)
        .map(|i| {
            serde_json::json!({
                "uuid": format!("company-{}", offset + i),
                "name": format!("Customer {}", offset + i),
                "email": format!("customer{}@example.com", offset + i),
            })
        })
        .collect();
    serde_json::Value::Array(list)
}

async fn mount_job_and_contact(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/job.json"))
        .respond_with(created("job-1"))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jobcontact.json"))
        .respond_with(created("contact-1"))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, http_method: &str, url_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == url_path)
        .count()
}

#[tokio::test]
async fn test_happy_path_creates_company_job_and_contact() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .and(header("X-API-Key", API_KEY))
        .and(body_string_contains("\"name\":\"Ada Lovelace\""))
        .respond_with(created("company-1"))
        .expect(1)
        .mount(&server)
        .await;
    mount_job_and_contact(&server).await;

    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(&ada(), &pipeline_config(), &global_settings())
        .await;

    assert!(outcome.is_success(), "unexpected error: {:?}", outcome.error);
    assert_eq!(outcome.company_id(), Some("company-1"));
    assert_eq!(outcome.job_id.as_deref(), Some("job-1"));
    assert_eq!(outcome.contact_id.as_deref(), Some("contact-1"));
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.user_message, PipelineConfig::default().success_message);

    let requests = server.received_requests().await.unwrap();
    let contact = requests
        .iter()
        .find(|r| r.url.path() == "/jobcontact.json")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&contact.body).unwrap();
    assert_eq!(body["mobile"], "0412345678");
    assert_eq!(body["type"], "JOB");
}

#[tokio::test]
async fn test_validation_failure_makes_no_network_calls() {
    let server = MockServer::start().await;

    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(
            &submission(&[("email", "nobody@example.com")]),
            &pipeline_config(),
            &global_settings(),
        )
        .await;

    assert!(!outcome.is_success());
    assert!(matches!(
        outcome.error.as_ref().map(AppError::root),
        Some(AppError::Validation(_))
    ));
    assert_eq!(outcome.user_message, PipelineConfig::default().error_message);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_credential_is_configuration_error() {
    let server = MockServer::start().await;
    let settings = GlobalSettings {
        api_key: String::new(),
        ..global_settings()
    };

    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(&ada(), &pipeline_config(), &settings)
        .await;

    assert!(matches!(
        outcome.error.as_ref().map(AppError::root),
        Some(AppError::Configuration(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_name_conflict_reuses_existing_company() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(name_taken())
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/company.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"uuid": "company-other", "name": "Someone Else"},
            {"uuid": "company-ada", "name": "ADA LOVELACE"}
        ])))
        .mount(&server)
        .await;
    mount_job_and_contact(&server).await;

    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(&ada(), &pipeline_config(), &global_settings())
        .await;

    assert!(outcome.is_success());
    assert!(matches!(
        outcome.company,
        Some(CompanyResolution::ReusedByName(ref id)) if id == "company-ada"
    ));
    assert_eq!(requests_to(&server, "GET", "/company.json").await, 1);
}

#[tokio::test]
async fn test_name_conflict_without_match_creates_disambiguated_company() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(name_taken())
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(created("company-new"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/company.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    mount_job_and_contact(&server).await;

    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(&ada(), &pipeline_config(), &global_settings())
        .await;

    assert!(outcome.is_success());
    assert_eq!(requests_to(&server, "POST", "/company.json").await, 2);
    assert_eq!(requests_to(&server, "GET", "/company.json").await, 1);

    match outcome.company {
        Some(CompanyResolution::CreatedDisambiguated { ref id, ref name }) => {
            assert_eq!(id, "company-new");
            assert!(name.starts_with("Ada Lovelace ("));
            assert!(name.ends_with(')'));
        }
        ref other => panic!("unexpected company resolution: {:?}", other),
    }
}

#[tokio::test]
async fn test_second_conflict_is_fatal_and_skips_job() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(name_taken())
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/company.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/job.json"))
        .respond_with(created("job-1"))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(&ada(), &pipeline_config(), &global_settings())
        .await;

    assert!(!outcome.is_success());
    assert!(matches!(
        outcome.error.as_ref().map(AppError::root),
        Some(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_email_search_stops_at_first_match() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/company.json"))
        .and(query_param("$skip", "0"))
        .and(query_param("$top", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(companies(100, 0)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/company.json"))
        .and(query_param("$skip", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(companies(100, 100)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/company.json"))
        .and(query_param("$skip", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(companies(100, 200)))
        .expect(0)
        .mount(&server)
        .await;

    let client = ServiceM8Client::new(server.uri(), API_KEY).unwrap();
    let found = find_company_by_email(&client, "  CUSTOMER150@Example.com ").await;

    assert_eq!(found.map(|c| c.uuid), Some("company-150".to_string()));
}

#[tokio::test]
async fn test_email_search_stops_at_short_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/company.json"))
        .and(query_param("$skip", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(companies(100, 0)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/company.json"))
        .and(query_param("$skip", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(companies(7, 100)))
        .expect(1)
        .mount(&server)
        .await;

    let client = ServiceM8Client::new(server.uri(), API_KEY).unwrap();
    assert!(find_company_by_email(&client, "missing@example.com")
        .await
        .is_none());
    assert_eq!(requests_to(&server, "GET", "/company.json").await, 2);
}

#[tokio::test]
async fn test_duplicate_check_uses_existing_company() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/company.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"uuid": "company-ada", "name": "Ada L", "email": "Ada@Example.com"}
        ])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(created("company-new"))
        .expect(0)
        .mount(&server)
        .await;
    mount_job_and_contact(&server).await;

    let config = PipelineConfig {
        check_duplicates: true,
        ..pipeline_config()
    };
    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(&ada(), &config, &global_settings())
        .await;

    assert!(outcome.is_success());
    assert!(matches!(
        outcome.company,
        Some(CompanyResolution::ExistingByEmail(ref id)) if id == "company-ada"
    ));
}

#[tokio::test]
async fn test_contact_failure_is_a_warning() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(created("company-1"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/job.json"))
        .respond_with(created("job-1"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jobcontact.json"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(&ada(), &pipeline_config(), &global_settings())
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.job_id.as_deref(), Some("job-1"));
    assert!(outcome.contact_id.is_none());
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("contact"));
}

#[tokio::test]
async fn test_rate_limited_job_create_uses_busy_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(created("company-1"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/job.json"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jobcontact.json"))
        .respond_with(created("contact-1"))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(&ada(), &pipeline_config(), &global_settings())
        .await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.user_message, RATE_LIMITED_MESSAGE);
    assert!(outcome.error.as_ref().is_some_and(AppError::is_rate_limited));
}

#[tokio::test]
async fn test_lead_source_badge_is_attached_to_job() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/badge.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"uuid": "badge-fb", "name": "Facebook Lead"},
            {"uuid": "badge-g", "name": "Google Ads"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(created("company-1"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/job.json"))
        .and(body_string_contains(r#""badges":"[\"badge-g\"]""#))
        .respond_with(created("job-1"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jobcontact.json"))
        .respond_with(created("contact-1"))
        .mount(&server)
        .await;

    let config = PipelineConfig {
        lead_source_field: "source".to_string(),
        badge_mapping_text: "facebook|Facebook Lead\ngoogle|Google Ads".to_string(),
        ..pipeline_config()
    };
    let sub = submission(&[("first", "Ada"), ("source", "google")]);

    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(&sub, &config, &global_settings())
        .await;

    assert!(outcome.is_success(), "unexpected error: {:?}", outcome.error);
}

#[tokio::test]
async fn test_badge_cache_refetches_after_expiry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/badge.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{"uuid": "badge-1", "name": "Website Enquiry"}])),
        )
        .mount(&server)
        .await;

    let client = ServiceM8Client::new(server.uri(), API_KEY).unwrap();
    let cache = BadgeCache::new(Duration::from_millis(200), true);

    assert_eq!(cache.get_badges(&client).await.len(), 1);
    assert_eq!(cache.get_badges(&client).await.len(), 1);
    assert_eq!(requests_to(&server, "GET", "/badge.json").await, 1);

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(cache.get_badges(&client).await.len(), 1);
    assert_eq!(requests_to(&server, "GET", "/badge.json").await, 2);
}

#[tokio::test]
async fn test_badge_cache_is_per_credential_and_skips_failures() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/badge.json"))
        .and(header("X-API-Key", "broken_key_0000"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/badge.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let cache = BadgeCache::new(Duration::from_secs(3600), true);
    let good = ServiceM8Client::new(server.uri(), API_KEY).unwrap();
    let broken = ServiceM8Client::new(server.uri(), "broken_key_0000").unwrap();

    cache.get_badges(&good).await;
    cache.get_badges(&broken).await;
    cache.get_badges(&broken).await;
    cache.get_badges(&good).await;

    // one fetch for the good key, two uncached failures for the broken one
    assert_eq!(requests_to(&server, "GET", "/badge.json").await, 3);

    cache.invalidate(API_KEY).await;
    cache.get_badges(&good).await;
    assert_eq!(requests_to(&server, "GET", "/badge.json").await, 4);
}

#[tokio::test]
async fn test_oversized_file_is_skipped_while_sibling_uploads() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(created("company-1"))
        .mount(&server)
        .await;
    mount_job_and_contact(&server).await;

    Mock::given(method("POST"))
        .and(path("/Attachment.json"))
        .and(body_string_contains("\"attachment_name\":\"notes.txt\""))
        .and(body_string_contains("\"file_type\":\".txt\""))
        .respond_with(created("att-1"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/Attachment/att-1.file"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryFileStore::default()
        .with_file("plans.pdf", MAX_FILE_SIZE + 1, b"")
        .with_file("notes.txt", 5, b"hello");

    let config = PipelineConfig {
        attachment_field: "files".to_string(),
        ..pipeline_config()
    };
    let mut sub = ada();
    sub.data.insert(
        "files".to_string(),
        SubmissionValue::Many(vec![
            SubmissionValue::Text("plans.pdf".to_string()),
            SubmissionValue::Text("notes.txt".to_string()),
            SubmissionValue::Text("missing.png".to_string()),
        ]),
    );

    let outcome = pipeline_for(&server, store)
        .process(&sub, &config, &global_settings())
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attachments.len(), 3);
    assert!(matches!(
        outcome.attachments[0],
        AttachmentOutcome::Skipped { .. }
    ));
    assert!(outcome.attachments[1].is_uploaded());
    assert!(matches!(
        outcome.attachments[2],
        AttachmentOutcome::Skipped { .. }
    ));
    assert_eq!(outcome.warnings.len(), 2);
}

#[tokio::test]
async fn test_pipeline_override_credential_is_used() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .and(header("X-API-Key", "override_key_42"))
        .respond_with(created("company-1"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/job.json"))
        .and(body_string_contains("\"status\":\"Work Order\""))
        .respond_with(created("job-1"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/jobcontact.json"))
        .respond_with(created("contact-1"))
        .mount(&server)
        .await;

    let config = PipelineConfig {
        use_global: Some(false),
        credential_override: "override_key_42".to_string(),
        default_status_override: "Work Order".to_string(),
        ..pipeline_config()
    };

    let outcome = pipeline_for(&server, MemoryFileStore::default())
        .process(&ada(), &config, &global_settings())
        .await;

    assert!(outcome.is_success(), "unexpected error: {:?}", outcome.error);
}

const ADMIN_TOKEN: &str = "admin-secret-token";

fn app_state(server: &MockServer) -> Arc<AppState> {
    let settings = global_settings();
    let config = Config {
        port: 0,
        base_url: server.uri(),
        settings: settings.clone(),
        pipelines_path: None,
        uploads_dir: std::env::temp_dir(),
        admin_token: Some(ADMIN_TOKEN.to_string()),
    };
    let mut pipelines = HashMap::new();
    pipelines.insert("contact".to_string(), pipeline_config());

    Arc::new(AppState {
        config,
        settings: RwLock::new(settings),
        pipelines,
        pipeline: pipeline_for(server, MemoryFileStore::default()),
    })
}

fn admin_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-admin-token", token.parse().unwrap());
    headers
}

fn settings_update(api_key: &str) -> SettingsUpdate {
    SettingsUpdate {
        api_key: api_key.to_string(),
        default_job_status: None,
        debug: None,
    }
}

fn submission_request(pairs: &[(&str, &str)]) -> SubmissionRequest {
    SubmissionRequest {
        id: Some("sub-http".to_string()),
        data: submission(pairs).data,
    }
}

async fn submit(
    state: &Arc<AppState>,
    request: SubmissionRequest,
) -> (StatusCode, handlers::SubmissionResponse) {
    let (status, Json(body)) = handlers::submit(
        State(state.clone()),
        Path("contact".to_string()),
        Ok(Json(request)),
    )
    .await;
    (status, body)
}

#[tokio::test]
async fn test_settings_update_requires_admin_token() {
    let server = MockServer::start().await;
    let state = app_state(&server);

    let missing = handlers::update_settings(
        State(state.clone()),
        HeaderMap::new(),
        Json(settings_update("new_api_key_456")),
    )
    .await;
    assert!(matches!(missing, Err(AppError::Unauthorized(_))));

    let wrong = handlers::update_settings(
        State(state.clone()),
        admin_headers("not-the-token"),
        Json(settings_update("new_api_key_456")),
    )
    .await;
    assert!(matches!(wrong, Err(AppError::Unauthorized(_))));

    assert_eq!(state.settings.read().await.api_key, API_KEY);
}

#[tokio::test]
async fn test_settings_update_rejects_malformed_key() {
    let server = MockServer::start().await;
    let state = app_state(&server);

    let result = handlers::update_settings(
        State(state.clone()),
        admin_headers(ADMIN_TOKEN),
        Json(settings_update("short")),
    )
    .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert_eq!(state.settings.read().await.api_key, API_KEY);
}

#[tokio::test]
async fn test_credential_change_drops_previous_badge_cache_entry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/badge.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{"uuid": "badge-1", "name": "Google Ads"}])),
        )
        .mount(&server)
        .await;

    let state = app_state(&server);
    let previous = state.pipeline.client_for(API_KEY);
    let cache = state.pipeline.badge_cache();

    cache.get_badges(&previous).await;
    cache.get_badges(&previous).await;
    assert_eq!(requests_to(&server, "GET", "/badge.json").await, 1);

    let Json(body) = handlers::update_settings(
        State(state.clone()),
        admin_headers(ADMIN_TOKEN),
        Json(SettingsUpdate {
            api_key: "new_api_key_456".to_string(),
            default_job_status: Some("Work Order".to_string()),
            debug: Some(true),
        }),
    )
    .await
    .unwrap();

    assert_eq!(body["badge_cache_cleared"], true);
    assert_eq!(body["default_job_status"], "Work Order");
    {
        let settings = state.settings.read().await;
        assert_eq!(settings.api_key, "new_api_key_456");
        assert!(settings.debug);
    }

    cache.get_badges(&previous).await;
    assert_eq!(requests_to(&server, "GET", "/badge.json").await, 2);
}

#[tokio::test]
async fn test_submit_returns_job_on_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(created("company-1"))
        .mount(&server)
        .await;
    mount_job_and_contact(&server).await;

    let state = app_state(&server);
    let (status, body) = submit(&state, submission_request(&[("first", "Ada")])).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.success);
    assert_eq!(body.job_id.as_deref(), Some("job-1"));
    assert_eq!(body.submission_id.as_deref(), Some("sub-http"));
}

#[tokio::test]
async fn test_submit_maps_validation_failure_to_422() {
    let server = MockServer::start().await;
    let state = app_state(&server);

    let (status, body) = submit(&state, submission_request(&[("email", "a@example.com")])).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!body.success);
    assert_eq!(body.message, PipelineConfig::default().error_message);
    assert!(body.job_id.is_none());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_maps_rate_limit_to_429() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let state = app_state(&server);
    let (status, body) = submit(&state, submission_request(&[("first", "Ada")])).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(!body.success);
    assert_eq!(body.message, RATE_LIMITED_MESSAGE);
}

#[tokio::test]
async fn test_submit_maps_remote_failure_to_502() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let state = app_state(&server);
    let (status, body) = submit(&state, submission_request(&[("first", "Ada")])).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body.success);
    assert_eq!(body.message, PipelineConfig::default().error_message);
    assert!(!body.message.contains("internal"));
}

#[tokio::test]
async fn test_submit_answers_unreadable_body_with_error_message() {
    let server = MockServer::start().await;
    let state = app_state(&server);

    let request = Request::builder()
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"data": ["not", "a", "map"]}"#))
        .unwrap();
    let rejection = Json::<SubmissionRequest>::from_request(request, &())
        .await
        .unwrap_err();

    let (status, Json(body)) = handlers::submit(
        State(state.clone()),
        Path("contact".to_string()),
        Err(rejection),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!body.success);
    assert_eq!(body.message, PipelineConfig::default().error_message);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_accepts_null_and_decimal_fields() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/company.json"))
        .respond_with(created("company-1"))
        .mount(&server)
        .await;
    mount_job_and_contact(&server).await;

    let request = Request::builder()
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"data": {"first": "Ada", "mobile": null, "qty": 2.5}}"#,
        ))
        .unwrap();
    let extracted = Json::<SubmissionRequest>::from_request(request, &()).await;
    assert!(extracted.is_ok());

    let state = app_state(&server);
    let (status, Json(body)) = handlers::submit(
        State(state.clone()),
        Path("contact".to_string()),
        extracted,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.success);
}

#[tokio::test]
async fn test_badge_list_with_unnamed_entries_is_cached_and_resolved() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/badge.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"uuid": "badge-blank", "name": null},
            {"uuid": "badge-g", "name": "Google Ads"}
        ])))
        .mount(&server)
        .await;

    let client = ServiceM8Client::new(server.uri(), API_KEY).unwrap();
    let cache = BadgeCache::new(Duration::from_secs(3600), true);
    let mapping = "google|Google Ads";

    let first = resolve_badge(&cache, &client, "google", mapping).await;
    let second = resolve_badge(&cache, &client, "google", mapping).await;

    assert_eq!(first.as_deref(), Some("badge-g"));
    assert_eq!(second.as_deref(), Some("badge-g"));
    assert_eq!(requests_to(&server, "GET", "/badge.json").await, 1);
}
