use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use assess_core::model::{Assessment, AssessmentId, AssessmentSummary, TestType};

use crate::client::{AssessmentBackend, BackendError, Submission, SubmissionReceipt};

mod wire;

use wire::{AssessmentDto, ErrorDto, HistoryItemDto};

const DEFAULT_BASE_URL: &str = "http://localhost:8001";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Connection settings for the REST backend.
#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl HttpConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.trim().is_empty()).then_some(token);
        self
    }

    /// Read `ASSESS_API_URL`, `ASSESS_API_TOKEN` and `ASSESS_HTTP_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = env::var("ASSESS_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let mut config = Self::new(base_url);
        if let Ok(token) = env::var("ASSESS_API_TOKEN") {
            config = config.with_token(token);
        }
        if let Some(secs) = env::var("ASSESS_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// `AssessmentBackend` talking JSON over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: HttpConfig,
}

impl HttpBackend {
    /// Build a client for the given settings.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Transport` if the HTTP client cannot be constructed.
    pub fn new(config: HttpConfig) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.config.api_url(path));
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn error_from_response(response: Response) -> BackendError {
    let status = response.status();
    let detail = match response.json::<ErrorDto>().await {
        Ok(body) => body.message(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned(),
    };
    warn!(%status, %detail, "backend request rejected");
    match status {
        StatusCode::NOT_FOUND => BackendError::NotFound,
        StatusCode::FORBIDDEN => BackendError::Forbidden(detail),
        _ => BackendError::Status { status, detail },
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

#[async_trait]
impl AssessmentBackend for HttpBackend {
    async fn start_assessment(&self, test_type: &TestType) -> Result<Assessment, BackendError> {
        debug!(test_type = %test_type, "starting assessment");
        let response = self
            .request(Method::POST, "/assessments/start")
            .query(&[("test_type", test_type.as_str())])
            .send()
            .await?;
        read_json::<AssessmentDto>(response).await?.into_assessment()
    }

    async fn fetch_assessment(&self, id: &AssessmentId) -> Result<Assessment, BackendError> {
        debug!(assessment_id = %id, "fetching assessment");
        let response = self
            .request(Method::GET, &format!("/assessments/{id}"))
            .send()
            .await?;
        read_json::<AssessmentDto>(response).await?.into_assessment()
    }

    async fn submit_assessment(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionReceipt, BackendError> {
        debug!(
            assessment_id = %submission.assessment_id,
            answers = submission.answers.len(),
            "submitting assessment"
        );
        let response = self
            .request(Method::POST, "/assessments/submit")
            .json(submission)
            .send()
            .await?;
        read_json(response).await
    }

    async fn assessment_history(&self) -> Result<Vec<AssessmentSummary>, BackendError> {
        let response = self
            .request(Method::GET, "/assessments/history")
            .send()
            .await?;
        let items: Vec<HistoryItemDto> = read_json(response).await?;
        Ok(items.into_iter().map(HistoryItemDto::into_summary).collect())
    }
}
