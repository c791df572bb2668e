//! REST implementation of the phase gateway.
//!
//! Talks to the workflow API under a configurable base URL:
//!
//! - `GET  /workflow/{project}/status`
//! - `PUT  /workflow/{project}/phase/{phase}`
//! - `POST /workflow/{project}/phase/{phase}/complete`
//! - `GET  /workflow/{project}/phase/{phase}[/deliverables]`
//! - `POST /workflow/{project}/phase/{phase}/{request-approval|approve|reject}`
//!
//! Successful responses wrap their payload in `{ "data": ... }`. Failures are
//! non-2xx with an optional `{ "message": ... }` body.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::gateway::{PhaseDetails, PhaseGateway, WorkflowStatus};
use crate::workflow::{CompletionMap, Deliverable, PhaseId, WorkflowError, WorkflowResult};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `{ "data": ... }` response wrapper.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// `completedPhases` as either a list of ids or an id -> bool object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CompletedPhases {
    List(Vec<PhaseId>),
    Map(BTreeMap<PhaseId, bool>),
}

impl CompletedPhases {
    fn into_map(self) -> CompletionMap {
        match self {
            Self::List(ids) => ids.into_iter().map(|id| (id, true)).collect(),
            Self::Map(map) => map,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    #[serde(default)]
    active_phase_id: Option<PhaseId>,
    #[serde(default)]
    completed_phases: Option<CompletedPhases>,
}

/// Deliverables as a bare list or under a `deliverables` key.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeliverablesPayload {
    List(Vec<Deliverable>),
    Wrapped { deliverables: Vec<Deliverable> },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Why a request failed, before it is mapped to a load or transition error.
#[derive(Debug)]
struct RequestFailure {
    message: String,
    server_message: Option<String>,
}

impl RequestFailure {
    fn into_load(self) -> WorkflowError {
        WorkflowError::Load { message: self.message, server_message: self.server_message }
    }

    fn into_transition(self) -> WorkflowError {
        WorkflowError::Transition { message: self.message, server_message: self.server_message }
    }
}

impl From<reqwest::Error> for RequestFailure {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            "Request timed out".to_string()
        } else if e.is_connect() {
            format!("Connection failed: {e}")
        } else if e.is_decode() {
            format!("Invalid response body: {e}")
        } else {
            format!("HTTP request failed: {e}")
        };
        Self { message, server_message: None }
    }
}

/// Phase gateway backed by the workflow REST API.
#[derive(Debug, Clone)]
pub struct HttpPhaseGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPhaseGateway {
    /// Create a gateway for `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a gateway with a custom per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("phaseflow/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url, token: None })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL for a project's workflow resource, with `segments` appended.
    pub fn url(&self, project_id: &str, segments: &[&str]) -> String {
        let mut url = format!("{}/workflow/{}", self.base_url, urlencoding::encode(project_id));
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    fn phase_url(&self, project_id: &str, phase: &PhaseId, action: Option<&str>) -> String {
        match action {
            Some(action) => self.url(project_id, &["phase", phase.as_str(), action]),
            None => self.url(project_id, &["phase", phase.as_str()]),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and check the status, reading the error body on failure.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RequestFailure> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let server_message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message)
            .filter(|m| !m.trim().is_empty());

        tracing::debug!(status = %status, server_message = ?server_message, "Workflow API returned an error");
        Err(RequestFailure { message: format!("HTTP {status}"), server_message })
    }

    async fn get_data<T: DeserializeOwned>(&self, url: &str) -> WorkflowResult<T> {
        tracing::debug!(url, "GET");
        let result = async {
            let response = self.send(self.client.get(url)).await?;
            let envelope: Envelope<T> = response.json().await?;
            Ok::<_, RequestFailure>(envelope.data)
        }
        .await;
        result.map_err(RequestFailure::into_load)
    }

    async fn write(&self, request: reqwest::RequestBuilder) -> WorkflowResult<()> {
        self.send(request).await.map(|_| ()).map_err(RequestFailure::into_transition)
    }
}

#[async_trait]
impl PhaseGateway for HttpPhaseGateway {
    async fn fetch_status(&self, project_id: &str) -> WorkflowResult<WorkflowStatus> {
        let url = self.url(project_id, &["status"]);
        let payload: Option<StatusPayload> = self.get_data(&url).await?;
        let payload = payload.unwrap_or_default();

        Ok(WorkflowStatus::new(
            payload.active_phase_id,
            payload.completed_phases.map(CompletedPhases::into_map).unwrap_or_default(),
        ))
    }

    async fn set_active_phase(&self, project_id: &str, phase: &PhaseId) -> WorkflowResult<()> {
        let url = self.phase_url(project_id, phase, None);
        tracing::debug!(url = %url, "PUT");
        self.write(self.client.put(&url).json(&serde_json::json!({ "phase": phase }))).await
    }

    async fn mark_completed(&self, project_id: &str, phase: &PhaseId) -> WorkflowResult<()> {
        let url = self.phase_url(project_id, phase, Some("complete"));
        tracing::debug!(url = %url, "POST");
        self.write(self.client.post(&url)).await
    }

    async fn phase_details(
        &self,
        project_id: &str,
        phase: &PhaseId,
    ) -> WorkflowResult<PhaseDetails> {
        self.get_data(&self.phase_url(project_id, phase, None)).await
    }

    async fn phase_deliverables(
        &self,
        project_id: &str,
        phase: &PhaseId,
    ) -> WorkflowResult<Vec<Deliverable>> {
        let url = self.phase_url(project_id, phase, Some("deliverables"));
        let payload: DeliverablesPayload = self.get_data(&url).await?;
        Ok(match payload {
            DeliverablesPayload::List(items) | DeliverablesPayload::Wrapped { deliverables: items } => {
                items
            }
        })
    }

    async fn request_approval(
        &self,
        project_id: &str,
        phase: &PhaseId,
        comment: Option<&str>,
    ) -> WorkflowResult<()> {
        let url = self.phase_url(project_id, phase, Some("request-approval"));
        tracing::debug!(url = %url, "POST");
        self.write(self.client.post(&url).json(&serde_json::json!({ "comment": comment }))).await
    }

    async fn approve_phase(
        &self,
        project_id: &str,
        phase: &PhaseId,
        comment: Option<&str>,
    ) -> WorkflowResult<()> {
        let url = self.phase_url(project_id, phase, Some("approve"));
        tracing::debug!(url = %url, "POST");
        self.write(self.client.post(&url).json(&serde_json::json!({ "comment": comment }))).await
    }

    async fn reject_phase(
        &self,
        project_id: &str,
        phase: &PhaseId,
        reason: Option<&str>,
    ) -> WorkflowResult<()> {
        let url = self.phase_url(project_id, phase, Some("reject"));
        tracing::debug!(url = %url, "POST");
        self.write(self.client.post(&url).json(&serde_json::json!({ "reason": reason }))).await
    }

    fn name(&self) -> &str {
        "http"
    }
}
