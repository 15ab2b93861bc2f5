use std::future::Future;

use learn_types::{
    AttemptHeartbeatRequest, AttemptStartRequest, AttemptStatus, Course, DashboardSnapshot,
    LearningRecommendation, LessonCompletionRequest, LessonCompletionResponse, LessonId,
    ModuleGate,
};
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};

use crate::config::{BackendConfig, normalize_path};
use crate::error::BackendError;

/// The REST surface of the learning backend that this crate consumes.
pub trait LearnBackend: Send + Sync + 'static {
    fn fetch_catalog(&self) -> impl Future<Output = Result<Vec<Course>, BackendError>> + Send;

    fn fetch_dashboard(
        &self,
    ) -> impl Future<Output = Result<DashboardSnapshot, BackendError>> + Send;

    fn fetch_gates(&self) -> impl Future<Output = Result<Vec<ModuleGate>, BackendError>> + Send;

    fn fetch_recommendation(
        &self,
    ) -> impl Future<Output = Result<LearningRecommendation, BackendError>> + Send;

    fn start_attempt(
        &self,
        lesson_id: LessonId,
        request: &AttemptStartRequest,
    ) -> impl Future<Output = Result<AttemptStatus, BackendError>> + Send;

    fn heartbeat_attempt(
        &self,
        lesson_id: LessonId,
        request: &AttemptHeartbeatRequest,
    ) -> impl Future<Output = Result<AttemptStatus, BackendError>> + Send;

    fn complete_lesson(
        &self,
        lesson_id: LessonId,
        request: &LessonCompletionRequest,
    ) -> impl Future<Output = Result<LessonCompletionResponse, BackendError>> + Send;
}

#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn send<B: Serialize + Sync + ?Sized>(
        &self,
        base_url: &str,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self.client.request(method, format!("{base_url}{path}"));
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await
    }

    async fn hit_backend<T: DeserializeOwned, B: Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, BackendError> {
        let path = normalize_path(path);

        let response = match self
            .send(&self.config.base_url, method.clone(), &path, body)
            .await
        {
            Ok(response) => response,
            Err(e) => match self.config.distinct_fallback() {
                Some(fallback) => {
                    log::warn!("Request to {path} failed ({e}), retrying against {fallback}");
                    self.send(fallback, method, &path, body).await?
                }
                None => return Err(e.into()),
            },
        };

        let status = response.status();
        if !status.is_success() {
            let is_json = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.contains("application/json"));
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: error_message(status.as_u16(), is_json, &text),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Pulls the human-readable message out of an error response. The backend
/// reports either `{"detail": "..."}` or a list of validation errors under
/// `detail`, each with a `msg`.
fn error_message(status: u16, is_json: bool, body: &str) -> String {
    if is_json {
        if let Ok(payload) = serde_json::from_str::<serde_json::Value>(body) {
            match payload.get("detail") {
                Some(serde_json::Value::String(detail)) => return detail.clone(),
                Some(serde_json::Value::Array(items)) => {
                    let joined = items
                        .iter()
                        .filter_map(|item| item.get("msg").and_then(|msg| msg.as_str()))
                        .filter(|msg| !msg.is_empty())
                        .collect::<Vec<_>>()
                        .join(", ");
                    if !joined.is_empty() {
                        return joined;
                    }
                }
                _ => {}
            }
        }
    }

    if body.is_empty() {
        format!("Request failed with status {status}")
    } else {
        body.to_string()
    }
}

impl LearnBackend for HttpBackend {
    async fn fetch_catalog(&self) -> Result<Vec<Course>, BackendError> {
        self.hit_backend(Method::GET, "/courses/catalog", None::<&()>)
            .await
    }

    async fn fetch_dashboard(&self) -> Result<DashboardSnapshot, BackendError> {
        self.hit_backend(Method::GET, "/users/me/dashboard", None::<&()>)
            .await
    }

    async fn fetch_gates(&self) -> Result<Vec<ModuleGate>, BackendError> {
        self.hit_backend(Method::GET, "/learning/gates", None::<&()>)
            .await
    }

    async fn fetch_recommendation(&self) -> Result<LearningRecommendation, BackendError> {
        self.hit_backend(Method::GET, "/learning/recommendation", None::<&()>)
            .await
    }

    async fn start_attempt(
        &self,
        lesson_id: LessonId,
        request: &AttemptStartRequest,
    ) -> Result<AttemptStatus, BackendError> {
        self.hit_backend(
            Method::POST,
            &format!("/learning/lessons/{lesson_id}/attempts/start"),
            Some(request),
        )
        .await
    }

    async fn heartbeat_attempt(
        &self,
        lesson_id: LessonId,
        request: &AttemptHeartbeatRequest,
    ) -> Result<AttemptStatus, BackendError> {
        self.hit_backend(
            Method::POST,
            &format!("/learning/lessons/{lesson_id}/attempts/heartbeat"),
            Some(request),
        )
        .await
    }

    async fn complete_lesson(
        &self,
        lesson_id: LessonId,
        request: &LessonCompletionRequest,
    ) -> Result<LessonCompletionResponse, BackendError> {
        self.hit_backend(
            Method::POST,
            &format!("/progress/lessons/{lesson_id}/complete"),
            Some(request),
        )
        .await
    }
}
