use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tasklane_shared::{
    ChatReply, ChatRequest, Credentials, ErrorBody, Task, TaskCreate, TaskPage, TaskPatch,
    TokenResponse,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::session::{Navigator, Route, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the base URL, query string included.
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Moves one request to the backend and back. Errors mean no response arrived.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client for task backend")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, url.as_str())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = request.bearer.as_deref() {
            builder = builder.header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = request.body.as_ref() {
            let payload = serde_json::to_vec(body)
                .map_err(|err| ApiError::Unknown(format!("failed to encode request: {err}")))?;
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                ApiError::Network(format!("request to {url} timed out"))
            } else {
                ApiError::Network(err.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| ApiError::Network(format!("failed reading response body: {err}")))?;
        Ok(HttpResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Anonymous,
    Authenticated,
}

/// The one configured client every outbound call goes through.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    session: Session,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Session,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            transport,
            session,
            navigator,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<TokenResponse, ApiError> {
        self.send_json(Method::Post, "/auth/signin".to_string(), Some(credentials), Access::Anonymous)
            .await
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<TokenResponse, ApiError> {
        self.send_json(Method::Post, "/auth/signup".to_string(), Some(credentials), Access::Anonymous)
            .await
    }

    #[instrument(skip(self, request), fields(turns = request.messages.len()))]
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        self.send_json(Method::Post, "/chat".to_string(), Some(request), Access::Authenticated)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_tasks(
        &self,
        user_id: &str,
        page: u64,
        page_size: u64,
    ) -> Result<TaskPage, ApiError> {
        let path = format!("{}?page={page}&page_size={page_size}", tasks_path(user_id));
        self.send_json::<(), _>(Method::Get, path, None, Access::Authenticated)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_task(&self, user_id: &str, task_id: &str) -> Result<Task, ApiError> {
        self.send_json::<(), _>(
            Method::Get,
            task_path(user_id, task_id),
            None,
            Access::Authenticated,
        )
        .await
    }

    #[instrument(skip(self, create), fields(title_len = create.title.len()))]
    pub async fn create_task(&self, user_id: &str, create: &TaskCreate) -> Result<Task, ApiError> {
        self.send_json(Method::Post, tasks_path(user_id), Some(create), Access::Authenticated)
            .await
    }

    #[instrument(skip(self, patch))]
    pub async fn update_task(
        &self,
        user_id: &str,
        task_id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, ApiError> {
        self.send_json(
            Method::Patch,
            task_path(user_id, task_id),
            Some(patch),
            Access::Authenticated,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, user_id: &str, task_id: &str) -> Result<(), ApiError> {
        self.execute(
            Method::Delete,
            task_path(user_id, task_id),
            None,
            Access::Authenticated,
        )
        .await
        .map(|_| ())
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        path: String,
        body: Option<&B>,
        access: Access,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| ApiError::Unknown(format!("failed to encode request: {err}")))?;
        let response = self.execute(method, path, body, access).await?;
        serde_json::from_str(&response.body).map_err(|err| {
            warn!(error = %err, "response body did not match the expected shape");
            ApiError::Unknown(format!("invalid response from server: {err}"))
        })
    }

    async fn execute(
        &self,
        method: Method,
        path: String,
        body: Option<Value>,
        access: Access,
    ) -> Result<HttpResponse, ApiError> {
        let request_id = Uuid::new_v4();
        let request = HttpRequest {
            method,
            path,
            bearer: self.session.token(),
            body,
        };
        debug!(
            %request_id,
            method = method.as_str(),
            path = %request.path,
            has_bearer = request.bearer.is_some(),
            "sending request"
        );

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                error!(%request_id, error = %err, "no response from server");
                return Err(err);
            }
        };

        if response.is_success() {
            debug!(%request_id, status = response.status, "request succeeded");
            return Ok(response);
        }

        let payload: ErrorBody = serde_json::from_str(&response.body).unwrap_or_default();
        let message = payload.message();

        if response.status == 401 && access == Access::Authenticated {
            warn!(%request_id, "authenticated request rejected; signing out");
            self.session.clear();
            self.navigator.navigate(Route::SignIn);
            return Err(ApiError::Unauthorized { message });
        }

        info!(
            %request_id,
            status = response.status,
            code = ?payload.code(),
            "server rejected request"
        );
        Err(ApiError::ServerRejected {
            status: response.status,
            code: payload.code(),
            message,
        })
    }
}

fn tasks_path(user_id: &str) -> String {
    format!("/users/{}/tasks", urlencoding::encode(user_id))
}

fn task_path(user_id: &str, task_id: &str) -> String {
    format!("{}/{}", tasks_path(user_id), urlencoding::encode(task_id))
}
