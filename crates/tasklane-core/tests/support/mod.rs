#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tasklane_core::client::{ApiClient, HttpRequest, HttpResponse, Transport};
use tasklane_core::error::ApiError;
use tasklane_core::session::{RecordingNavigator, Session};
use tasklane_shared::Task;
use tokio::sync::oneshot;

struct Scripted {
    gate: Option<oneshot::Receiver<()>>,
    outcome: Result<HttpResponse, ApiError>,
}

/// Answers requests from a FIFO script and remembers what was sent.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn respond(&self, status: u16, body: Value) {
        self.push(None, Ok(response(status, body)));
    }

    pub fn fail(&self, err: ApiError) {
        self.push(None, Err(err));
    }

    /// Queues a response that is only delivered once the returned sender fires.
    pub fn respond_when_released(&self, status: u16, body: Value) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(Some(rx), Ok(response(status, body)));
        tx
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.sent
            .lock()
            .last()
            .cloned()
            .expect("at least one request was sent")
    }

    fn push(&self, gate: Option<oneshot::Receiver<()>>, outcome: Result<HttpResponse, ApiError>) {
        self.script.lock().push_back(Scripted { gate, outcome });
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.sent.lock().push(request.clone());
        let next = self.script.lock().pop_front();
        let Some(Scripted { gate, outcome }) = next else {
            return Err(ApiError::Network(format!(
                "nothing scripted for {} {}",
                request.method.as_str(),
                request.path
            )));
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        outcome
    }
}

fn response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        body: body.to_string(),
    }
}

pub fn token_for(sub: &str) -> String {
    encode(
        &Header::default(),
        &json!({"sub": sub, "email": format!("{sub}@example.com"), "exp": 4102444800u64}),
        &EncodingKey::from_secret(b"backend-secret"),
    )
    .expect("encode token")
}

pub fn task(id: &str, title: &str, done: bool) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        description: None,
        is_completed: done,
        user_id: "u1".to_string(),
        created_at: None,
        updated_at: None,
    }
}

pub fn task_json(id: &str, title: &str, done: bool) -> Value {
    serde_json::to_value(task(id, title, done)).expect("task json")
}

pub fn page_json(items: Vec<Value>, total: u64, page: u64, page_size: u64, pages: u64) -> Value {
    json!({
        "items": items,
        "total": total,
        "page": page,
        "page_size": page_size,
        "total_pages": pages,
    })
}

pub fn error_json(code: &str, message: &str) -> Value {
    json!({"detail": {"code": code, "message": message}})
}

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub navigator: Arc<RecordingNavigator>,
    pub session: Session,
    pub client: ApiClient,
}

impl Harness {
    pub fn anonymous() -> Self {
        let transport = Arc::new(ScriptedTransport::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let session = Session::in_memory();
        let client = ApiClient::new(transport.clone(), session.clone(), navigator.clone());
        Self {
            transport,
            navigator,
            session,
            client,
        }
    }

    pub fn signed_in(sub: &str) -> Self {
        let harness = Self::anonymous();
        harness
            .session
            .set_token(token_for(sub))
            .expect("store token");
        harness
    }
}
