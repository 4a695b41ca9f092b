//! Paginated task state kept in step with the backend.
//!
//! A [`TaskStore`] is a cheap handle; clones share one state. Every list request and every
//! mutation of a given task id takes a sequence number, and a response only lands in local
//! state while it is still the newest request for that resource.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tasklane_shared::{Task, TaskCreate, TaskPatch};
use tracing::{debug, info, instrument, warn};

use crate::client::ApiClient;
use crate::error::OperationError;
use crate::session::UserContext;

pub const DEFAULT_PAGE_SIZE: u64 = 10;

const LOAD_FAILED: &str = "Failed to load tasks";
const CREATE_FAILED: &str = "Failed to create task";
const UPDATE_FAILED: &str = "Failed to update task";
const DELETE_FAILED: &str = "Failed to delete task";
const FETCH_FAILED: &str = "Failed to fetch task";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

impl Pagination {
    pub fn new(current_page: u64, page_size: u64) -> Self {
        Self {
            current_page,
            page_size,
            total_items: 0,
            total_pages: 0,
            can_go_back: false,
            can_go_forward: false,
        }
    }

    /// State after a successful page fetch. A server that reports zero pages is read as one.
    pub fn from_server(page: u64, page_size: u64, total_items: u64, total_pages: u64) -> Self {
        let total_pages = if total_pages == 0 { 1 } else { total_pages };
        Self {
            current_page: page,
            page_size,
            total_items,
            total_pages,
            can_go_back: page > 1,
            can_go_forward: page < total_pages,
        }
    }

    /// Recomputes page counts for a locally adjusted total. The cursor never moves.
    pub fn with_total_items(&self, total_items: u64) -> Self {
        let total_pages = total_items.div_ceil(self.page_size.max(1));
        Self {
            total_items,
            total_pages,
            can_go_forward: self.current_page < total_pages,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub tasks: Vec<Task>,
    pub pagination: Pagination,
    pub loading: bool,
    pub error: Option<String>,
}

/// Newest outstanding request for one task id.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    seq: u64,
    /// Completion flag last known to be on the server.
    confirmed: Option<bool>,
}

/// How a per-task response relates to the requests issued after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Latest { confirmed: Option<bool> },
    Superseded,
}

#[derive(Debug)]
struct TaskState {
    tasks: Vec<Task>,
    pagination: Pagination,
    loading: bool,
    error: Option<String>,
    next_seq: u64,
    list_seq: u64,
    task_seq: HashMap<String, InFlight>,
}

impl TaskState {
    fn new(initial_page: u64, page_size: u64) -> Self {
        Self {
            tasks: Vec::new(),
            pagination: Pagination::new(initial_page.max(1), page_size.max(1)),
            loading: false,
            error: None,
            next_seq: 0,
            list_seq: 0,
            task_seq: HashMap::new(),
        }
    }

    fn issue(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn begin_list(&mut self) -> u64 {
        let seq = self.issue();
        self.list_seq = seq;
        seq
    }

    /// Must run before any optimistic local change so the first request records the
    /// server's value.
    fn begin_task(&mut self, task_id: &str) -> u64 {
        let seq = self.issue();
        let local = self
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .map(|t| t.is_completed);
        self.task_seq
            .entry(task_id.to_string())
            .and_modify(|pending| pending.seq = seq)
            .or_insert(InFlight {
                seq,
                confirmed: local,
            });
        seq
    }

    /// Settles the response for `seq`. `echoed` is the flag the server reported, if it
    /// answered with the task.
    fn finish_task(&mut self, task_id: &str, seq: u64, echoed: Option<bool>) -> Settled {
        let Some(pending) = self.task_seq.get(task_id).copied() else {
            debug!(task_id, seq, "task response arrived after a newer one settled");
            return Settled::Superseded;
        };
        if pending.seq == seq {
            self.task_seq.remove(task_id);
            return Settled::Latest {
                confirmed: pending.confirmed,
            };
        }

        if let Some(flag) = echoed {
            self.task_seq.insert(
                task_id.to_string(),
                InFlight {
                    confirmed: Some(flag),
                    ..pending
                },
            );
        }
        debug!(task_id, seq, latest = pending.seq, "superseded task response dropped");
        Settled::Superseded
    }

    fn replace(&mut self, task: Task) {
        if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == task.id) {
            *slot = task;
        }
    }
}

#[derive(Clone)]
pub struct TaskStore {
    client: ApiClient,
    state: Arc<Mutex<TaskState>>,
}

impl TaskStore {
    pub fn new(client: ApiClient, initial_page: u64, page_size: u64) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(TaskState::new(initial_page, page_size))),
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.lock();
        TaskSnapshot {
            tasks: state.tasks.clone(),
            pagination: state.pagination.clone(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    pub fn pagination(&self) -> Pagination {
        self.state.lock().pagination.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    fn user(&self) -> Option<UserContext> {
        self.client.session().user()
    }

    /// Loads one page, replacing the local collection.
    #[instrument(skip(self))]
    pub async fn list(&self, page: u64, page_size: u64) {
        let Some(user) = self.user() else {
            debug!("no signed-in user; skipping task list");
            self.state.lock().loading = false;
            return;
        };
        let page = page.max(1);
        let page_size = page_size.max(1);

        let seq = {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
            state.begin_list()
        };

        let result = self.client.list_tasks(&user.id, page, page_size).await;

        let mut state = self.state.lock();
        if state.list_seq != seq {
            debug!(seq, latest = state.list_seq, "superseded page response dropped");
            return;
        }
        state.loading = false;

        match result {
            Ok(body) => {
                info!(page, count = body.items.len(), total = body.total, "loaded task page");
                state.tasks = body.items;
                state.pagination =
                    Pagination::from_server(page, page_size, body.total, body.total_pages);
            }
            Err(err) => {
                warn!(error = %err, "failed to load tasks");
                state.error = Some(err.user_message(LOAD_FAILED));
                state.tasks.clear();
            }
        }
    }

    pub async fn go_to_page(&self, page: u64) {
        let page_size = self.pagination().page_size;
        self.list(page, page_size).await;
    }

    pub async fn refresh(&self) {
        let Pagination {
            current_page,
            page_size,
            ..
        } = self.pagination();
        self.list(current_page, page_size).await;
    }

    /// Fetches one task without touching the local collection.
    #[instrument(skip(self))]
    pub async fn get(&self, task_id: &str) -> Result<Task, OperationError> {
        let user = self.user().ok_or_else(OperationError::unauthenticated)?;
        self.client
            .get_task(&user.id, task_id)
            .await
            .map_err(|err| OperationError::from_api(err, FETCH_FAILED))
    }

    #[instrument(skip(self, create), fields(title = %create.title))]
    pub async fn create(&self, create: TaskCreate) -> Result<Task, OperationError> {
        let user = self.user().ok_or_else(OperationError::unauthenticated)?;
        self.state.lock().error = None;

        let result = self.client.create_task(&user.id, &create).await;

        let mut state = self.state.lock();
        match result {
            Ok(task) => {
                state.tasks.insert(0, task.clone());
                let total = state.pagination.total_items + 1;
                state.pagination = state.pagination.with_total_items(total);
                info!(task_id = %task.id, total, "task created");
                Ok(task)
            }
            Err(err) => {
                let err = OperationError::from_api(err, CREATE_FAILED);
                warn!(error = %err, "failed to create task");
                state.error = Some(err.message.clone());
                Err(err)
            }
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, task_id: &str, patch: TaskPatch) -> Result<Task, OperationError> {
        let user = self.user().ok_or_else(OperationError::unauthenticated)?;
        let seq = {
            let mut state = self.state.lock();
            state.error = None;
            state.begin_task(task_id)
        };

        let result = self.client.update_task(&user.id, task_id, &patch).await;

        let mut state = self.state.lock();
        let echoed = result.as_ref().ok().map(|task| task.is_completed);
        let settled = state.finish_task(task_id, seq, echoed);
        match result {
            Ok(task) => {
                if matches!(settled, Settled::Latest { .. }) {
                    state.replace(task.clone());
                }
                info!(task_id, "task updated");
                Ok(task)
            }
            Err(err) => {
                let err = OperationError::from_api(err, UPDATE_FAILED);
                warn!(task_id, error = %err, "failed to update task");
                state.error = Some(err.message.clone());
                Err(err)
            }
        }
    }

    /// Flips completion locally, then settles on the server's copy or rolls back.
    #[instrument(skip(self))]
    pub async fn toggle_complete(&self, task_id: &str) {
        let Some(user) = self.user() else {
            debug!("no signed-in user; skipping toggle");
            return;
        };

        let (seq, previous) = {
            let mut state = self.state.lock();
            let Some(previous) = state
                .tasks
                .iter()
                .find(|t| t.id == task_id)
                .map(|t| t.is_completed)
            else {
                debug!(task_id, "toggle requested for task not on this page");
                return;
            };
            let seq = state.begin_task(task_id);
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
                task.is_completed = !previous;
            }
            (seq, previous)
        };

        let patch = TaskPatch {
            is_completed: Some(!previous),
            ..TaskPatch::default()
        };
        let result = self.client.update_task(&user.id, task_id, &patch).await;

        let mut state = self.state.lock();
        let echoed = result.as_ref().ok().map(|task| task.is_completed);
        let settled = state.finish_task(task_id, seq, echoed);
        match (result, settled) {
            (Ok(echo), Settled::Latest { .. }) => {
                debug!(task_id, completed = echo.is_completed, "toggle confirmed");
                state.replace(echo);
            }
            (Ok(_), Settled::Superseded) => {
                debug!(task_id, "toggle confirmed; a newer request owns the local flag");
            }
            (Err(err), settled) => {
                warn!(task_id, error = %err, "failed to toggle task");
                state.error = Some(err.user_message(UPDATE_FAILED));
                if let Settled::Latest { confirmed } = settled {
                    let restored = confirmed.unwrap_or(previous);
                    if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
                        task.is_completed = restored;
                    }
                    debug!(task_id, restored, "rolled back completion flag");
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, task_id: &str) -> Result<(), OperationError> {
        let Some(user) = self.user() else {
            debug!("no signed-in user; skipping delete");
            return Ok(());
        };
        let seq = self.state.lock().begin_task(task_id);

        let result = self.client.delete_task(&user.id, task_id).await;

        let mut state = self.state.lock();
        state.finish_task(task_id, seq, None);
        match result {
            Ok(()) => {
                state.tasks.retain(|t| t.id != task_id);
                let total = state.pagination.total_items.saturating_sub(1);
                state.pagination = state.pagination.with_total_items(total);
                info!(task_id, total, "task deleted");
                Ok(())
            }
            Err(err) => {
                let err = OperationError::from_api(err, DELETE_FAILED);
                warn!(task_id, error = %err, "failed to delete task");
                state.error = Some(err.message.clone());
                Err(err)
            }
        }
    }
}
