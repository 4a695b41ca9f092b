use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tasklane_shared::{ChatRequest, ChatRole, ChatTurn, FunctionCall, Task, TaskCreate, TaskPatch};
use tracing::{debug, info, instrument, warn};

use crate::client::ApiClient;
use crate::error::UNAUTHENTICATED_MESSAGE;
use crate::store::TaskStore;

pub const EMPTY_LIST_REPLY: &str = "You have no tasks yet.";
const UNKNOWN_FUNCTION_REPLY: &str = "Unknown function";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn now(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    fn turn(&self) -> ChatTurn {
        ChatTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatSnapshot {
    pub messages: Vec<ChatMessage>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    title: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    task_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    is_completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    task_id: String,
}

/// A task operation requested by the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    Create(TaskCreate),
    Update { task_id: String, patch: TaskPatch },
    Delete { task_id: String },
    List,
}

impl TaskCommand {
    /// `Ok(None)` for a function name this client does not know.
    pub fn parse(call: &FunctionCall) -> Result<Option<Self>, String> {
        let args = match &call.arguments {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        let invalid = |err: serde_json::Error| format!("invalid arguments for {}: {err}", call.name);

        let command = match call.name.as_str() {
            "create_task" => {
                let args: CreateArgs = serde_json::from_value(args).map_err(invalid)?;
                TaskCommand::Create(TaskCreate {
                    title: args.title,
                    description: args.description.unwrap_or_default(),
                })
            }
            "update_task" => {
                let args: UpdateArgs = serde_json::from_value(args).map_err(invalid)?;
                TaskCommand::Update {
                    task_id: args.task_id,
                    patch: TaskPatch {
                        title: args.title,
                        description: args.description,
                        is_completed: args.is_completed,
                    },
                }
            }
            "delete_task" => {
                let args: DeleteArgs = serde_json::from_value(args).map_err(invalid)?;
                TaskCommand::Delete {
                    task_id: args.task_id,
                }
            }
            "list_tasks" => TaskCommand::List,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

pub fn format_task_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return EMPTY_LIST_REPLY.to_string();
    }
    let lines = tasks
        .iter()
        .map(|t| {
            let done = if t.is_completed { " ✓" } else { "" };
            format!("• \"{}\" (ID: {}){done}", t.title, t.id)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You have {} task(s):\n{lines}\n\nTo update or delete a task, use the ID shown in parentheses.",
        tasks.len()
    )
}

#[derive(Debug, Default)]
struct ChatState {
    messages: Vec<ChatMessage>,
    loading: bool,
    error: Option<String>,
}

/// The assistant transcript. Function calls from the backend run against the shared
/// [`TaskStore`].
#[derive(Clone)]
pub struct ChatSession {
    client: ApiClient,
    store: TaskStore,
    state: Arc<Mutex<ChatState>>,
}

impl ChatSession {
    pub fn new(client: ApiClient, store: TaskStore) -> Self {
        Self {
            client,
            store,
            state: Arc::new(Mutex::new(ChatState::default())),
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let state = self.state.lock();
        ChatSnapshot {
            messages: state.messages.clone(),
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().messages.clone()
    }

    pub fn clear_messages(&self) {
        let mut state = self.state.lock();
        state.messages.clear();
        state.error = None;
        debug!("chat transcript cleared");
    }

    fn push(&self, role: ChatRole, content: impl Into<String>) {
        self.state.lock().messages.push(ChatMessage::now(role, content));
    }

    #[instrument(skip(self, content), fields(content_len = content.len()))]
    pub async fn send(&self, content: &str) {
        let Some(user) = self.client.session().user() else {
            warn!("chat message dropped; no signed-in user");
            self.state.lock().error = Some(UNAUTHENTICATED_MESSAGE.to_string());
            return;
        };

        let request = {
            let mut state = self.state.lock();
            state.messages.push(ChatMessage::now(ChatRole::User, content));
            state.loading = true;
            state.error = None;
            ChatRequest {
                messages: state.messages.iter().map(ChatMessage::turn).collect(),
                user_id: user.id.clone(),
            }
        };

        match self.client.chat(&request).await {
            Ok(reply) => {
                if let Some(call) = reply.function_call {
                    info!(function = %call.name, "assistant requested a task operation");
                    let outcome = self.dispatch(&call).await;
                    self.push(ChatRole::Assistant, outcome);
                } else if let Some(message) = reply.message.filter(|m| !m.is_empty()) {
                    self.push(ChatRole::Assistant, message);
                } else {
                    debug!("assistant reply carried no content");
                }
            }
            Err(err) => {
                warn!(error = %err, "chat request failed");
                let text = err.to_string();
                let mut state = self.state.lock();
                state.messages.push(ChatMessage::now(
                    ChatRole::Assistant,
                    format!("Sorry, I encountered an error: {text}"),
                ));
                state.error = Some(text);
            }
        }

        self.state.lock().loading = false;
    }

    async fn dispatch(&self, call: &FunctionCall) -> String {
        let command = match TaskCommand::parse(call) {
            Ok(Some(command)) => command,
            Ok(None) => {
                warn!(function = %call.name, "assistant requested an unknown function");
                return UNKNOWN_FUNCTION_REPLY.to_string();
            }
            Err(message) => return format!("❌ Error: {message}"),
        };

        let outcome = match command {
            TaskCommand::Create(create) => self
                .store
                .create(create)
                .await
                .map(|task| format!("✅ Task created: \"{}\"", task.title)),
            TaskCommand::Update { task_id, patch } => self
                .store
                .update(&task_id, patch)
                .await
                .map(|task| format!("✅ Task updated: \"{}\"", task.title)),
            TaskCommand::Delete { task_id } => self
                .store
                .delete(&task_id)
                .await
                .map(|()| "✅ Task deleted successfully".to_string()),
            TaskCommand::List => Ok(format_task_list(&self.store.tasks())),
        };

        outcome.unwrap_or_else(|err| format!("❌ Error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(name: &str, arguments: Value) -> FunctionCall {
        FunctionCall {
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn create_defaults_missing_description() {
        let parsed = TaskCommand::parse(&call("create_task", json!({"title": "Buy milk"})))
            .expect("valid args");
        assert_eq!(
            parsed,
            Some(TaskCommand::Create(TaskCreate {
                title: "Buy milk".to_string(),
                description: String::new(),
            }))
        );
    }

    #[test]
    fn update_keeps_only_supplied_fields() {
        let parsed = TaskCommand::parse(&call(
            "update_task",
            json!({"task_id": "t9", "is_completed": true}),
        ))
        .expect("valid args");
        let Some(TaskCommand::Update { task_id, patch }) = parsed else {
            panic!("expected update command");
        };
        assert_eq!(task_id, "t9");
        assert_eq!(patch.is_completed, Some(true));
        assert!(patch.title.is_none());
    }

    #[test]
    fn list_accepts_null_arguments_and_unknown_is_none() {
        assert_eq!(
            TaskCommand::parse(&call("list_tasks", Value::Null)).expect("list"),
            Some(TaskCommand::List)
        );
        assert_eq!(
            TaskCommand::parse(&call("archive_task", json!({}))).expect("unknown"),
            None
        );
    }

    #[test]
    fn missing_task_id_is_an_error() {
        let err = TaskCommand::parse(&call("delete_task", json!({}))).expect_err("missing id");
        assert!(err.starts_with("invalid arguments for delete_task"));
    }

    #[test]
    fn task_list_marks_completed_entries() {
        let tasks = vec![
            Task {
                id: "a1".to_string(),
                title: "Write report".to_string(),
                description: None,
                is_completed: false,
                user_id: "u1".to_string(),
                created_at: None,
                updated_at: None,
            },
            Task {
                id: "b2".to_string(),
                title: "Call bank".to_string(),
                description: Some("before noon".to_string()),
                is_completed: true,
                user_id: "u1".to_string(),
                created_at: None,
                updated_at: None,
            },
        ];
        assert_eq!(
            format_task_list(&tasks),
            "You have 2 task(s):\n• \"Write report\" (ID: a1)\n• \"Call bank\" (ID: b2) ✓\n\nTo update or delete a task, use the ID shown in parentheses."
        );
        assert_eq!(format_task_list(&[]), EMPTY_LIST_REPLY);
    }
}
