//! Wire types exchanged with the task
//! backend.

use serde::{
  Deserialize,
  Serialize
};
use serde_json::Value;

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Task {
  pub id:           String,
  pub title:        String,
  #[serde(default)]
  pub description:  Option<String>,
  #[serde(default)]
  pub is_completed: bool,
  #[serde(default)]
  pub user_id:      String,
  #[serde(default)]
  pub created_at:   Option<String>,
  #[serde(default)]
  pub updated_at:   Option<String>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskCreate {
  pub title:       String,
  pub description: String
}

/// Partial update body. Absent fields
/// are left untouched by the server.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
  Eq,
)]
pub struct TaskPatch {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub title:        Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description:  Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub is_completed: Option<bool>
}

impl TaskPatch {
  pub fn is_empty(&self) -> bool {
    self.title.is_none()
      && self.description.is_none()
      && self.is_completed.is_none()
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct TaskPage {
  #[serde(default)]
  pub items:       Vec<Task>,
  #[serde(default)]
  pub total:       u64,
  #[serde(default)]
  pub page:        u64,
  #[serde(default)]
  pub page_size:   u64,
  #[serde(default)]
  pub total_pages: u64
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct Credentials {
  pub email:    String,
  pub password: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct TokenResponse {
  #[serde(default)]
  pub access_token: Option<String>
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
  User,
  Assistant
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct ChatTurn {
  pub role:    ChatRole,
  pub content: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct ChatRequest {
  pub messages: Vec<ChatTurn>,
  pub user_id:  String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct FunctionCall {
  pub name:      String,
  #[serde(default)]
  pub arguments: Value
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct ChatReply {
  #[serde(default)]
  pub message:       Option<String>,
  #[serde(default)]
  pub function_call: Option<FunctionCall>
}

/// Error body returned by the backend.
///
/// The backend wraps failures as
/// `{"detail": {"code", "message",
/// "details"}}`; a bare top-level
/// `message` or a string `detail` are
/// accepted as well.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct ErrorBody {
  #[serde(default)]
  pub detail:  Option<ErrorDetail>,
  #[serde(default)]
  pub message: Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(untagged)]
pub enum ErrorDetail {
  Structured {
    #[serde(default)]
    code:    Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<Value>
  },
  Text(String),
  Other(Value)
}

impl ErrorBody {
  pub fn message(
    &self
  ) -> Option<String> {
    let from_detail =
      match self.detail.as_ref() {
        | Some(
          ErrorDetail::Structured {
            message,
            ..
          }
        ) => message.clone(),
        | Some(ErrorDetail::Text(
          text
        )) => Some(text.clone()),
        | _ => None
      };

    from_detail
      .or_else(|| self.message.clone())
      .filter(|msg| {
        !msg.trim().is_empty()
      })
  }

  pub fn code(&self) -> Option<String> {
    match self.detail.as_ref() {
      | Some(
        ErrorDetail::Structured {
          code,
          ..
        }
      ) => code.clone(),
      | _ => None
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn structured_detail_carries_code_and_message()
   {
    let body: ErrorBody =
      serde_json::from_value(json!({
        "detail": {
          "code": "EMAIL_EXISTS",
          "message": "Email already registered",
          "details": null
        }
      }))
      .expect("decode error body");

    assert_eq!(
      body.code().as_deref(),
      Some("EMAIL_EXISTS")
    );
    assert_eq!(
      body.message().as_deref(),
      Some("Email already registered")
    );
  }

  #[test]
  fn falls_back_to_top_level_message()
  {
    let body: ErrorBody =
      serde_json::from_value(json!({
        "message": "Task not found"
      }))
      .expect("decode error body");
    assert_eq!(
      body.message().as_deref(),
      Some("Task not found")
    );
    assert_eq!(body.code(), None);

    let text: ErrorBody =
      serde_json::from_value(json!({
        "detail": "Not authenticated"
      }))
      .expect("decode text detail");
    assert_eq!(
      text.message().as_deref(),
      Some("Not authenticated")
    );
  }

  #[test]
  fn validation_lists_have_no_message()
  {
    let body: ErrorBody =
      serde_json::from_value(json!({
        "detail": [
          {"loc": ["body", "title"], "msg": "field required"}
        ]
      }))
      .expect("decode validation body");
    assert_eq!(body.message(), None);
  }

  #[test]
  fn patch_omits_untouched_fields() {
    let patch = TaskPatch {
      is_completed: Some(true),
      ..TaskPatch::default()
    };
    let encoded =
      serde_json::to_value(&patch)
        .expect("encode patch");
    assert_eq!(
      encoded,
      json!({"is_completed": true})
    );
  }
}
