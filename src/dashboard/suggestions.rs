use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::FunctionInvoker;
use crate::sync::SyncError;

pub const SUGGESTIONS_FUNCTION: &str = "generate-suggestions";

#[derive(Debug, Default, Deserialize)]
struct SuggestionsResponse {
  #[serde(default)]
  suggestions: Vec<String>,
}

/// Reply suggestions produced by a serverless function.
#[derive(Clone)]
pub struct SuggestionService {
  functions: Arc<dyn FunctionInvoker>,
}

impl SuggestionService {
  pub fn new(functions: Arc<dyn FunctionInvoker>) -> Self {
    Self { functions }
  }

  pub async fn suggest(&self, context: &str) -> Result<Vec<String>, SyncError> {
    let function_error = |source| SyncError::Function {
      name: SUGGESTIONS_FUNCTION.to_string(),
      source,
    };

    let body = json!({ "context": context });
    let reply = self
      .functions
      .invoke(SUGGESTIONS_FUNCTION, body)
      .await
      .map_err(|e| {
        warn!(error = %e, "suggestion request failed");
        function_error(e)
      })?;

    // A reply without suggestions is an empty list, not an error
    let response: SuggestionsResponse = if reply.is_null() {
      SuggestionsResponse::default()
    } else {
      serde_json::from_value(reply).map_err(|e| function_error(e.into()))?
    };
    debug!(count = response.suggestions.len(), "received suggestions");

    Ok(response.suggestions)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::{NoFunctions, RemoteError};
  use async_trait::async_trait;
  use serde_json::Value;
  use std::sync::Mutex;

  struct CannedFunctions {
    reply: Value,
    seen: Mutex<Vec<(String, Value)>>,
  }

  impl CannedFunctions {
    fn new(reply: Value) -> Self {
      Self {
        reply,
        seen: Mutex::new(Vec::new()),
      }
    }
  }

  #[async_trait]
  impl FunctionInvoker for CannedFunctions {
    async fn invoke(&self, name: &str, body: Value) -> Result<Value, RemoteError> {
      self.seen.lock().unwrap().push((name.to_string(), body));
      Ok(self.reply.clone())
    }
  }

  #[tokio::test]
  async fn test_suggest_sends_context() {
    let functions = Arc::new(CannedFunctions::new(
      json!({ "suggestions": ["Sounds good!", "Can we talk later?"] }),
    ));
    let service = SuggestionService::new(functions.clone());

    let suggestions = service.suggest("Lunch tomorrow?").await.unwrap();

    assert_eq!(suggestions, vec!["Sounds good!", "Can we talk later?"]);
    let seen = functions.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "generate-suggestions");
    assert_eq!(seen[0].1, json!({ "context": "Lunch tomorrow?" }));
  }

  #[tokio::test]
  async fn test_missing_suggestions_field_is_empty() {
    let service = SuggestionService::new(Arc::new(CannedFunctions::new(json!({}))));
    assert!(service.suggest("hi").await.unwrap().is_empty());

    let service = SuggestionService::new(Arc::new(CannedFunctions::new(Value::Null)));
    assert!(service.suggest("hi").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_malformed_reply_is_function_error() {
    let service =
      SuggestionService::new(Arc::new(CannedFunctions::new(json!({ "suggestions": 3 }))));
    let err = service.suggest("hi").await.unwrap_err();
    assert!(matches!(err, SyncError::Function { ref name, .. } if name == "generate-suggestions"));
  }

  #[tokio::test]
  async fn test_unavailable_functions() {
    let service = SuggestionService::new(Arc::new(NoFunctions));
    let err = service.suggest("hi").await.unwrap_err();
    assert!(matches!(
      err,
      SyncError::Function {
        source: RemoteError::Unsupported(_),
        ..
      }
    ));
  }
}
