//! The knowledge-base retrieval client exposed to the language model.
//!
//! Asks the warehouse's inference function (or a caller-supplied RAG
//! statement) for an answer to a natural-language question. The
//! contract never raises: every failure mode is converted into an
//! informational string so the calling model always receives *some*
//! answer.

use crate::error::WarehouseError;
use crate::executor::{ScalarResult, SqlExecutor};
use crate::params::ConnectionParams;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

/// Model used when `SNOWFLAKE_RAG_MODEL` is not set.
const DEFAULT_RAG_MODEL: &str = "mistral-large";

/// Default completion call against the warehouse inference function.
/// With an array prompt and an options object, the response is JSON:
/// `{"choices":[{"messages":"..."}], ...}`.
const COMPLETE_SQL: &str =
    "SELECT SNOWFLAKE.CORTEX.COMPLETE(?, PARSE_JSON(?), {}) AS response";

/// Stateless per-call retrieval client.
///
/// Never mutates session or profile state; each call resolves fresh
/// connection parameters and holds no retry state.
pub struct RagClient {
    executor: Arc<dyn SqlExecutor>,
    model: String,
    system_instruction: Option<String>,
    custom_sql: Option<String>,
}

impl RagClient {
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        model: impl Into<String>,
        system_instruction: Option<String>,
        custom_sql: Option<String>,
    ) -> Self {
        Self {
            executor,
            model: model.into(),
            system_instruction,
            custom_sql,
        }
    }

    /// Builds a client from `SNOWFLAKE_RAG_*` environment variables.
    ///
    /// `SNOWFLAKE_RAG_SQL`, when set, replaces the default completion
    /// call; it is executed with the raw question as its sole bound
    /// parameter (e.g. `CALL my_rag_proc(?)`).
    pub fn from_env(executor: Arc<dyn SqlExecutor>) -> Self {
        let model = std::env::var("SNOWFLAKE_RAG_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RAG_MODEL.to_string());
        let system_instruction = std::env::var("SNOWFLAKE_RAG_SYSTEM_INSTRUCTION")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let custom_sql = std::env::var("SNOWFLAKE_RAG_SQL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        Self::new(executor, model, system_instruction, custom_sql)
    }

    /// Serializes the chat-style prompt array for the completion call.
    fn prompt_json(&self, question: &str) -> String {
        let mut messages = Vec::new();
        if let Some(instruction) = &self.system_instruction {
            messages.push(json!({ "role": "system", "content": instruction }));
        }
        messages.push(json!({ "role": "user", "content": question }));
        Value::Array(messages).to_string()
    }

    /// Answers a question from the knowledge base.
    ///
    /// Always returns a string; configuration gaps, connection
    /// failures, and malformed responses are folded into informational
    /// text rather than surfaced as errors.
    pub async fn answer(&self, question: &str) -> String {
        let params = match ConnectionParams::from_env() {
            Ok(Some(params)) => params,
            Ok(None) => {
                return "Snowflake is not configured (set SNOWFLAKE_ACCOUNT and SNOWFLAKE_USER)."
                    .to_string()
            }
            Err(WarehouseError::Credential(_)) => {
                return "Snowflake credentials missing (set SNOWFLAKE_PASSWORD or \
                        SNOWFLAKE_PRIVATE_KEY_PATH)."
                    .to_string()
            }
            Err(e) => {
                error!(error = %e, "knowledge base connection setup failed");
                return format!("I couldn't get an answer from the knowledge base: {e}.");
            }
        };

        let result = match &self.custom_sql {
            Some(sql) => self.executor.execute(&params, sql, &[question]).await,
            None => {
                let prompt = self.prompt_json(question);
                self.executor
                    .execute(&params, COMPLETE_SQL, &[&self.model, &prompt])
                    .await
            }
        };

        match result {
            Ok(ScalarResult::NoRows) => "No response from Snowflake.".to_string(),
            Ok(ScalarResult::Null) => "Empty response from Snowflake.".to_string(),
            Ok(ScalarResult::Value(raw)) => extract_answer(&raw),
            Err(e) => {
                error!(error = %e, "knowledge base query failed");
                format!("I couldn't get an answer from the knowledge base: {e}.")
            }
        }
    }
}

/// Pulls the message text out of a JSON-shaped completion response,
/// falling back to the trimmed raw text on any parse or shape failure.
/// A present-but-null `choices[0].messages` is an empty answer, not a
/// shape failure.
fn extract_answer(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
            match parsed
                .get("choices")
                .and_then(Value::as_array)
                .and_then(|choices| choices.first())
                .and_then(|choice| choice.get("messages"))
            {
                Some(Value::String(message)) => return message.trim().to_string(),
                Some(Value::Null) => return String::new(),
                _ => {}
            }
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shaped_response_yields_message_text() {
        let raw = r#"{"choices":[{"messages":"Paris is the capital."}]}"#;
        assert_eq!(extract_answer(raw), "Paris is the capital.");
    }

    #[test]
    fn raw_text_passes_through_trimmed() {
        assert_eq!(extract_answer("  42 \n"), "42");
    }

    #[test]
    fn null_message_field_is_an_empty_answer() {
        assert_eq!(extract_answer(r#"{"choices":[{"messages":null}]}"#), "");
    }

    #[test]
    fn unparseable_json_falls_back_to_raw_text() {
        assert_eq!(extract_answer("{not json"), "{not json");
        assert_eq!(extract_answer(r#"{"choices":[]}"#), r#"{"choices":[]}"#);
    }

    #[test]
    fn prompt_includes_optional_system_instruction_first() {
        let executor: Arc<dyn SqlExecutor> = Arc::new(NeverExecutor);
        let with_system = RagClient::new(
            executor.clone(),
            "mistral-large",
            Some("Answer briefly.".to_string()),
            None,
        );
        let prompt: Value = serde_json::from_str(&with_system.prompt_json("Why?")).unwrap();
        assert_eq!(prompt[0]["role"], "system");
        assert_eq!(prompt[1]["role"], "user");
        assert_eq!(prompt[1]["content"], "Why?");

        let without = RagClient::new(executor, "mistral-large", None, None);
        let prompt: Value = serde_json::from_str(&without.prompt_json("Why?")).unwrap();
        assert_eq!(prompt.as_array().unwrap().len(), 1);
        assert_eq!(prompt[0]["role"], "user");
    }

    struct NeverExecutor;

    #[async_trait::async_trait]
    impl SqlExecutor for NeverExecutor {
        async fn execute(
            &self,
            _params: &ConnectionParams,
            _sql: &str,
            _binds: &[&str],
        ) -> Result<ScalarResult, WarehouseError> {
            panic!("executor must not be reached");
        }
    }
}
