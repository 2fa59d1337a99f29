//! Capability interfaces for the conversational pipeline.
//!
//! The session depends only on these contracts; the concrete engines
//! (streaming STT/TTS services, an LLM inference endpoint, VAD and
//! turn-detection models) live behind them and are wired in by the
//! worker binary.

use crate::error::VoiceError;
use async_trait::async_trait;
use palaver_types::MetricsEvent;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The speaker of a chat message sent to the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the model conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
        }
    }
}

/// A tool declaration advertised to the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

/// A tool invocation requested by the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// The single string argument (the user's question, as-is).
    pub argument: String,
}

/// One completed language-model turn.
#[derive(Debug, Clone)]
pub struct LlmReply {
    /// Final text, absent when the model asked for a tool instead.
    pub content: Option<String>,
    /// Tool invocation requested by the model, if any.
    pub tool_call: Option<ToolCall>,
    /// Token usage for this turn.
    pub usage: MetricsEvent,
}

/// Transcribes speech audio to text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError>;
}

/// Synthesizes speech audio from text.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError>;
}

/// Produces the next conversational reply, optionally via tools.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmReply, VoiceError>;
}

/// Detects presence of speech in one PCM frame.
pub trait VoiceActivityDetector: Send + Sync {
    fn is_speech(&self, samples: &[i16]) -> bool;
}

/// Decides when a speaker has finished talking.
pub trait TurnDetector: Send + Sync {
    /// Returns true once `trailing_silence` is long enough to treat
    /// the buffered speech as a finished turn.
    fn is_end_of_turn(&self, trailing_silence: Duration) -> bool;
}

/// A callable tool exposed to the language model.
///
/// The contract never raises: implementations convert every failure
/// into an informational string so the model always receives an
/// answer.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn call(&self, question: &str) -> String;
}
