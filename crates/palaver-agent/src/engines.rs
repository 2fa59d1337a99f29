//! Concrete engines behind the session's capability interfaces.
//!
//! Transcription and synthesis shell out to local model binaries;
//! the language model is an OpenAI-compatible HTTP endpoint; voice
//! activity and turn detection are simple signal-level heuristics.
//! The knowledge-base tool fronts the warehouse retrieval client.

use crate::config::{EnginesSection, LlmSection};
use async_trait::async_trait;
use palaver_types::{MetricsEvent, TtsParams};
use palaver_voice::{
    ChatMessage, ChatRole, LanguageModel, LlmReply, SpeechToText, TextToSpeech, Tool, ToolCall,
    ToolSpec, TurnDetector, VoiceActivityDetector, VoiceError,
};
use palaver_warehouse::RagClient;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Maximum audio input size for transcription (10 MiB).
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Maximum text input size for synthesis (64 KiB).
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for transcription process execution.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for synthesis process execution.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for one chat completion request.
const LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Transcribes speech by piping PCM into a whisper.cpp-style binary.
#[derive(Debug, Clone)]
pub struct ProcessStt {
    binary_path: PathBuf,
    model_path: PathBuf,
}

impl ProcessStt {
    pub fn new(binary_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
        }
    }

    pub fn from_config(engines: &EnginesSection) -> Self {
        Self::new(&engines.stt_binary, &engines.stt_model)
    }
}

#[async_trait]
impl SpeechToText for ProcessStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let mut command = Command::new(&self.binary_path);
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg("-") // read from stdin
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Stt(format!("Failed to spawn STT binary: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Stt("Failed to open stdin".to_string()))?;
        stdin
            .write_all(audio)
            .await
            .map_err(|e| VoiceError::Stt(format!("Failed to write to stdin: {}", e)))?;
        drop(stdin); // Close stdin to signal EOF

        let output = tokio::time::timeout(STT_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Stt(format!(
                    "STT process timed out after {} seconds",
                    STT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Stt(format!("Failed to read stdout: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Stt(format!("STT binary failed: {}", stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Synthesizes speech with a piper-style binary, applying the resolved
/// profile's synthesis parameters.
#[derive(Debug, Clone)]
pub struct ProcessTts {
    binary_path: PathBuf,
    model_path: PathBuf,
    params: TtsParams,
}

impl ProcessTts {
    pub fn new(
        binary_path: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
        params: TtsParams,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            params,
        }
    }

    pub fn from_config(engines: &EnginesSection, params: TtsParams) -> Self {
        Self::new(&engines.tts_binary, &engines.tts_model, params)
    }
}

#[async_trait]
impl TextToSpeech for ProcessTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        if self.params.speed_alpha < 0.1 || self.params.speed_alpha > 10.0 {
            return Err(VoiceError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }

        let mut command = Command::new(&self.binary_path);
        command
            .arg("--model")
            .arg(&self.model_path)
            .arg("--output_raw")
            // Length scale is the inverse of speed: 2.0 (faster)
            // becomes 0.5 (shorter).
            .arg("--length_scale")
            .arg((1.0 / self.params.speed_alpha).to_string())
            .arg("--speaker")
            .arg(&self.params.speaker)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn TTS binary: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Tts("Failed to open stdin".to_string()))?;
        let text_owned = text.to_string();

        // Write on a separate task to avoid deadlock if the output
        // buffer fills up.
        let write_task = tokio::spawn(async move { stdin.write_all(text_owned.as_bytes()).await });

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Tts(format!(
                    "TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Tts(format!("Failed to wait for TTS binary: {}", e)))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Tts(format!(
                    "Failed to write to TTS stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(VoiceError::Tts(format!("Stdin task failed: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Tts(format!("TTS binary failed: {}", stderr)));
        }

        Ok(output.stdout)
    }
}

/// Chat client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpLlm {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpLlm {
    pub fn new(section: &LlmSection) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .map_err(|e| VoiceError::Llm(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: section.base_url.trim_end_matches('/').to_string(),
            api_key: section.api_key.clone(),
            model: section.model.clone(),
        })
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                    ChatRole::Tool => "tool",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": {
                                    "type": "object",
                                    "properties": {
                                        "question": {
                                            "type": "string",
                                            "description": "The user's question, as asked."
                                        }
                                    },
                                    "required": ["question"]
                                }
                            }
                        })
                    })
                    .collect(),
            );
        }
        body
    }
}

/// Pulls the reply (text or tool call) out of a completion response.
fn parse_completion(body: &Value) -> Result<LlmReply, VoiceError> {
    let choice = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or_else(|| VoiceError::Llm("completion response has no choices".to_string()))?;
    let message = choice
        .get("message")
        .ok_or_else(|| VoiceError::Llm("completion choice has no message".to_string()))?;

    let tool_call = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .and_then(|calls| calls.first())
        .and_then(|call| call.get("function"))
        .and_then(|function| {
            let name = function.get("name")?.as_str()?.to_string();
            let arguments = function.get("arguments")?.as_str()?;
            let argument = serde_json::from_str::<Value>(arguments)
                .ok()
                .and_then(|v| v.get("question")?.as_str().map(str::to_string))
                .unwrap_or_else(|| arguments.to_string());
            Some(ToolCall { name, argument })
        });

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let usage = MetricsEvent::Llm {
        prompt_tokens: body
            .pointer("/usage/prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        completion_tokens: body
            .pointer("/usage/completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    };

    Ok(LlmReply {
        content,
        tool_call,
        usage,
    })
}

#[async_trait]
impl LanguageModel for HttpLlm {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmReply, VoiceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(&self.request_body(messages, tools));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::Llm(format!("completion request failed: {}", e)))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| VoiceError::Llm(format!("completion response unreadable: {}", e)))?;
        if !status.is_success() {
            return Err(VoiceError::Llm(format!(
                "completion endpoint returned {}: {}",
                status, body
            )));
        }

        parse_completion(&body)
    }
}

/// Flags a frame as speech when its RMS amplitude exceeds a threshold.
#[derive(Debug, Clone, Copy)]
pub struct EnergyVad {
    rms_threshold: f64,
}

impl EnergyVad {
    pub fn new(rms_threshold: f64) -> Self {
        Self { rms_threshold }
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn is_speech(&self, samples: &[i16]) -> bool {
        if samples.is_empty() {
            return false;
        }
        let sum_squares: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        let rms = (sum_squares / samples.len() as f64).sqrt();
        rms >= self.rms_threshold
    }
}

/// Ends a turn after a fixed stretch of trailing silence.
#[derive(Debug, Clone, Copy)]
pub struct SilenceTurnDetector {
    min_silence: Duration,
}

impl SilenceTurnDetector {
    pub fn new(min_silence: Duration) -> Self {
        Self { min_silence }
    }
}

impl TurnDetector for SilenceTurnDetector {
    fn is_end_of_turn(&self, trailing_silence: Duration) -> bool {
        trailing_silence >= self.min_silence
    }
}

/// The knowledge-base retrieval tool advertised to the language model.
pub struct KnowledgeBaseTool {
    rag: RagClient,
}

impl KnowledgeBaseTool {
    pub fn new(rag: RagClient) -> Self {
        Self { rag }
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        "query_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search the enterprise knowledge base for answers about company \
         data, documents, and policies. Pass the user's question as asked."
    }

    async fn call(&self, question: &str) -> String {
        debug!(question, "knowledge base lookup");
        self.rag.answer(question).await
    }
}
