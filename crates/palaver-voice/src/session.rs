//! The live conversational session.
//!
//! A `Session` is bound to one room, one participant, one voice
//! profile, and one set of wired capabilities. It owns the model
//! conversation history and the running usage summary, and broadcasts
//! session events (metrics, finalized conversation items) to
//! observers registered by the orchestrator.

use crate::capability::{
    ChatMessage, LanguageModel, SpeechToText, TextToSpeech, Tool, ToolSpec, TurnDetector,
    VoiceActivityDetector,
};
use crate::error::VoiceError;
use crate::room::AgentRoomClient;
use palaver_types::{MetricsEvent, Role, UsageSummary, VoiceProfile};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capacity of the per-session event broadcast channel.
const EVENT_BROADCAST_CAPACITY: usize = 256;

/// Upper bound on tool-call rounds within one model turn.
const MAX_TOOL_ROUNDS: usize = 4;

/// Inbound PCM format: 16 kHz, 16-bit mono.
pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const BYTES_PER_SAMPLE: u32 = 2;

/// The conversational agent: instructions plus optionally one tool.
///
/// The plain and tool-augmented variants differ only in whether a tool
/// is attached; there is no separate agent type.
pub struct Agent {
    instructions: String,
    tool: Option<Arc<dyn Tool>>,
}

impl Agent {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            tool: None,
        }
    }

    pub fn with_tool(instructions: impl Into<String>, tool: Arc<dyn Tool>) -> Self {
        Self {
            instructions: instructions.into(),
            tool: Some(tool),
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn has_tool(&self) -> bool {
        self.tool.is_some()
    }

    fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tool
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    fn tool_named(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tool.as_ref().filter(|t| t.name() == name)
    }
}

/// Content of a finalized conversation item.
///
/// Sessions emit either whole strings or fragment lists depending on
/// which capability finalized the item; consumers join fragments with
/// single spaces.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemContent {
    Text(String),
    Fragments(Vec<String>),
}

impl ItemContent {
    /// Renders the content as one string.
    pub fn joined(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Fragments(fragments) => fragments.join(" "),
        }
    }
}

/// A finalized conversation item. `role` may be absent for items
/// finalized by capabilities that do not attribute speech; consumers
/// default it to [`Role::User`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationItem {
    pub role: Option<Role>,
    pub content: ItemContent,
}

/// Events broadcast by the session to registered observers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    MetricsCollected(MetricsEvent),
    ConversationItemAdded(ConversationItem),
}

/// The capability set a session is wired with.
#[derive(Clone)]
pub struct SessionCapabilities {
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn LanguageModel>,
    pub tts: Arc<dyn TextToSpeech>,
    pub vad: Arc<dyn VoiceActivityDetector>,
    pub turn_detector: Arc<dyn TurnDetector>,
}

pub struct Session {
    agent: Agent,
    profile: VoiceProfile,
    capabilities: SessionCapabilities,
    room: Arc<AgentRoomClient>,
    history: tokio::sync::Mutex<Vec<ChatMessage>>,
    events_tx: broadcast::Sender<SessionEvent>,
    usage: Mutex<UsageSummary>,
}

impl Session {
    pub fn new(
        agent: Agent,
        profile: VoiceProfile,
        capabilities: SessionCapabilities,
        room: Arc<AgentRoomClient>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        let history = vec![ChatMessage::system(agent.instructions())];
        Self {
            agent,
            profile,
            capabilities,
            room,
            history: tokio::sync::Mutex::new(history),
            events_tx,
            usage: Mutex::new(UsageSummary::default()),
        }
    }

    pub fn profile(&self) -> &VoiceProfile {
        &self.profile
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Registers an observer.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Whether one PCM frame contains speech.
    pub fn is_speech(&self, samples: &[i16]) -> bool {
        self.capabilities.vad.is_speech(samples)
    }

    /// Whether the accumulated trailing silence ends the current turn.
    pub fn is_end_of_turn(&self, trailing_silence: std::time::Duration) -> bool {
        self.capabilities.turn_detector.is_end_of_turn(trailing_silence)
    }

    /// Snapshot of the usage totals accumulated so far.
    pub fn usage(&self) -> UsageSummary {
        *self.usage.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine; observers are optional.
        let _ = self.events_tx.send(event);
    }

    fn record_metrics(&self, event: MetricsEvent) {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .collect(&event);
        self.emit(SessionEvent::MetricsCollected(event));
    }

    /// Speaks `text`: synthesize, publish to the room, and finalize
    /// the assistant conversation item.
    pub async fn say(&self, text: &str) -> Result<(), VoiceError> {
        let audio = self.capabilities.tts.synthesize(text).await?;
        self.room.publish_audio(&audio).await?;
        self.record_metrics(MetricsEvent::Tts {
            characters: text.chars().count() as u64,
        });
        self.history.lock().await.push(ChatMessage::assistant(text));
        self.emit(SessionEvent::ConversationItemAdded(ConversationItem {
            role: Some(Role::Assistant),
            content: ItemContent::Text(text.to_string()),
        }));
        Ok(())
    }

    /// Handles one finalized user turn: transcribe, run the model
    /// loop (including tool calls), and speak the reply.
    pub async fn handle_user_turn(&self, audio: &[u8]) -> Result<(), VoiceError> {
        let seconds = audio.len() as f64 / (SAMPLE_RATE_HZ * BYTES_PER_SAMPLE) as f64;
        let text = self.capabilities.stt.transcribe(audio).await?;
        self.record_metrics(MetricsEvent::Stt {
            audio_seconds: seconds,
        });
        if text.trim().is_empty() {
            debug!("discarding empty transcription");
            return Ok(());
        }

        self.history.lock().await.push(ChatMessage::user(&text));
        self.emit(SessionEvent::ConversationItemAdded(ConversationItem {
            role: Some(Role::User),
            content: ItemContent::Text(text),
        }));

        let reply = self.model_turn().await?;
        if !reply.trim().is_empty() {
            self.say(&reply).await?;
        }
        Ok(())
    }

    /// Drives the model until it produces text, invoking the attached
    /// tool when asked. The model turn blocks on the tool result; the
    /// tool itself never raises.
    async fn model_turn(&self) -> Result<String, VoiceError> {
        let tools = self.agent.tool_specs();
        for _ in 0..MAX_TOOL_ROUNDS {
            let messages = self.history.lock().await.clone();
            let reply = self.capabilities.llm.chat(&messages, &tools).await?;
            self.record_metrics(reply.usage);

            if let Some(call) = reply.tool_call {
                let answer = match self.agent.tool_named(&call.name) {
                    Some(tool) => tool.call(&call.argument).await,
                    None => {
                        warn!(tool = %call.name, "model requested an unavailable tool");
                        format!("The tool {} is not available.", call.name)
                    }
                };
                self.history.lock().await.push(ChatMessage::tool(answer));
                continue;
            }

            return Ok(reply.content.unwrap_or_default());
        }
        Err(VoiceError::Llm(
            "tool-call loop exceeded the round limit".to_string(),
        ))
    }
}
