//! Voice session core for the Palaver agent.
//!
//! Bridges a LiveKit audio room with speech-to-text, a language model,
//! and text-to-speech. The concrete engines are external collaborators
//! behind capability interfaces; this crate owns what happens between
//! them: resolving the voice profile, gating audio through VAD and
//! turn detection, driving the model loop (including mid-conversation
//! tool calls), emitting session events for observers, and flushing
//! usage metrics at shutdown.

pub mod capability;
pub mod chunk;
pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod room;
pub mod session;

pub use capability::{
    ChatMessage, ChatRole, LanguageModel, LlmReply, SpeechToText, TextToSpeech, Tool, ToolCall,
    ToolSpec, TurnDetector, VoiceActivityDetector,
};
pub use chunk::SentenceChunkedTts;
pub use error::VoiceError;
pub use orchestrator::{run_session, OrchestratorDeps};
pub use resolver::{load_config_doc, resolve, AgentConfigDoc, RAG_TOOL_ID};
pub use room::{AgentRoomClient, ConnectOptions, LiveKitConfig, Participant, RoomService};
pub use session::{
    Agent, ConversationItem, ItemContent, Session, SessionCapabilities, SessionEvent,
};
