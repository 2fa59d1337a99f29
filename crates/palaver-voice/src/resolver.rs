//! Configuration resolution.
//!
//! Produces the single [`VoiceProfile`] a session runs with: either
//! from an externally supplied JSON document (deployment-controlled
//! personality), or from the built-in table keyed by a voice name
//! chosen at startup. Resolution happens exactly once per session,
//! before any audio is processed.

use crate::error::VoiceError;
use palaver_types::{SegmentationPolicy, TtsParams, VoiceProfile};
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::info;

/// Tool identifier that enables the knowledge-base retrieval tool.
pub const RAG_TOOL_ID: &str = "snowflake_rag";

/// Prompt used when an external document omits `personality_prompt`.
pub const DEFAULT_PROMPT: &str = "You are a helpful assistant.";

/// Greeting used when an external document omits `greeting.intro_phrase`.
pub const DEFAULT_GREETING: &str = "Hello!";

/// Voice names eligible for random selection when no external
/// document is supplied.
const BUILTIN_VOICE_NAMES: &[&str] = &["celeste"];

/// `greeting` object of the external profile document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GreetingDoc {
    #[serde(default)]
    pub intro_phrase: Option<String>,
}

/// The external JSON profile document.
///
/// Every field is optional; absent fields take the documented
/// defaults at resolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfigDoc {
    #[serde(default)]
    pub name: Option<String>,
    /// Synthesis provider label; informational only.
    #[serde(default)]
    pub tts_type: Option<String>,
    #[serde(default)]
    pub voice_options: Option<TtsParams>,
    #[serde(default)]
    pub personality_prompt: Option<String>,
    #[serde(default)]
    pub greeting: Option<GreetingDoc>,
    #[serde(default)]
    pub tools: Vec<String>,
}

/// Loads the external profile document from disk.
///
/// # Errors
///
/// An unreadable or unparseable document is a deployment defect and
/// fails fast with [`VoiceError::Config`].
pub fn load_config_doc(path: &str) -> Result<AgentConfigDoc, VoiceError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| VoiceError::Config(format!("failed to read config {path}: {e}")))?;
    let doc: AgentConfigDoc = serde_json::from_str(&contents)
        .map_err(|e| VoiceError::Config(format!("failed to parse config {path}: {e}")))?;
    info!(
        path,
        name = doc.name.as_deref().unwrap_or("unknown"),
        "loaded agent config"
    );
    Ok(doc)
}

/// One entry of the built-in profile table.
struct BuiltinVoice {
    name: &'static str,
    prompt: &'static str,
    greeting: &'static str,
    speaker: &'static str,
    speed_alpha: f32,
    /// Segmentation policy label, parsed at resolution.
    segmentation: Option<&'static str>,
}

const BUILTIN_VOICES: &[BuiltinVoice] = &[BuiltinVoice {
    name: "celeste",
    prompt: "You are Celeste, a warm and attentive voice assistant. Keep replies \
             short and conversational; they will be spoken aloud.",
    greeting: "Hey there! What can I help you with today?",
    speaker: "celeste",
    speed_alpha: 1.5,
    segmentation: Some("sentence"),
}];

/// Picks a voice name at random from the built-in list.
pub fn pick_builtin_voice() -> &'static str {
    BUILTIN_VOICE_NAMES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("celeste")
}

fn resolve_builtin(name: &str) -> Result<VoiceProfile, VoiceError> {
    let voice = BUILTIN_VOICES
        .iter()
        .find(|v| v.name == name)
        .ok_or_else(|| VoiceError::Config(format!("unknown built-in voice: {name}")))?;

    // A bad policy label in the table is a deployment defect; fail at
    // session construction rather than falling back silently.
    let segmentation = voice
        .segmentation
        .map(|label| {
            label
                .parse::<SegmentationPolicy>()
                .map_err(|e| VoiceError::Config(e.to_string()))
        })
        .transpose()?;

    Ok(VoiceProfile {
        id: voice.name.to_string(),
        prompt: voice.prompt.to_string(),
        greeting: voice.greeting.to_string(),
        tts: TtsParams {
            speaker: voice.speaker.to_string(),
            speed_alpha: voice.speed_alpha,
            ..TtsParams::default()
        },
        segmentation,
        tools: Vec::new(),
    })
}

/// Resolves the session's voice profile.
///
/// An external document wins when present; otherwise the profile comes
/// from the built-in table under `voice_name` (normally
/// [`pick_builtin_voice`]).
pub fn resolve(
    doc: Option<&AgentConfigDoc>,
    voice_name: &str,
) -> Result<VoiceProfile, VoiceError> {
    match doc {
        Some(doc) => Ok(VoiceProfile {
            id: doc.name.clone().unwrap_or_else(|| "custom".to_string()),
            prompt: doc
                .personality_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            greeting: doc
                .greeting
                .as_ref()
                .and_then(|g| g.intro_phrase.clone())
                .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
            tts: doc.voice_options.clone().unwrap_or_default(),
            segmentation: None,
            tools: doc.tools.clone(),
        }),
        None => resolve_builtin(voice_name),
    }
}
