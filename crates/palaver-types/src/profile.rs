//! Voice profile and TTS parameter definitions.
//!
//! A `VoiceProfile` is resolved exactly once per session, either from
//! a built-in table keyed by voice name or from an externally supplied
//! JSON document. Once resolved it is immutable for the lifetime of
//! the session.

use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "arcana".to_string()
}

fn default_speaker() -> String {
    "celeste".to_string()
}

fn default_speed_alpha() -> f32 {
    1.5
}

fn default_reduce_latency() -> bool {
    true
}

fn default_max_tokens() -> u32 {
    3400
}

/// Synthesis parameters handed to the text-to-speech engine.
///
/// The serde defaults match the documented profile-document defaults,
/// so a partially specified `voice_options` object deserializes to a
/// fully populated parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsParams {
    /// Synthesis model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Speaker voice within the model.
    #[serde(default = "default_speaker")]
    pub speaker: String,

    /// Speech speed multiplier (1.0 is the engine's natural pace).
    #[serde(default = "default_speed_alpha")]
    pub speed_alpha: f32,

    /// Ask the engine to trade quality for lower time-to-first-audio.
    #[serde(default = "default_reduce_latency")]
    pub reduce_latency: bool,

    /// Token budget per synthesis request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for TtsParams {
    fn default() -> Self {
        Self {
            model: default_model(),
            speaker: default_speaker(),
            speed_alpha: default_speed_alpha(),
            reduce_latency: default_reduce_latency(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// How agent speech is segmented before synthesis.
///
/// Some engines produce better prosody when fed whole sentences rather
/// than token-level deltas; a profile that declares a policy gets its
/// TTS capability wrapped accordingly at session construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationPolicy {
    /// Chunk synthesis on sentence boundaries.
    Sentence,
}

impl SegmentationPolicy {
    /// Returns the canonical string label for this policy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sentence => "sentence",
        }
    }
}

impl std::fmt::Display for SegmentationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SegmentationPolicy {
    type Err = ParseSegmentationPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sentence" => Ok(Self::Sentence),
            _ => Err(ParseSegmentationPolicyError(s.to_string())),
        }
    }
}

/// Error returned when a profile declares an unknown segmentation policy.
///
/// A bad policy name indicates a deployment defect, so resolution
/// fails fast instead of falling back to the engine's native chunking.
#[derive(Debug, Clone)]
pub struct ParseSegmentationPolicyError(pub String);

impl std::fmt::Display for ParseSegmentationPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown segmentation policy: {}", self.0)
    }
}

impl std::error::Error for ParseSegmentationPolicyError {}

/// A resolved voice profile.
///
/// Immutable once produced by the configuration resolver; at most one
/// profile is active per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Profile identifier (voice name or external document name).
    pub id: String,
    /// System prompt handed to the language model.
    pub prompt: String,
    /// Phrase spoken when the session starts.
    pub greeting: String,
    /// Synthesis parameters.
    pub tts: TtsParams,
    /// Optional synthesis segmentation policy.
    pub segmentation: Option<SegmentationPolicy>,
    /// Identifiers of tools enabled for this profile.
    #[serde(default)]
    pub tools: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn tts_params_defaults() {
        let params = TtsParams::default();
        assert_eq!(params.model, "arcana");
        assert_eq!(params.speaker, "celeste");
        assert_eq!(params.speed_alpha, 1.5);
        assert!(params.reduce_latency);
        assert_eq!(params.max_tokens, 3400);
    }

    #[test]
    fn tts_params_partial_document_fills_defaults() {
        let params: TtsParams = serde_json::from_str(r#"{"speaker": "luna"}"#).unwrap();
        assert_eq!(params.speaker, "luna");
        assert_eq!(params.model, "arcana");
        assert_eq!(params.speed_alpha, 1.5);
        assert!(params.reduce_latency);
        assert_eq!(params.max_tokens, 3400);
    }

    #[test]
    fn segmentation_policy_round_trip() {
        let policy = SegmentationPolicy::from_str("sentence").unwrap();
        assert_eq!(policy, SegmentationPolicy::Sentence);
        assert_eq!(policy.as_str(), "sentence");
    }

    #[test]
    fn segmentation_policy_unknown_is_an_error() {
        let err = SegmentationPolicy::from_str("word").unwrap_err();
        assert!(err.to_string().contains("word"));
    }
}
