//! Usage metrics collected over a session.

use serde::{Deserialize, Serialize};

/// A single metrics event emitted by a session capability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricsEvent {
    /// A language-model turn completed.
    Llm {
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    /// A synthesis request completed.
    Tts { characters: u64 },
    /// A transcription request completed.
    Stt { audio_seconds: f64 },
}

/// Running usage totals for one session.
///
/// Accumulated from metrics events as they are collected and flushed
/// to the log exactly once at session shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub llm_prompt_tokens: u64,
    pub llm_completion_tokens: u64,
    pub tts_characters: u64,
    pub stt_audio_seconds: f64,
}

impl UsageSummary {
    /// Folds one event into the running totals.
    pub fn collect(&mut self, event: &MetricsEvent) {
        match *event {
            MetricsEvent::Llm {
                prompt_tokens,
                completion_tokens,
            } => {
                self.llm_prompt_tokens += prompt_tokens;
                self.llm_completion_tokens += completion_tokens;
            }
            MetricsEvent::Tts { characters } => self.tts_characters += characters,
            MetricsEvent::Stt { audio_seconds } => self.stt_audio_seconds += audio_seconds,
        }
    }
}

impl std::fmt::Display for UsageSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "llm_prompt_tokens={} llm_completion_tokens={} tts_characters={} stt_audio_seconds={:.2}",
            self.llm_prompt_tokens,
            self.llm_completion_tokens,
            self.tts_characters,
            self.stt_audio_seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_accumulates_across_event_kinds() {
        let mut summary = UsageSummary::default();
        summary.collect(&MetricsEvent::Llm {
            prompt_tokens: 100,
            completion_tokens: 40,
        });
        summary.collect(&MetricsEvent::Llm {
            prompt_tokens: 50,
            completion_tokens: 10,
        });
        summary.collect(&MetricsEvent::Tts { characters: 120 });
        summary.collect(&MetricsEvent::Stt { audio_seconds: 3.5 });

        assert_eq!(summary.llm_prompt_tokens, 150);
        assert_eq!(summary.llm_completion_tokens, 50);
        assert_eq!(summary.tts_characters, 120);
        assert!((summary.stt_audio_seconds - 3.5).abs() < f64::EPSILON);
    }
}
