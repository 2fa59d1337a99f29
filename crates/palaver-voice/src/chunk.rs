//! Sentence-chunked synthesis.
//!
//! Some engines produce better prosody when fed whole sentences rather
//! than token-level deltas. A profile that declares a sentence
//! segmentation policy gets its TTS capability wrapped here, so the
//! session never needs to know which chunking is in effect.

use crate::capability::TextToSpeech;
use crate::error::VoiceError;
use async_trait::async_trait;
use std::sync::Arc;

/// Wraps a [`TextToSpeech`] engine so synthesis is chunked on sentence
/// boundaries instead of the engine's native streaming boundaries.
pub struct SentenceChunkedTts {
    inner: Arc<dyn TextToSpeech>,
}

impl SentenceChunkedTts {
    pub fn new(inner: Arc<dyn TextToSpeech>) -> Self {
        Self { inner }
    }
}

/// Splits text after sentence-final punctuation (`.`, `!`, `?`)
/// followed by whitespace or end of input. Whitespace-only segments
/// are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let followed_by_space = text[end..]
                .chars()
                .next()
                .map_or(true, char::is_whitespace);
            if followed_by_space {
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = end;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

#[async_trait]
impl TextToSpeech for SentenceChunkedTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        let mut audio = Vec::new();
        for sentence in split_sentences(text) {
            audio.extend(self.inner.synthesize(&sentence).await?);
        }
        Ok(audio)
    }
}
