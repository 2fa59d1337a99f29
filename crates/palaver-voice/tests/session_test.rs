use async_trait::async_trait;
use palaver_types::{MetricsEvent, Role, VoiceProfile};
use palaver_voice::{
    Agent, AgentRoomClient, ChatMessage, ChatRole, ConnectOptions, ConversationItem, ItemContent,
    LanguageModel, LlmReply, Session, SessionCapabilities, SessionEvent, SpeechToText,
    TextToSpeech, Tool, ToolCall, ToolSpec, TurnDetector, VoiceActivityDetector, VoiceError,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

struct FixedStt(String);

#[async_trait]
impl SpeechToText for FixedStt {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, VoiceError> {
        Ok(self.0.clone())
    }
}

struct SilentTts;

#[async_trait]
impl TextToSpeech for SilentTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Plays back a scripted sequence of replies and records what it was
/// asked, including the tool declarations it saw.
#[derive(Default)]
struct ScriptedLlm {
    replies: Mutex<VecDeque<LlmReply>>,
    seen_tools: Mutex<Vec<Vec<String>>>,
    seen_messages: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    fn speaking(text: &str) -> LlmReply {
        LlmReply {
            content: Some(text.to_string()),
            tool_call: None,
            usage: MetricsEvent::Llm {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
        }
    }

    fn calling(name: &str, argument: &str) -> LlmReply {
        LlmReply {
            content: None,
            tool_call: Some(ToolCall {
                name: name.to_string(),
                argument: argument.to_string(),
            }),
            usage: MetricsEvent::Llm {
                prompt_tokens: 10,
                completion_tokens: 2,
            },
        }
    }

    fn with_replies(replies: Vec<LlmReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmReply, VoiceError> {
        self.seen_tools
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());
        self.seen_messages.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| VoiceError::Llm("script exhausted".to_string()))
    }
}

struct AlwaysSpeech;

impl VoiceActivityDetector for AlwaysSpeech {
    fn is_speech(&self, _samples: &[i16]) -> bool {
        true
    }
}

struct InstantTurn;

impl TurnDetector for InstantTurn {
    fn is_end_of_turn(&self, _trailing_silence: Duration) -> bool {
        true
    }
}

struct RecordingTool {
    questions: Mutex<Vec<String>>,
    answer: String,
}

impl RecordingTool {
    fn new(answer: &str) -> Self {
        Self {
            questions: Mutex::new(Vec::new()),
            answer: answer.to_string(),
        }
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        "query_knowledge_base"
    }

    fn description(&self) -> &str {
        "Answers questions from the knowledge base."
    }

    async fn call(&self, question: &str) -> String {
        self.questions.lock().unwrap().push(question.to_string());
        self.answer.clone()
    }
}

fn test_profile() -> VoiceProfile {
    VoiceProfile {
        id: "test".to_string(),
        prompt: "You are a test assistant.".to_string(),
        greeting: "Hello!".to_string(),
        tts: Default::default(),
        segmentation: None,
        tools: Vec::new(),
    }
}

async fn test_room() -> Arc<AgentRoomClient> {
    Arc::new(
        AgentRoomClient::connect("http://localhost:7880", "tok", "room", ConnectOptions::default())
            .await
            .unwrap(),
    )
}

fn capabilities(stt: &str, llm: ScriptedLlm) -> SessionCapabilities {
    SessionCapabilities {
        stt: Arc::new(FixedStt(stt.to_string())),
        llm: Arc::new(llm),
        tts: Arc::new(SilentTts),
        vad: Arc::new(AlwaysSpeech),
        turn_detector: Arc::new(InstantTurn),
    }
}

fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn conversation_items(events: &[SessionEvent]) -> Vec<ConversationItem> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ConversationItemAdded(item) => Some(item.clone()),
            SessionEvent::MetricsCollected(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn say_emits_assistant_item_and_tts_metrics() {
    let session = Session::new(
        Agent::new("prompt"),
        test_profile(),
        capabilities("", ScriptedLlm::default()),
        test_room().await,
    );
    let mut rx = session.subscribe();

    session.say("Hello!").await.unwrap();

    let events = drain_events(&mut rx);
    let items = conversation_items(&events);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].role, Some(Role::Assistant));
    assert_eq!(items[0].content, ItemContent::Text("Hello!".to_string()));
    assert_eq!(session.usage().tts_characters, 6);
}

#[tokio::test]
async fn user_turn_runs_the_model_and_speaks_the_reply() {
    let llm = ScriptedLlm::with_replies(vec![ScriptedLlm::speaking("Hi there.")]);
    let session = Session::new(
        Agent::new("prompt"),
        test_profile(),
        capabilities("hello agent", llm),
        test_room().await,
    );
    let mut rx = session.subscribe();

    // One second of 16 kHz 16-bit audio.
    session.handle_user_turn(&vec![0u8; 32_000]).await.unwrap();

    let items = conversation_items(&drain_events(&mut rx));
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].role, Some(Role::User));
    assert_eq!(items[0].content.joined(), "hello agent");
    assert_eq!(items[1].role, Some(Role::Assistant));
    assert_eq!(items[1].content.joined(), "Hi there.");

    let usage = session.usage();
    assert!((usage.stt_audio_seconds - 1.0).abs() < 1e-9);
    assert_eq!(usage.llm_prompt_tokens, 10);
    assert_eq!(usage.llm_completion_tokens, 5);
}

#[tokio::test]
async fn empty_transcription_is_discarded_without_a_model_call() {
    let llm = ScriptedLlm::default();
    let session = Session::new(
        Agent::new("prompt"),
        test_profile(),
        capabilities("   ", llm),
        test_room().await,
    );
    let mut rx = session.subscribe();

    session.handle_user_turn(&[0u8; 320]).await.unwrap();

    let items = conversation_items(&drain_events(&mut rx));
    assert!(items.is_empty(), "blank speech should finalize nothing");
}

#[tokio::test]
async fn tool_call_is_answered_and_the_model_resumes() {
    let llm = ScriptedLlm::with_replies(vec![
        ScriptedLlm::calling("query_knowledge_base", "What is the return policy?"),
        ScriptedLlm::speaking("Returns are accepted within 30 days."),
    ]);
    let tool = Arc::new(RecordingTool::new("30 days, with receipt."));
    let session = Session::new(
        Agent::with_tool("prompt", tool.clone()),
        test_profile(),
        capabilities("what is the return policy", llm),
        test_room().await,
    );
    let mut rx = session.subscribe();

    session.handle_user_turn(&[0u8; 320]).await.unwrap();

    assert_eq!(
        *tool.questions.lock().unwrap(),
        vec!["What is the return policy?".to_string()]
    );
    let items = conversation_items(&drain_events(&mut rx));
    assert_eq!(items.len(), 2);
    assert_eq!(
        items[1].content.joined(),
        "Returns are accepted within 30 days."
    );
    // Two model rounds were metered.
    assert_eq!(session.usage().llm_prompt_tokens, 20);
}

#[tokio::test]
async fn tool_result_reaches_the_model_as_a_tool_message() {
    let llm = Arc::new(ScriptedLlm::with_replies(vec![
        ScriptedLlm::calling("query_knowledge_base", "q"),
        ScriptedLlm::speaking("done"),
    ]));
    let tool = Arc::new(RecordingTool::new("the knowledge base answer"));
    let session = Session::new(
        Agent::with_tool("prompt", tool),
        test_profile(),
        SessionCapabilities {
            stt: Arc::new(FixedStt("question".to_string())),
            llm: llm.clone(),
            tts: Arc::new(SilentTts),
            vad: Arc::new(AlwaysSpeech),
            turn_detector: Arc::new(InstantTurn),
        },
        test_room().await,
    );

    session.handle_user_turn(&[0u8; 320]).await.unwrap();

    let rounds = llm.seen_messages.lock().unwrap();
    assert_eq!(rounds.len(), 2);
    let last = rounds[1].last().unwrap();
    assert_eq!(last.role, ChatRole::Tool);
    assert_eq!(last.content, "the knowledge base answer");
}

#[tokio::test]
async fn tool_is_advertised_only_when_attached() {
    let with = Arc::new(ScriptedLlm::with_replies(vec![ScriptedLlm::speaking("a")]));
    let session = Session::new(
        Agent::with_tool("prompt", Arc::new(RecordingTool::new("x"))),
        test_profile(),
        SessionCapabilities {
            stt: Arc::new(FixedStt("hi".to_string())),
            llm: with.clone(),
            tts: Arc::new(SilentTts),
            vad: Arc::new(AlwaysSpeech),
            turn_detector: Arc::new(InstantTurn),
        },
        test_room().await,
    );
    session.handle_user_turn(&[0u8; 320]).await.unwrap();
    assert_eq!(
        with.seen_tools.lock().unwrap()[0],
        vec!["query_knowledge_base".to_string()]
    );

    let without = Arc::new(ScriptedLlm::with_replies(vec![ScriptedLlm::speaking("b")]));
    let session = Session::new(
        Agent::new("prompt"),
        test_profile(),
        SessionCapabilities {
            stt: Arc::new(FixedStt("hi".to_string())),
            llm: without.clone(),
            tts: Arc::new(SilentTts),
            vad: Arc::new(AlwaysSpeech),
            turn_detector: Arc::new(InstantTurn),
        },
        test_room().await,
    );
    session.handle_user_turn(&[0u8; 320]).await.unwrap();
    assert!(without.seen_tools.lock().unwrap()[0].is_empty());
}

#[tokio::test]
async fn runaway_tool_loop_is_cut_off() {
    let llm = ScriptedLlm::with_replies(vec![
        ScriptedLlm::calling("query_knowledge_base", "q"),
        ScriptedLlm::calling("query_knowledge_base", "q"),
        ScriptedLlm::calling("query_knowledge_base", "q"),
        ScriptedLlm::calling("query_knowledge_base", "q"),
        ScriptedLlm::speaking("never reached"),
    ]);
    let session = Session::new(
        Agent::with_tool("prompt", Arc::new(RecordingTool::new("x"))),
        test_profile(),
        capabilities("hi", llm),
        test_room().await,
    );

    let err = session.handle_user_turn(&[0u8; 320]).await.unwrap_err();
    assert!(matches!(err, VoiceError::Llm(_)));
}

#[test]
fn fragment_content_joins_with_single_spaces() {
    let content = ItemContent::Fragments(vec!["Hello".to_string(), "there".to_string()]);
    assert_eq!(content.joined(), "Hello there");
}
