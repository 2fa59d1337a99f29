//! Per-call session orchestration.
//!
//! [`run_session`] owns one call end to end: create the room, join it,
//! wait for a human, wire the agent and its capabilities into a
//! [`Session`], greet, then relay audio through the VAD/turn-detection
//! gate until shutdown.
//!
//! # Design decisions
//!
//! - Observer work (transcript logging, metrics logging) runs on its
//!   own task fed by the session's broadcast channel, so a slow or
//!   failing warehouse never stalls the audio path.
//! - Pipeline errors inside a single turn are logged and the loop
//!   continues; only room and configuration failures abort the call.
//! - The usage summary is logged exactly once, at shutdown, after the
//!   audio loop has stopped.

use crate::chunk::SentenceChunkedTts;
use crate::error::VoiceError;
use crate::resolver::RAG_TOOL_ID;
use crate::room::{AgentRoomClient, ConnectOptions, Participant, RoomService};
use crate::session::{
    Agent, ConversationItem, Session, SessionCapabilities, SessionEvent, SAMPLE_RATE_HZ,
};
use crate::capability::Tool;
use palaver_types::{ConversationTurn, Role, SegmentationPolicy, UsageSummary, VoiceProfile};
use palaver_warehouse::TranscriptLogger;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Everything a session run needs, wired by the worker binary.
pub struct OrchestratorDeps {
    pub room_service: RoomService,
    pub room_name: String,
    pub agent_identity: String,
    pub agent_name: String,
    pub connect_options: ConnectOptions,
    /// The voice profile resolved by the worker at startup.
    pub profile: VoiceProfile,
    pub capabilities: SessionCapabilities,
    /// Knowledge-base tool; attached to the agent only when the
    /// resolved profile requests it.
    pub knowledge_tool: Option<Arc<dyn Tool>>,
    /// Best-effort transcript sink; `None` disables logging entirely.
    pub transcript: Option<TranscriptLogger>,
}

/// Runs one session to completion.
///
/// Returns the accumulated usage summary once `shutdown` resolves or
/// the room goes away.
///
/// # Errors
///
/// Room-service failures and profile resolution failures abort the
/// call. Per-turn pipeline errors do not.
pub async fn run_session(
    deps: OrchestratorDeps,
    shutdown: impl Future<Output = ()>,
) -> Result<UsageSummary, VoiceError> {
    let profile = deps.profile;
    info!(
        voice = %profile.id,
        speaker = %profile.tts.speaker,
        tools = ?profile.tools,
        "starting session"
    );

    deps.room_service.create_room(&deps.room_name).await?;
    let token = deps.room_service.generate_join_token(
        &deps.room_name,
        &deps.agent_identity,
        &deps.agent_name,
    )?;
    let room = Arc::new(
        AgentRoomClient::connect(
            deps.room_service.url(),
            &token,
            &deps.room_name,
            deps.connect_options,
        )
        .await?,
    );

    let participant = deps
        .room_service
        .wait_for_participant(&deps.room_name, &deps.agent_identity)
        .await?;
    info!(
        participant = %participant.identity,
        room = %deps.room_name,
        "participant joined"
    );

    let mut capabilities = deps.capabilities;
    if profile.segmentation == Some(SegmentationPolicy::Sentence) {
        capabilities.tts = Arc::new(SentenceChunkedTts::new(capabilities.tts));
    }

    let agent = build_agent(&profile, deps.knowledge_tool);

    let greeting = profile.greeting.clone();
    let session = Arc::new(Session::new(agent, profile, capabilities, room.clone()));

    let observer = tokio::spawn(observe_session(
        session.subscribe(),
        deps.transcript,
        deps.room_name.clone(),
        participant.clone(),
        deps.agent_name.clone(),
    ));

    let mut audio_task = tokio::spawn(audio_loop(session.clone(), room.clone()));

    if let Err(e) = session.say(&greeting).await {
        warn!(error = %e, "greeting failed");
    }

    tokio::select! {
        () = shutdown => {
            info!(room = %deps.room_name, "shutdown requested");
        }
        result = &mut audio_task => {
            if let Err(e) = result {
                error!(error = %e, "audio loop task failed");
            }
        }
    }

    audio_task.abort();
    room.disconnect();

    let usage = session.usage();
    info!(%usage, "session usage summary");

    // Dropping the session closes the event channel, which lets the
    // observer drain and exit.
    drop(session);
    if let Err(e) = observer.await {
        error!(error = %e, "observer task failed");
    }

    Ok(usage)
}

/// Builds the session agent for a resolved profile. The knowledge
/// tool is attached only when the profile's tool list enables it;
/// otherwise the agent runs bare even if a tool was supplied.
fn build_agent(profile: &VoiceProfile, tool: Option<Arc<dyn Tool>>) -> Agent {
    match tool {
        Some(tool) if profile.tools.iter().any(|t| t == RAG_TOOL_ID) => {
            Agent::with_tool(profile.prompt.clone(), tool)
        }
        _ => Agent::new(profile.prompt.clone()),
    }
}

/// Relays inbound PCM frames into the session, gated by VAD and turn
/// detection. Exits when the room's audio feed closes.
async fn audio_loop(session: Arc<Session>, room: Arc<AgentRoomClient>) {
    let mut audio_rx = room.subscribe_audio();
    let mut speech_buffer: Vec<u8> = Vec::new();
    let mut trailing_silence = Duration::ZERO;

    loop {
        let frame = match audio_rx.recv().await {
            Ok(frame) => frame,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "audio loop lagged; frames dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let samples: Vec<i16> = frame
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let frame_duration = Duration::from_secs_f64(
            samples.len() as f64 / f64::from(SAMPLE_RATE_HZ),
        );

        if session.is_speech(&samples) {
            speech_buffer.extend_from_slice(&frame);
            trailing_silence = Duration::ZERO;
            continue;
        }

        if speech_buffer.is_empty() {
            continue;
        }
        trailing_silence += frame_duration;

        if session.is_end_of_turn(trailing_silence) {
            let audio = std::mem::take(&mut speech_buffer);
            trailing_silence = Duration::ZERO;
            if let Err(e) = session.handle_user_turn(&audio).await {
                // A failed turn should not end the call.
                error!(error = %e, "user turn failed");
            }
        }
    }
    debug!("audio feed closed; audio loop exiting");
}

/// Consumes session events: logs metrics, forwards finalized
/// conversation items to the transcript sink.
async fn observe_session(
    mut events: broadcast::Receiver<SessionEvent>,
    transcript: Option<TranscriptLogger>,
    session_id: String,
    participant: Participant,
    agent_name: String,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::MetricsCollected(event)) => {
                debug!(?event, "metrics collected");
            }
            Ok(SessionEvent::ConversationItemAdded(item)) => {
                let Some(turn) =
                    transcript_turn(&item, &session_id, &participant.identity, &agent_name)
                else {
                    continue;
                };
                info!(role = turn.role.as_str(), message = %turn.message, "conversation item");
                if let Some(logger) = &transcript {
                    logger.log(turn);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "observer lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Maps a finalized conversation item onto a transcript row. Blank
/// messages produce no row. Every row carries the human participant's
/// identity, for both sides of the conversation; the agent is named in
/// its own column.
fn transcript_turn(
    item: &ConversationItem,
    session_id: &str,
    participant_id: &str,
    agent_name: &str,
) -> Option<ConversationTurn> {
    let role = item.role.unwrap_or(Role::User);
    let message = item.content.joined();
    if message.trim().is_empty() {
        return None;
    }
    Some(ConversationTurn::new(
        session_id,
        participant_id,
        role,
        message,
        agent_name,
    ))
}
