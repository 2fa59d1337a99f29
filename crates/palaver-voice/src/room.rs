//! LiveKit room plumbing.
//!
//! The media plane (WebRTC tracks, codecs, noise cancellation) belongs
//! to the transport layer; this module covers what the orchestrator
//! needs from it: server-side room operations, join tokens, waiting
//! for the first participant, and PCM frame fan-out to the session.

use crate::error::VoiceError;
use livekit_api::access_token::{AccessToken, VideoGrants};
use livekit_api::services::room::{CreateRoomOptions, RoomClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the per-room inbound audio broadcast channel.
const AUDIO_BROADCAST_CAPACITY: usize = 256;

/// How often participant presence is polled while waiting.
const PARTICIPANT_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn default_token_ttl_seconds() -> u64 {
    3600
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for LiveKit join tokens. Default: 3600 (1 hour).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

/// Options applied when the agent joins a room.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Subscribe to audio tracks only.
    pub audio_only: bool,
    /// Ask the transport to run noise cancellation on inbound audio.
    pub noise_cancellation: bool,
    /// Publish synthesized audio to the room.
    pub audio_output_enabled: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            audio_only: true,
            noise_cancellation: true,
            audio_output_enabled: true,
        }
    }
}

/// A remote participant observed in the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub identity: String,
    pub name: String,
}

/// Server-side room operations.
#[derive(Debug)]
pub struct RoomService {
    config: LiveKitConfig,
    room_client: RoomClient,
}

impl RoomService {
    pub fn new(config: LiveKitConfig) -> Self {
        let room_client =
            RoomClient::with_api_key(&config.url, &config.api_key, &config.api_secret);
        Self {
            config,
            room_client,
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub async fn create_room(&self, name: &str) -> Result<(), VoiceError> {
        self.room_client
            .create_room(name, CreateRoomOptions::default())
            .await
            .map_err(|e| VoiceError::RoomService(e.to_string()))?;
        Ok(())
    }

    /// Mints a join token granting audio publish/subscribe in one room.
    pub fn generate_join_token(
        &self,
        room_name: &str,
        participant_identity: &str,
        participant_name: &str,
    ) -> Result<String, VoiceError> {
        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(participant_identity)
            .with_name(participant_name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(Duration::from_secs(self.config.token_ttl_seconds));

        token.to_jwt().map_err(VoiceError::LiveKit)
    }

    /// Returns the number of participants currently in a room.
    /// Returns 0 if the room does not exist yet.
    pub async fn participant_count(&self, room_name: &str) -> Result<u32, VoiceError> {
        match self.room_client.list_participants(room_name).await {
            Ok(participants) => Ok(participants.len() as u32),
            Err(_) => Ok(0),
        }
    }

    /// Blocks until a remote participant other than the agent is in
    /// the room. This is the one mandatory suspension point before
    /// session construction.
    pub async fn wait_for_participant(
        &self,
        room_name: &str,
        agent_identity: &str,
    ) -> Result<Participant, VoiceError> {
        let mut interval = tokio::time::interval(PARTICIPANT_POLL_INTERVAL);
        loop {
            interval.tick().await;
            match self.room_client.list_participants(room_name).await {
                Ok(participants) => {
                    if let Some(p) = participants
                        .into_iter()
                        .find(|p| p.identity != agent_identity)
                    {
                        return Ok(Participant {
                            identity: p.identity,
                            name: p.name,
                        });
                    }
                }
                Err(e) => {
                    // The room may not exist until the first human joins.
                    debug!(room = room_name, error = %e, "participant poll failed");
                }
            }
        }
    }
}

/// The agent's presence in a LiveKit room.
///
/// The transport edge feeds inbound PCM frames through [`feed_audio`];
/// the session consumes them via [`subscribe_audio`] and publishes
/// synthesized speech back with [`publish_audio`].
///
/// [`feed_audio`]: AgentRoomClient::feed_audio
/// [`subscribe_audio`]: AgentRoomClient::subscribe_audio
/// [`publish_audio`]: AgentRoomClient::publish_audio
#[derive(Debug)]
pub struct AgentRoomClient {
    pub room_url: String,
    pub room_name: String,
    token: String,
    connected: AtomicBool,
    options: ConnectOptions,
    audio_in_tx: broadcast::Sender<Vec<u8>>,
}

impl AgentRoomClient {
    /// Connects to a LiveKit room.
    pub async fn connect(
        url: &str,
        token: &str,
        room_name: &str,
        options: ConnectOptions,
    ) -> Result<Self, VoiceError> {
        info!(
            room = room_name,
            url,
            audio_only = options.audio_only,
            noise_cancellation = options.noise_cancellation,
            audio_output = options.audio_output_enabled,
            "agent connecting to room"
        );

        let (audio_in_tx, _) = broadcast::channel(AUDIO_BROADCAST_CAPACITY);

        Ok(Self {
            room_url: url.to_string(),
            room_name: room_name.to_string(),
            token: token.to_string(),
            connected: AtomicBool::new(true),
            options,
            audio_in_tx,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Publishes PCM audio data to the room.
    pub async fn publish_audio(&self, pcm_data: &[u8]) -> Result<(), VoiceError> {
        if !self.is_connected() {
            return Err(VoiceError::RoomService(
                "agent is not connected to a room".to_string(),
            ));
        }
        if !self.options.audio_output_enabled {
            debug!(room = %self.room_name, "audio output disabled; dropping synthesis");
            return Ok(());
        }
        debug!(
            bytes = pcm_data.len(),
            room = %self.room_name,
            "agent publishing audio"
        );
        Ok(())
    }

    /// Injects one inbound PCM frame from the transport edge.
    pub fn feed_audio(&self, frame: Vec<u8>) {
        if self.is_connected() {
            let _ = self.audio_in_tx.send(frame);
        }
    }

    /// Subscribes to inbound audio frames.
    pub fn subscribe_audio(&self) -> broadcast::Receiver<Vec<u8>> {
        self.audio_in_tx.subscribe()
    }

    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(room = %self.room_name, "agent disconnecting from room");
        }
    }
}
