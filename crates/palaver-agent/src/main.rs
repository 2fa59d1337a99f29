//! Palaver agent worker binary.
//!
//! Resolves configuration, wires the speech engines and the warehouse
//! clients into a voice session, runs it against one LiveKit room, and
//! shuts down gracefully on SIGTERM/SIGINT.

mod config;
mod engines;

use engines::{EnergyVad, HttpLlm, KnowledgeBaseTool, ProcessStt, ProcessTts, SilenceTurnDetector};
use palaver_voice::resolver::{load_config_doc, pick_builtin_voice, resolve};
use palaver_voice::{
    run_session, ConnectOptions, LiveKitConfig, OrchestratorDeps, RoomService, SessionCapabilities,
    Tool,
};
use palaver_warehouse::{RagClient, RestExecutor, SqlExecutor, TranscriptLogger};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Pulls `--config <path>` (or `--config=<path>`) out of argv: the
/// path of the external JSON profile document. Any remaining
/// arguments belong to the surrounding process tooling and are left
/// untouched.
fn extract_config_arg(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            return iter.next().cloned();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

/// Picks the profile document path: the `--config` argument wins over
/// the worker config's `agent.config_doc_path`.
fn select_profile_doc(cli: Option<String>, from_config: Option<&str>) -> Option<String> {
    cli.filter(|value| !value.trim().is_empty())
        .or_else(|| from_config.map(str::to_string))
}

/// The TOML worker config is its own channel: `PALAVER_CONFIG_PATH`
/// or the default file name, never `--config`.
fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Ok(path) = std::env::var("PALAVER_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli_profile_doc = extract_config_arg(&argv);

    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("palaver.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the worker cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Resolve the voice profile once, before any capability is wired.
    let profile_doc_path =
        select_profile_doc(cli_profile_doc, config.agent.config_doc_path.as_deref());
    let doc = profile_doc_path
        .as_deref()
        .map(load_config_doc)
        .transpose()
        .expect("failed to load the agent profile document");
    let profile = resolve(doc.as_ref(), pick_builtin_voice())
        .expect("failed to resolve a voice profile — check the profile document");

    // Speech engines and the language model
    let capabilities = SessionCapabilities {
        stt: Arc::new(ProcessStt::from_config(&config.engines)),
        tts: Arc::new(ProcessTts::from_config(
            &config.engines,
            profile.tts.clone(),
        )),
        llm: Arc::new(
            HttpLlm::new(&config.llm).expect("failed to build the chat completion client"),
        ),
        vad: Arc::new(EnergyVad::new(config.engines.vad_rms_threshold)),
        turn_detector: Arc::new(SilenceTurnDetector::new(Duration::from_millis(
            config.engines.turn_silence_ms,
        ))),
    };

    // Warehouse clients: one shared executor behind both the
    // retrieval tool and the transcript logger.
    let executor: Arc<dyn SqlExecutor> = Arc::new(RestExecutor::new());
    let knowledge_tool: Option<Arc<dyn Tool>> = Some(Arc::new(KnowledgeBaseTool::new(
        RagClient::from_env(executor.clone()),
    )));
    let (transcript, transcript_worker) = TranscriptLogger::spawn(executor);

    let room_service = RoomService::new(LiveKitConfig {
        url: config.livekit.url.clone(),
        api_key: config.livekit.api_key.clone(),
        api_secret: config.livekit.api_secret.clone(),
        token_ttl_seconds: config.livekit.token_ttl_seconds,
    });

    let deps = OrchestratorDeps {
        room_service,
        room_name: config.agent.room_name.clone(),
        agent_identity: config.agent.identity.clone(),
        agent_name: config.agent.name.clone(),
        connect_options: ConnectOptions::default(),
        profile,
        capabilities,
        knowledge_tool,
        transcript: Some(transcript),
    };

    tracing::info!(room = %config.agent.room_name, "starting palaver agent");

    match run_session(deps, shutdown_signal()).await {
        Ok(usage) => tracing::info!(%usage, "session finished"),
        Err(e) => tracing::error!(error = %e, "session failed"),
    }

    // Dropping the logger inside run_session's deps closed the queue;
    // wait for the drain worker to flush what was accepted.
    if let Err(e) = transcript_worker.await {
        tracing::error!(error = %e, "transcript worker failed");
    }

    tracing::info!("palaver agent shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
