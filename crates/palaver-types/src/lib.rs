//! Shared data types for the Palaver voice agent.
//!
//! Defines the voice profile model consumed by the configuration
//! resolver, the conversation turn record persisted by the transcript
//! logger, and the usage metrics accumulated over a session. These
//! types are pure data — every behavioral component depends on them,
//! so they carry no I/O and no runtime dependencies beyond serde.

pub mod metrics;
pub mod profile;
pub mod turn;

pub use metrics::{MetricsEvent, UsageSummary};
pub use profile::{ParseSegmentationPolicyError, SegmentationPolicy, TtsParams, VoiceProfile};
pub use turn::{ConversationTurn, ParseRoleError, Role};
