//! Snowflake warehouse integration for the Palaver voice agent.
//!
//! Provides the shared connection logic (environment-resolved
//! credentials, password or key-pair), a minimal REST statement
//! executor, the retrieval tool used by the language model to query
//! the knowledge base, and the best-effort transcript logger.
//!
//! # Design decisions
//!
//! - **One connection per operation**: every statement logs in fresh
//!   and never shares a session. This trades connection-setup latency
//!   for the invariant that one session's tool calls can never starve
//!   another's on a shared connection.
//! - **Best-effort transcript logging**: a dropped transcript row is
//!   an acceptable degradation; audio continuity is not. Writes flow
//!   through a bounded queue drained off the session loop, and every
//!   failure is logged and swallowed.
//! - **The tool contract never raises**: the retrieval tool converts
//!   every failure into a user-facing string so the calling model
//!   always receives an answer.

mod error;
mod executor;
mod params;
mod rag;
mod transcript;

pub use error::WarehouseError;
pub use executor::{RestExecutor, ScalarResult, SqlExecutor};
pub use params::{ConnectionParams, Credential};
pub use rag::RagClient;
pub use transcript::{write_turn, TranscriptLogger};
