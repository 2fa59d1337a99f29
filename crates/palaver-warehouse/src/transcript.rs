//! Best-effort transcript logging.
//!
//! Conversation turns are queued on a bounded channel and drained by a
//! dedicated worker, so the session loop never waits on warehouse
//! latency. A full queue drops the turn; a write failure is logged and
//! never retried. Dropping the last logger handle closes the queue and
//! lets the drain worker flush what remains.

use crate::error::WarehouseError;
use crate::executor::SqlExecutor;
use crate::params::ConnectionParams;
use palaver_types::ConversationTurn;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Messages longer than this many characters are truncated before
/// insertion.
const MAX_MESSAGE_CHARS: usize = 65_535;

/// Default capacity of the pending-turn queue.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Returns true when the table name is a single plain identifier.
///
/// The table name is interpolated into the statement text (row values
/// are bound), so anything but letters, digits, and underscore is
/// refused outright.
fn is_valid_table_name(table: &str) -> bool {
    !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Truncates to at most `max` characters.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Writes one conversation turn to the warehouse.
///
/// Returns `Ok(true)` when a row was inserted and `Ok(false)` when the
/// turn was skipped: no `SNOWFLAKE_CHAT_TABLE` configured, an invalid
/// table name, a blank message, or an unconfigured connection. Skips
/// never touch the network.
///
/// # Errors
///
/// Returns the underlying [`WarehouseError`] when the insert itself
/// fails; the drain worker logs and swallows it.
pub async fn write_turn(
    executor: &dyn SqlExecutor,
    turn: &ConversationTurn,
) -> Result<bool, WarehouseError> {
    let table = std::env::var("SNOWFLAKE_CHAT_TABLE")
        .map(|v| v.trim().to_string())
        .unwrap_or_default();
    if table.is_empty() || turn.message.trim().is_empty() {
        return Ok(false);
    }
    if !is_valid_table_name(&table) {
        warn!(
            table = %table,
            "SNOWFLAKE_CHAT_TABLE must be a single identifier (letters, digits, underscore)"
        );
        return Ok(false);
    }

    let mut params = match ConnectionParams::from_env()? {
        Some(params) => params,
        None => {
            warn!("transcript logging skipped: warehouse connection not configured");
            return Ok(false);
        }
    };
    if let Ok(database) = std::env::var("SNOWFLAKE_CHAT_DATABASE") {
        if !database.trim().is_empty() {
            params = params.with_database(database.trim());
        }
    }
    if let Ok(schema) = std::env::var("SNOWFLAKE_CHAT_SCHEMA") {
        if !schema.trim().is_empty() {
            params = params.with_schema(schema.trim());
        }
    }

    let message = truncate_chars(turn.message.trim(), MAX_MESSAGE_CHARS);
    let sql = format!(
        "INSERT INTO \"{table}\" (session_id, participant_id, role, message, agent_name, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)"
    );
    executor
        .execute(
            &params,
            &sql,
            &[
                &turn.session_id,
                &turn.participant_id,
                turn.role.as_str(),
                message,
                &turn.agent_name,
                &turn.created_at,
            ],
        )
        .await?;
    Ok(true)
}

/// Fire-and-forget handle to the transcript drain worker.
///
/// Cloning is cheap; the drain worker exits once every handle has been
/// dropped and the queue has been emptied.
#[derive(Clone)]
pub struct TranscriptLogger {
    tx: mpsc::Sender<ConversationTurn>,
}

impl TranscriptLogger {
    /// Spawns the drain worker with the default queue capacity.
    pub fn spawn(executor: Arc<dyn SqlExecutor>) -> (Self, JoinHandle<()>) {
        Self::with_capacity(executor, DEFAULT_QUEUE_CAPACITY)
    }

    /// Spawns the drain worker with an explicit queue capacity.
    pub fn with_capacity(
        executor: Arc<dyn SqlExecutor>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ConversationTurn>(capacity);
        let handle = tokio::spawn(async move {
            while let Some(turn) = rx.recv().await {
                match write_turn(executor.as_ref(), &turn).await {
                    Ok(true) => debug!(role = %turn.role, "transcript row written"),
                    Ok(false) => {}
                    Err(e) => error!(error = %e, "transcript write error"),
                }
            }
        });
        (Self { tx }, handle)
    }

    /// Queues one turn without waiting. A full queue drops the turn
    /// with a warning; completion is never awaited by the caller.
    pub fn log(&self, turn: ConversationTurn) {
        if let Err(e) = self.tx.try_send(turn) {
            warn!(error = %e, "transcript turn dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_validation() {
        assert!(is_valid_table_name("CHAT_LOG_2024"));
        assert!(is_valid_table_name("chat"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("chat log"));
        assert!(!is_valid_table_name("chat;drop table users"));
        assert!(!is_valid_table_name("\"chat\""));
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // 'é' is two bytes but one character.
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }
}
