mod common;

use common::{clear_snowflake_env, set_connection_env, FakeExecutor, ENV_LOCK};
use palaver_types::{ConversationTurn, Role};
use palaver_warehouse::{write_turn, ScalarResult, TranscriptLogger};
use std::sync::Arc;

fn turn(message: &str) -> ConversationTurn {
    ConversationTurn::new("RM_abc123", "caller-42", Role::Assistant, message, "celeste")
}

#[tokio::test]
async fn configured_table_inserts_exactly_one_row() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_snowflake_env();
    set_connection_env();
    std::env::set_var("SNOWFLAKE_CHAT_TABLE", "CHAT_LOG");

    let executor = FakeExecutor::returning(ScalarResult::NoRows);
    let written = write_turn(&executor, &turn("The answer is 42")).await.unwrap();
    assert!(written);

    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].sql.starts_with("INSERT INTO \"CHAT_LOG\""));
    assert_eq!(calls[0].binds[0], "RM_abc123");
    assert_eq!(calls[0].binds[1], "caller-42");
    assert_eq!(calls[0].binds[2], "assistant");
    assert_eq!(calls[0].binds[3], "The answer is 42");
    assert_eq!(calls[0].binds[4], "celeste");
    assert!(
        calls[0].binds[5].contains('T'),
        "expected a non-empty ISO timestamp, got {:?}",
        calls[0].binds[5]
    );
    drop(calls);
    clear_snowflake_env();
}

#[tokio::test]
async fn unset_table_means_no_rows_and_no_connection() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_snowflake_env();
    set_connection_env();

    let executor = FakeExecutor::returning(ScalarResult::NoRows);
    let written = write_turn(&executor, &turn("The answer is 42")).await.unwrap();
    assert!(!written);
    assert_eq!(executor.call_count(), 0);
    clear_snowflake_env();
}

#[tokio::test]
async fn invalid_table_name_never_connects() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_snowflake_env();
    set_connection_env();

    for table in ["chat log", "chat;drop", "\"chat\"", "chat-log"] {
        std::env::set_var("SNOWFLAKE_CHAT_TABLE", table);
        let executor = FakeExecutor::returning(ScalarResult::NoRows);
        let written = write_turn(&executor, &turn("hello")).await.unwrap();
        assert!(!written, "table {table:?} must be refused");
        assert_eq!(executor.call_count(), 0, "table {table:?} must not connect");
    }
    clear_snowflake_env();
}

#[tokio::test]
async fn blank_message_is_a_no_op() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_snowflake_env();
    set_connection_env();
    std::env::set_var("SNOWFLAKE_CHAT_TABLE", "CHAT_LOG");

    let executor = FakeExecutor::returning(ScalarResult::NoRows);
    for message in ["", "   ", "\n\t"] {
        let written = write_turn(&executor, &turn(message)).await.unwrap();
        assert!(!written);
    }
    assert_eq!(executor.call_count(), 0);
    clear_snowflake_env();
}

#[tokio::test]
async fn oversized_message_is_truncated() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_snowflake_env();
    set_connection_env();
    std::env::set_var("SNOWFLAKE_CHAT_TABLE", "CHAT_LOG");

    let executor = FakeExecutor::returning(ScalarResult::NoRows);
    let long = "x".repeat(70_000);
    write_turn(&executor, &turn(&long)).await.unwrap();

    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls[0].binds[3].len(), 65_535);
    drop(calls);
    clear_snowflake_env();
}

#[tokio::test]
async fn truncation_limit_counts_characters_not_bytes() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_snowflake_env();
    set_connection_env();
    std::env::set_var("SNOWFLAKE_CHAT_TABLE", "CHAT_LOG");

    let executor = FakeExecutor::returning(ScalarResult::NoRows);
    // Two bytes per character; a byte-based cap would keep only half.
    let long = "é".repeat(70_000);
    write_turn(&executor, &turn(&long)).await.unwrap();

    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls[0].binds[3].chars().count(), 65_535);
    drop(calls);
    clear_snowflake_env();
}

#[tokio::test]
async fn chat_database_and_schema_override_the_session_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_snowflake_env();
    set_connection_env();
    std::env::set_var("SNOWFLAKE_CHAT_TABLE", "CHAT_LOG");
    std::env::set_var("SNOWFLAKE_CHAT_DATABASE", "CHAT_DB");
    std::env::set_var("SNOWFLAKE_CHAT_SCHEMA", "LOGS");

    let executor = FakeExecutor::returning(ScalarResult::NoRows);
    write_turn(&executor, &turn("hello")).await.unwrap();

    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls[0].database.as_deref(), Some("CHAT_DB"));
    assert_eq!(calls[0].schema.as_deref(), Some("LOGS"));
    drop(calls);
    clear_snowflake_env();
}

#[tokio::test]
async fn logger_drains_queued_turns_before_exit() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_snowflake_env();
    set_connection_env();
    std::env::set_var("SNOWFLAKE_CHAT_TABLE", "CHAT_LOG");

    let executor = Arc::new(FakeExecutor::returning(ScalarResult::NoRows));
    let (logger, handle) = TranscriptLogger::spawn(executor.clone());
    logger.log(turn("first"));
    logger.log(turn("second"));
    drop(logger);
    handle.await.unwrap();

    assert_eq!(executor.call_count(), 2);
    clear_snowflake_env();
}

#[tokio::test]
async fn write_failures_are_swallowed_by_the_drain() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_snowflake_env();
    set_connection_env();
    std::env::set_var("SNOWFLAKE_CHAT_TABLE", "CHAT_LOG");

    let executor = Arc::new(FakeExecutor::failing());
    let (logger, handle) = TranscriptLogger::spawn(executor.clone());
    logger.log(turn("doomed"));
    drop(logger);
    handle.await.unwrap();

    // The failure was attempted once, logged, and never retried.
    assert_eq!(executor.call_count(), 1);
    clear_snowflake_env();
}
