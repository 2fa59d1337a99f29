//! Shared test support: a recording fake executor and helpers for
//! manipulating the process environment safely across tests.

#![allow(dead_code)]

use async_trait::async_trait;
use palaver_warehouse::{ConnectionParams, ScalarResult, SqlExecutor, WarehouseError};
use std::sync::Mutex;

/// One recorded `execute` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub sql: String,
    pub binds: Vec<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
}

pub enum FakeOutcome {
    Result(ScalarResult),
    ConnectionRefused,
}

/// In-memory [`SqlExecutor`] that records every call and returns a
/// programmed outcome.
pub struct FakeExecutor {
    pub calls: Mutex<Vec<RecordedCall>>,
    outcome: FakeOutcome,
}

impl FakeExecutor {
    pub fn returning(result: ScalarResult) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            outcome: FakeOutcome::Result(result),
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            outcome: FakeOutcome::ConnectionRefused,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SqlExecutor for FakeExecutor {
    async fn execute(
        &self,
        params: &ConnectionParams,
        sql: &str,
        binds: &[&str],
    ) -> Result<ScalarResult, WarehouseError> {
        self.calls.lock().unwrap().push(RecordedCall {
            sql: sql.to_string(),
            binds: binds.iter().map(|b| b.to_string()).collect(),
            database: params.database.clone(),
            schema: params.schema.clone(),
        });
        match &self.outcome {
            FakeOutcome::Result(result) => Ok(result.clone()),
            FakeOutcome::ConnectionRefused => {
                Err(WarehouseError::Login("connection refused".to_string()))
            }
        }
    }
}

/// Serializes tests that touch the process environment.
pub static ENV_LOCK: Mutex<()> = Mutex::new(());

pub const ALL_SNOWFLAKE_VARS: &[&str] = &[
    "SNOWFLAKE_ACCOUNT",
    "SNOWFLAKE_USER",
    "SNOWFLAKE_PASSWORD",
    "SNOWFLAKE_PRIVATE_KEY_PATH",
    "SNOWFLAKE_PRIVATE_KEY_PASS",
    "SNOWFLAKE_WAREHOUSE",
    "SNOWFLAKE_DATABASE",
    "SNOWFLAKE_SCHEMA",
    "SNOWFLAKE_ROLE",
    "SNOWFLAKE_CHAT_TABLE",
    "SNOWFLAKE_CHAT_DATABASE",
    "SNOWFLAKE_CHAT_SCHEMA",
    "SNOWFLAKE_RAG_MODEL",
    "SNOWFLAKE_RAG_SYSTEM_INSTRUCTION",
    "SNOWFLAKE_RAG_SQL",
];

pub fn clear_snowflake_env() {
    for key in ALL_SNOWFLAKE_VARS {
        std::env::remove_var(key);
    }
}

/// Configures a minimal password-authenticated connection.
pub fn set_connection_env() {
    std::env::set_var("SNOWFLAKE_ACCOUNT", "acme");
    std::env::set_var("SNOWFLAKE_USER", "svc_voice");
    std::env::set_var("SNOWFLAKE_PASSWORD", "hunter2");
    std::env::set_var("SNOWFLAKE_DATABASE", "ANALYTICS");
    std::env::set_var("SNOWFLAKE_SCHEMA", "PUBLIC");
}
