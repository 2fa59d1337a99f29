//! Statement execution against the warehouse REST API.
//!
//! Each call performs a fresh login followed by a single statement
//! submission. There is no pooling and no shared session state, so
//! concurrent callers can never block on one another's connections.

use crate::error::WarehouseError;
use crate::params::{ConnectionParams, Credential};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

/// Timeout for one login + statement round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Validity window for key-pair authentication tokens.
const JWT_LIFETIME_SECS: u64 = 300;

/// The first column of the first row of a statement result.
///
/// Distinguishes an empty result set from a present-but-null value;
/// the retrieval tool maps each to a different informational string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarResult {
    /// The statement returned no rows.
    NoRows,
    /// The first row's first column was SQL NULL.
    Null,
    /// The first row's first column, rendered as text.
    Value(String),
}

/// Executes one parameterized statement against the warehouse.
///
/// Implementations open and close whatever connection they need
/// within the call; callers must never observe shared state between
/// calls.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Runs `sql` with positional text bindings and returns the first
    /// column of the first row, if any.
    async fn execute(
        &self,
        params: &ConnectionParams,
        sql: &str,
        binds: &[&str],
    ) -> Result<ScalarResult, WarehouseError>;
}

#[derive(Serialize)]
struct JwtClaims {
    iss: String,
    sub: String,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct RestResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// REST implementation of [`SqlExecutor`].
///
/// Logs in via the session endpoint (password, or key-pair JWT with
/// `AUTHENTICATOR=SNOWFLAKE_JWT`) and submits the statement through
/// the query endpoint with positional text bindings. Session context
/// (warehouse, database, schema, role) rides on the login request.
#[derive(Debug, Clone)]
pub struct RestExecutor {
    http: reqwest::Client,
}

impl RestExecutor {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    fn base_url(params: &ConnectionParams) -> String {
        format!("https://{}.snowflakecomputing.com", params.account)
    }

    /// Mints the RS256 token for key-pair logins.
    fn keypair_jwt(params: &ConnectionParams, pem: &str) -> Result<String, WarehouseError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| WarehouseError::Credential(e.to_string()))?
            .as_secs();
        let qualified_user = format!(
            "{}.{}",
            params.account.to_uppercase(),
            params.user.to_uppercase()
        );
        let claims = JwtClaims {
            iss: qualified_user.clone(),
            sub: qualified_user,
            iat: now,
            exp: now + JWT_LIFETIME_SECS,
        };
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(pem.as_bytes())?;
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        Ok(jsonwebtoken::encode(&header, &claims, &key)?)
    }

    /// Performs the session login and returns the session token.
    async fn login(&self, params: &ConnectionParams) -> Result<String, WarehouseError> {
        let mut body = json!({
            "ACCOUNT_NAME": params.account,
            "LOGIN_NAME": params.user,
            "CLIENT_APP_ID": "palaver",
            "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
        });
        match &params.credential {
            Credential::Password(password) => {
                body["PASSWORD"] = json!(password);
            }
            Credential::KeyPair { pem, passphrase } => {
                if passphrase.is_some() {
                    return Err(WarehouseError::Credential(
                        "encrypted private keys are not supported; provide an \
                         unencrypted PKCS#8 PEM"
                            .to_string(),
                    ));
                }
                body["AUTHENTICATOR"] = json!("SNOWFLAKE_JWT");
                body["TOKEN"] = json!(Self::keypair_jwt(params, pem)?);
            }
        }

        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(warehouse) = &params.warehouse {
            query.push(("warehouse", warehouse));
        }
        if let Some(database) = &params.database {
            query.push(("databaseName", database));
        }
        if let Some(schema) = &params.schema {
            query.push(("schemaName", schema));
        }
        if let Some(role) = &params.role {
            query.push(("roleName", role));
        }

        let response: RestResponse = self
            .http
            .post(format!("{}/session/v1/login-request", Self::base_url(params)))
            .query(&query)
            .json(&json!({ "data": body }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.success {
            return Err(WarehouseError::Login(
                response.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        response
            .data
            .as_ref()
            .and_then(|d| d.get("token"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| WarehouseError::Response("login response carried no token".to_string()))
    }
}

impl Default for RestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the positional bindings object: `{"1": {"type": "TEXT", ...}}`.
fn bindings_json(binds: &[&str]) -> Value {
    let mut map = serde_json::Map::new();
    for (i, value) in binds.iter().enumerate() {
        map.insert(
            (i + 1).to_string(),
            json!({ "type": "TEXT", "value": value }),
        );
    }
    Value::Object(map)
}

/// Extracts the first column of the first row from a query response.
fn scalar_from_rowset(data: Option<&Value>) -> Result<ScalarResult, WarehouseError> {
    let rowset = data
        .and_then(|d| d.get("rowset"))
        .and_then(Value::as_array)
        .ok_or_else(|| WarehouseError::Response("response carried no rowset".to_string()))?;
    let Some(row) = rowset.first() else {
        return Ok(ScalarResult::NoRows);
    };
    let cell = row
        .get(0)
        .ok_or_else(|| WarehouseError::Response("row carried no columns".to_string()))?;
    Ok(match cell {
        Value::Null => ScalarResult::Null,
        Value::String(s) => ScalarResult::Value(s.clone()),
        other => ScalarResult::Value(other.to_string()),
    })
}

#[async_trait]
impl SqlExecutor for RestExecutor {
    async fn execute(
        &self,
        params: &ConnectionParams,
        sql: &str,
        binds: &[&str],
    ) -> Result<ScalarResult, WarehouseError> {
        let token = self.login(params).await?;

        let response: RestResponse = self
            .http
            .post(format!(
                "{}/queries/v1/query-request",
                Self::base_url(params)
            ))
            .query(&[("requestId", Uuid::new_v4().to_string())])
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Snowflake Token=\"{token}\""),
            )
            .json(&json!({
                "sqlText": sql,
                "sequenceId": 1,
                "bindings": bindings_json(binds),
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.success {
            return Err(WarehouseError::Query(
                response.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        scalar_from_rowset(response.data.as_ref())
    }
}
