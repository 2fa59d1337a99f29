use thiserror::Error;

/// Errors from warehouse connection and statement execution.
///
/// "Not configured" is not an error: [`crate::ConnectionParams::from_env`]
/// returns `Ok(None)` when the mandatory identity fields are absent.
/// These variants all describe a configured-but-broken state.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Credential material is missing or unusable.
    #[error("credential error: {0}")]
    Credential(String),

    /// HTTP transport failure.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The warehouse rejected the login request.
    #[error("login rejected: {0}")]
    Login(String),

    /// The warehouse rejected the statement.
    #[error("query failed: {0}")]
    Query(String),

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Response(String),

    /// Failed to read key material from disk.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to sign the key-pair authentication token.
    #[error("JWT signing error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}
