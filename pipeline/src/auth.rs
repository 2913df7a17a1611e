use crate::errors::AuthError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Supplies bearer tokens for outbound calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, audience: &str) -> Result<String, AuthError>;
}

/// Always returns the same token.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        StaticTokenProvider {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, audience: &str) -> Result<String, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::EmptyToken(audience.to_string()));
        }
        Ok(self.token.clone())
    }
}

/// Reads the token from a file on every call. The file may be rewritten
/// while the process runs.
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTokenProvider { path: path.into() }
    }
}

#[async_trait]
impl TokenProvider for FileTokenProvider {
    async fn token(&self, audience: &str) -> Result<String, AuthError> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let token = contents.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken(audience.to_string()));
        }
        tracing::trace!(audience, path = %self.path.display(), "loaded token from file");
        Ok(token.to_string())
    }
}
