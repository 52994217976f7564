//! Script retrieval
//!
//! A script is fetched exactly once per session, before anything is
//! recorded. Failures are never retried.

use super::schema::Script;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Script-related errors
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("script endpoint returned status {0}")]
    Status(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed script: {0}")]
    Malformed(String),
}

/// Source of the session script
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Load and validate the script
    async fn load(&self) -> Result<Script, ScriptError>;
}

/// Check that a script has at least one section and that every section has lines
pub fn validate(script: &Script) -> Result<(), ScriptError> {
    if script.sections.is_empty() {
        return Err(ScriptError::Malformed("script has no sections".to_string()));
    }

    for (index, section) in script.sections.iter().enumerate() {
        if section.is_empty() {
            return Err(ScriptError::Malformed(format!(
                "section {} ('{}') has no lines",
                index, section.title
            )));
        }
    }

    Ok(())
}

/// Fetches the script from the remote script endpoint
#[derive(Debug, Clone)]
pub struct HttpScriptStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpScriptStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ScriptError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScriptError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self) -> String {
        format!("{}/api/get-script", self.base_url)
    }
}

#[async_trait]
impl ScriptStore for HttpScriptStore {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn load(&self) -> Result<Script, ScriptError> {
        let url = self.url();
        tracing::debug!("Fetching script from {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!("Script request failed: {}", e);
            ScriptError::Http(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!("Script endpoint returned error: {}", status);
            return Err(ScriptError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ScriptError::Http(e.to_string()))?;
        let script: Script = serde_json::from_slice(&body)?;
        validate(&script)?;

        tracing::info!(
            "Loaded script: {} sections, {} lines",
            script.sections.len(),
            script.total_lines()
        );
        Ok(script)
    }
}

/// Reads the script document from a local JSON file
#[derive(Debug, Clone)]
pub struct FileScriptStore {
    path: PathBuf,
}

impl FileScriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ScriptStore for FileScriptStore {
    async fn load(&self) -> Result<Script, ScriptError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let script: Script = serde_json::from_str(&content)?;
        validate(&script)?;

        tracing::debug!("Loaded script from {:?}", self.path);
        Ok(script)
    }
}
