use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("At least one messaging channel is required")]
    NoChannels,

    #[error("Empty channel name")]
    EmptyChannel,

    #[error("Duplicate channel: {0}")]
    DuplicateChannel(String),

    #[error("Queue group name cannot be empty")]
    EmptyQueueGroup,

    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("Source subject {0} is not covered by any channel")]
    UnsubscribedSubject(String),
}

/// Pipeline configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the health and readiness endpoints
    #[serde(default)]
    pub admin_listener: Listener,
    pub messaging: Messaging,
    /// Where inbound payloads come from
    #[serde(default)]
    pub source: SourceConfig,
    /// Where flattened lines go
    #[serde(default)]
    pub sink: SinkConfig,
    /// Token used for outbound calls. Without it, requests are unauthenticated.
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub features: FeaturesConfig,
    /// Drop event types ending in `.purged` before they reach the sink
    #[serde(default = "default_true")]
    pub skip_purge_events: bool,
}

impl Config {
    /// Validates the pipeline configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.admin_listener.validate()?;
        self.messaging.validate()?;

        let subject = self.source.subject();
        if !self
            .messaging
            .channels
            .iter()
            .any(|channel| subject_matches(channel, subject))
        {
            return Err(ValidationError::UnsubscribedSubject(subject.to_string()));
        }

        if let SinkConfig::Http(http) = &self.sink {
            if http.batch_size == 0 {
                return Err(ValidationError::Zero("sink.batch_size"));
            }
            if http.flush_interval_ms == 0 {
                return Err(ValidationError::Zero("sink.flush_interval_ms"));
            }
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Queue group subscription settings
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Messaging {
    /// Durable queue group shared by every consumer of this service
    #[serde(default = "default_queue_group")]
    pub queue_group: String,
    /// Subscribed channels. A channel covers its own subject and every
    /// subject below it (`channel/...`).
    pub channels: Vec<String>,
    /// Capacity of the inbound delivery queue
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Maximum number of messages handled at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Deliveries of an unacknowledged message before it is dropped
    #[serde(default = "default_max_deliver")]
    pub max_deliver: u32,
}

impl Messaging {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queue_group.is_empty() {
            return Err(ValidationError::EmptyQueueGroup);
        }
        if self.channels.is_empty() {
            return Err(ValidationError::NoChannels);
        }

        let mut seen = std::collections::HashSet::new();
        for channel in &self.channels {
            if channel.trim().is_empty() {
                return Err(ValidationError::EmptyChannel);
            }
            if !seen.insert(channel) {
                return Err(ValidationError::DuplicateChannel(channel.clone()));
            }
        }

        if self.buffer_size == 0 {
            return Err(ValidationError::Zero("messaging.buffer_size"));
        }
        if self.concurrency == 0 {
            return Err(ValidationError::Zero("messaging.concurrency"));
        }
        if self.max_deliver == 0 {
            return Err(ValidationError::Zero("messaging.max_deliver"));
        }
        Ok(())
    }
}

/// Returns true when `subject` is `channel` itself or nested below it.
pub fn subject_matches(channel: &str, subject: &str) -> bool {
    match subject.strip_prefix(channel) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Newline-delimited payloads on standard input
    Stdin {
        #[serde(default = "default_subject")]
        subject: String,
    },
    /// Newline-delimited payloads read from a file
    File {
        path: PathBuf,
        #[serde(default = "default_subject")]
        subject: String,
    },
}

impl SourceConfig {
    pub fn subject(&self) -> &str {
        match self {
            SourceConfig::Stdin { subject } | SourceConfig::File { subject, .. } => subject,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Stdin {
            subject: default_subject(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Each line becomes a log record
    #[default]
    Log,
    Stdout,
    /// Lines are appended to a file
    File { path: PathBuf },
    /// Lines are batched and posted as NDJSON
    Http(HttpSinkConfig),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HttpSinkConfig {
    pub url: Url,
    /// Audience requested from the token provider
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub token_file: PathBuf,
}

/// Tenant feature flags served from configuration
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub flags: HashMap<String, FlagConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct FlagConfig {
    /// Value for tenants without an override
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub tenants: HashMap<String, bool>,
}

fn default_true() -> bool {
    true
}

fn default_queue_group() -> String {
    "usage-telemetry-publisher".into()
}

fn default_subject() -> String {
    "system-events".into()
}

fn default_audience() -> String {
    "qlik.api.internal/usage-telemetry".into()
}

fn default_buffer_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    16
}

fn default_max_deliver() -> u32 {
    5
}

fn default_batch_size() -> usize {
    500
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    10
}
