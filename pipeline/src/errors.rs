use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors raised while wiring up and running the pipeline. Per-message
/// failures never surface here, they end inside the handler.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] crate::config::ValidationError),
}

/// The `data` attribute could not be turned into a mapping.
#[derive(Error, Debug, PartialEq)]
pub enum ScrubError {
    #[error("event data must be an object, got {0}")]
    NonObjectData(&'static str),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("no channel subscribed to subject {0}")]
    NoSubscriber(String),

    #[error("queue group is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum AckError {
    #[error("message was already acknowledged")]
    AlreadyAcked,

    #[error("transport rejected acknowledgment: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream responded with {0}")]
    UpstreamStatus(reqwest::StatusCode),

    #[error("could not obtain token: {0}")]
    Auth(#[from] AuthError),

    #[error("sink is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("could not read token file: {0}")]
    Io(#[from] std::io::Error),

    #[error("token for audience {0} is empty")]
    EmptyToken(String),
}

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("unknown feature flag: {0}")]
    UnknownFlag(String),
}
