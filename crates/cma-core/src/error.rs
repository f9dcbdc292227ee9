use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("non-2xx response -- status: {status}, body: {body}")]
    Http { status: u16, body: String },

    #[error("unauthorized: credentials rejected by control plane")]
    Unauthorized,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no installable items in actions")]
    NothingToDo,

    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error("invalid reload descriptor '{raw}': {reason}")]
    InvalidDescriptor { raw: String, reason: String },

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("inventory: {0}")]
    Inventory(String),

    #[error("credentials: {0}")]
    Credentials(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no current tracking information for {0}")]
    IncompleteTracking(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// True for failures the next poll cycle is expected to recover from.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Transport(_) | AgentError::Http { .. } | AgentError::Unauthorized
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
