use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildEventsError {
    #[error("Invalid webhook payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("parsing time {0:?}: matches neither \"YYYY-MM-DD hh:mm:ss ZONE\" nor \"YYYY-MM-DD hh:mm:ss +hhmm\"")]
    Timestamp(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid fields file (line {line}): {message}")]
    Fields { line: usize, message: String },

    #[error("Events API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BuildEventsError>;
