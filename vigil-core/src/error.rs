use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    /// The push connection could not be opened, or failed while open.
    /// Always recovered by the client's scheduled reconnect.
    #[error("transport failure: {0}")]
    Transport(String),

    /// An inbound frame was not a well-formed alert. The frame is dropped;
    /// the connection stays up.
    #[error("malformed alert frame: {0}")]
    Decode(#[from] serde_json::Error),

    /// A subscription API call failed.
    #[error("API request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("feed client is already running")]
    AlreadyStarted,
}

pub type FeedResult<T> = Result<T, FeedError>;
