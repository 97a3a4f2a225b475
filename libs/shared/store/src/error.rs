use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write lost to an existing row (unique key taken).
    #[error("conditional write conflicted with an existing row")]
    Conflict,

    #[error("store api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("store transport error: {0}")]
    Transport(String),

    #[error("failed to decode store response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}
