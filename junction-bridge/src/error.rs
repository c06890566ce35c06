use thiserror::Error;

use crate::runner::RunError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Command(#[from] RunError),

    #[error("{0} not found in genesis file")]
    MissingGenesisKey(String),

    #[error("invalid vote option: {0}. Valid options are: yes, no, abstain, no_with_veto")]
    InvalidVoteOption(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("transaction rejected with code {code}: {log}")]
    TxRejected { code: u32, log: String },

    #[error("standard input closed while waiting for {0}")]
    InputClosed(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<url::ParseError> for BridgeError {
    fn from(err: url::ParseError) -> Self {
        Self::Http(err.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
