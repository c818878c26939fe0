use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortForgeError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Error in line {line}: {msg}\nOffending line:\n{content}")]
    Parse {
        line: usize,
        msg: String,
        content: String,
    },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Data Validation Error: {0}")]
    Validation(String),
}

pub type PfResult<T> = Result<T, PortForgeError>;
