use thiserror::Error;

/// Structural decode errors (§4.6). These never crash the process — the
/// row-store reader and overlay cache both treat a decode error as "drop
/// this row, continue" (§7).
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("gzip decompress failed: {0}")]
    Gzip(String),

    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown chart store variant: {0}")]
    UnknownVariant(String),

    #[error("malformed population-triple payload: {0}")]
    MalformedPopPv(String),

    #[error("empty cell")]
    EmptyCell,
}

pub type CodecResult<T> = Result<T, CodecError>;
