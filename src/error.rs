use thiserror::Error;

/// Boxed error returned by host platform collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
#[error(transparent)]
pub enum SocketError {
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
    Json(#[from] serde_json::Error),
    InvalidHeader(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue)
}

/// Errors produced while decoding an encoded track.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed base64 input: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unexpected end of input while reading {field}: needed {needed} bytes, {remaining} left")]
    UnexpectedEof {
        field: &'static str,
        needed: usize,
        remaining: usize
    },
    #[error("invalid utf-8 while reading {field}")]
    InvalidUtf8 {
        field: &'static str
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The socket could not be opened or written to.
    #[error("connection error: {0}")]
    Connection(#[from] SocketError),
    /// The node sent something this client does not understand.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// A value was out of the accepted range.
    #[error("validation error: {0}")]
    Validation(String),
    /// The operation is not valid for the current player state.
    #[error("state error: {0}")]
    State(String),
    /// The host platform failed to deliver a gateway packet.
    #[error("gateway error: {0}")]
    Gateway(#[source] BoxError),
    /// There is no node to serve the request.
    #[error("no node available")]
    NodeUnavailable,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The node could not load the requested tracks.
    #[error("failed to load tracks: {message} (severity: {severity})")]
    LoadFailed {
        message: String,
        severity: String
    }
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
