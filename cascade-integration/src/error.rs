use crate::protocol::websocket::WsError;
use thiserror::Error;

/// All socket IO related errors generated in `cascade-integration`.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Sink error")]
    Sink,

    #[error("Deserialising JSON error: {error} for payload: {payload}")]
    Deserialise {
        error: serde_json::Error,
        payload: String,
    },

    #[error("Serialising JSON error: {0}")]
    Serialise(serde_json::Error),

    #[error("error parsing Url: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<WsError>),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP response status {status}: {body}")]
    HttpResponse { status: u16, body: String },

    #[error("ExchangeStream terminated with closing frame: {0}")]
    Terminated(String),

    #[error("WebSocket read timeout: no data received for {0} seconds")]
    ReadTimeout(u64),

    #[error("{entity} does not support: {item}")]
    Unsupported { entity: String, item: String },
}

impl From<WsError> for SocketError {
    fn from(error: WsError) -> Self {
        Self::WebSocket(Box::new(error))
    }
}

impl SocketError {
    /// Determine if the error means the underlying connection is gone and must be
    /// re-established.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            SocketError::WebSocket(_)
                | SocketError::Terminated(_)
                | SocketError::ReadTimeout(_)
                | SocketError::Sink
        )
    }
}
