use crate::error::SocketError;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, connect_async, tungstenite::protocol::CloseFrame};
use tracing::debug;
use url::Url;

/// Convenient type alias for a tungstenite `WebSocketStream`.
pub type WebSocket = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Communicative type alias for a tungstenite [`Message`](tokio_tungstenite::tungstenite::Message).
pub type WsMessage = tokio_tungstenite::tungstenite::Message;

/// Communicative type alias for a tungstenite [`Error`](tokio_tungstenite::tungstenite::Error).
pub type WsError = tokio_tungstenite::tungstenite::Error;

/// Connect asynchronously to a [`WebSocket`] server.
pub async fn connect(url: &Url) -> Result<WebSocket, SocketError> {
    debug!(%url, "attempting to establish WebSocket connection");
    connect_async(url.as_str())
        .await
        .map(|(websocket, _)| websocket)
        .map_err(SocketError::from)
}

/// Determine whether a [`WsMessage::Close`] frame was received, mapping it to
/// [`SocketError::Terminated`].
pub fn process_close_frame(close_frame: Option<CloseFrame>) -> SocketError {
    let close_frame = close_frame
        .map(|frame| format!("{frame:?}"))
        .unwrap_or_else(|| "no closing frame".to_string());
    SocketError::Terminated(close_frame)
}
