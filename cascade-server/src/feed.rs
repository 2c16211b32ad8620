use cascade_data::shutdown::Shutdown;
use cascade_engine::sink::Alert;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast::{self, error::RecvError},
    time::timeout,
};
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};
use tracing::{debug, error, warn};

/// Longest a single frame write may take before the client is dropped.
pub const CLIENT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON frame pushed to alert feed clients, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedFrame<'a> {
    Welcome {
        message: &'static str,
        time: DateTime<Utc>,
    },
    Alert(&'a Alert),
    /// The client fell behind the alert broadcast & missed `skipped` alerts.
    Lagged { skipped: u64 },
}

/// Why a client connection ended.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ClientEnd {
    Shutdown,
    ClientClosed,
    FeedClosed,
    SendTimeout,
    Transport,
}

/// Push the welcome frame then every broadcast [`Alert`] to one client until it leaves, the
/// feed closes or shutdown is requested.
///
/// Client text frames are ignored. Pings are answered by the WebSocket layer on the next read.
pub async fn serve_client<S>(
    mut websocket: WebSocketStream<S>,
    peer: SocketAddr,
    mut alerts: broadcast::Receiver<Alert>,
    mut shutdown: Shutdown,
) -> ClientEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let welcome = FeedFrame::Welcome {
        message: "Connected to liquidation cascade alert feed",
        time: Utc::now(),
    };
    if let Err(end) = send(&mut websocket, peer, &welcome).await {
        return end;
    }

    loop {
        tokio::select! {
            biased;

            _ = shutdown.wait() => {
                let _ = timeout(CLIENT_SEND_TIMEOUT, websocket.close(None)).await;
                return ClientEnd::Shutdown;
            }

            message = websocket.next() => match message {
                Some(Ok(Message::Close(_))) | None => return ClientEnd::ClientClosed,
                Some(Ok(Message::Text(text))) => {
                    debug!(%peer, %text, "ignoring client text frame");
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(%peer, %error, "alert feed client transport error");
                    return ClientEnd::Transport;
                }
            },

            alert = alerts.recv() => {
                let result = match alert {
                    Ok(alert) => send(&mut websocket, peer, &FeedFrame::Alert(&alert)).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%peer, skipped, "alert feed client lagged");
                        send(&mut websocket, peer, &FeedFrame::Lagged { skipped }).await
                    }
                    Err(RecvError::Closed) => {
                        let _ = timeout(CLIENT_SEND_TIMEOUT, websocket.close(None)).await;
                        return ClientEnd::FeedClosed;
                    }
                };
                if let Err(end) = result {
                    return end;
                }
            }
        }
    }
}

async fn send<S>(
    websocket: &mut WebSocketStream<S>,
    peer: SocketAddr,
    frame: &FeedFrame<'_>,
) -> Result<(), ClientEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(error) => {
            error!(%peer, %error, "failed to serialise alert feed frame");
            return Ok(());
        }
    };

    match timeout(CLIENT_SEND_TIMEOUT, websocket.send(Message::text(json))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => {
            debug!(%peer, %error, "alert feed client send failed");
            Err(ClientEnd::Transport)
        }
        Err(_) => {
            warn!(%peer, "alert feed client too slow, dropping");
            Err(ClientEnd::SendTimeout)
        }
    }
}
