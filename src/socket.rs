use std::{pin::Pin, task::{Context, Poll}};

use futures::stream::{SplitSink, SplitStream};
use futures::{ready, Stream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{trace, warn};

use crate::{error::SocketError, model::gateway::IncomingPayload};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type SocketSink = SplitSink<WsStream, Message>;

/// Close code used when the stream ends without a close frame.
pub(crate) const ABNORMAL_CLOSE: u16 = 1006;

/// Opens a websocket to `url`, sending `headers` with the handshake.
pub(crate) async fn connect(url: &str, headers: &[(&'static str, &str)]) -> Result<WsStream, SocketError> {
    let mut req = url.into_client_request()?;

    for (name, value) in headers {
        req.headers_mut().insert(*name, HeaderValue::from_str(value)?);
    }

    let (connection, _) = connect_async(req).await?;

    Ok(connection)
}

/// What the read half of a node socket produced.
#[derive(Debug)]
pub(crate) enum SocketEvent {
    Payload(IncomingPayload),
    Closed {
        code: u16,
        reason: String
    }
}

/// The read half of a node connection, yielding parsed payloads.
pub(crate) struct Socket {
    stream: Option<SplitStream<WsStream>>
}

impl Socket {
    pub fn new(stream: SplitStream<WsStream>) -> Self {
        Self {
            stream: Some(stream)
        }
    }
}

impl Stream for Socket {
    type Item = Result<SocketEvent, SocketError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let Some(socket) = this.stream.as_mut() else { return Poll::Ready(None) };

            let msg = match ready!(Pin::new(socket).poll_next(cx)) {
                None => {
                    this.stream = None;
                    return Poll::Ready(Some(Ok(SocketEvent::Closed {
                        code: ABNORMAL_CLOSE,
                        reason: String::new()
                    })));
                },
                Some(Err(e)) => {
                    warn!("Disconnected from node, error: {e}");
                    this.stream = None;
                    return Poll::Ready(Some(Err(From::from(e))));
                },
                Some(Ok(msg)) => msg
            };

            let data = match msg {
                Message::Text(t) => t,
                Message::Close(frame) => {
                    this.stream = None;
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((ABNORMAL_CLOSE, String::new()));

                    return Poll::Ready(Some(Ok(SocketEvent::Closed { code, reason })));
                },
                _ => continue
            };

            trace!("Received payload: {data}");

            return Poll::Ready(Some(
                serde_json::from_str(&data)
                    .map(SocketEvent::Payload)
                    .map_err(From::from)
            ));
        }
    }
}
