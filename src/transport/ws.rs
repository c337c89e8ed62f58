use std::time::Duration;

use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::{net::TcpStream, sync::mpsc, sync::Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Transport, TransportEvent};
use crate::{
    exception::BattleError,
    protocol::{ClientMessage, ServerMessage},
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub struct WsTransport {
    sink: Mutex<WsSink>,
}

impl WsTransport {
    /// 접속하고 수신 태스크를 띄운다. 수신 태스크는 스트림이 끝나면 `Disconnected` 를 보내고 종료한다.
    pub async fn connect(
        ws_url: &str,
        auth_token: Option<&str>,
        timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), BattleError> {
        let mut url = Url::parse(ws_url)?;
        if let Some(token) = auth_token {
            url.query_pairs_mut().append_pair("token", token);
        }

        info!("Connecting to {}", ws_url);
        let (ws_stream, _) = tokio::time::timeout(timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| BattleError::ConnectionTimeout)?
            .map_err(|e| BattleError::Transport(e.to_string()))?;

        let (sink, stream) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Connected);
        tokio::spawn(read_loop(stream, tx));

        Ok((
            Self {
                sink: Mutex::new(sink),
            },
            rx,
        ))
    }

    pub async fn close(&self) -> Result<(), BattleError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Close(None))
            .await
            .map_err(|e| BattleError::Transport(e.to_string()))
    }
}

async fn read_loop(mut stream: WsStream, tx: mpsc::UnboundedSender<TransportEvent>) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(reason)) => {
                info!("Server closed connection: {:?}", reason);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
        };

        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(msg) => {
                debug!("Received {}", msg.kind());
                if tx.send(TransportEvent::Message(msg)).is_err() {
                    // 런타임이 이미 끝났다.
                    return;
                }
            }
            Err(e) => warn!("Dropping malformed frame: {} ({})", e, text),
        }
    }

    let _ = tx.send(TransportEvent::Disconnected);
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, msg: ClientMessage) -> Result<(), BattleError> {
        let text = serde_json::to_string(&msg)?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| BattleError::Transport(e.to_string()))
    }
}
