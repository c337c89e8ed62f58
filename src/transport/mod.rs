//! 서버와의 연결 경계.
//!
//! 컨트롤러는 연결을 모른다. 런타임이 `Transport` 로 보내고,
//! 받은 것은 `TransportEvent` 채널로 흘려 넣는다.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    exception::BattleError,
    protocol::{ClientMessage, ServerMessage},
};

pub mod ws;

pub use ws::WsTransport;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, msg: ClientMessage) -> Result<(), BattleError>;
}

/// 메모리 채널로 만든 연결. 테스트와 로컬 시뮬레이션에서 서버 역할을 흉내낼 때 쓴다.
#[derive(Clone)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<ClientMessage>,
}

/// `ChannelTransport` 의 반대편. 서버 쪽에서 이벤트를 밀어넣고 클라이언트가 보낸 것을 읽는다.
pub struct ServerEnd {
    pub inbound: mpsc::UnboundedSender<TransportEvent>,
    pub outbound: mpsc::UnboundedReceiver<ClientMessage>,
}

impl ServerEnd {
    pub fn push(&self, msg: ServerMessage) -> bool {
        self.inbound.send(TransportEvent::Message(msg)).is_ok()
    }

    pub fn disconnect(&self) -> bool {
        self.inbound.send(TransportEvent::Disconnected).is_ok()
    }

    /// 지금까지 클라이언트가 보낸 메시지를 전부 꺼낸다.
    pub fn drain(&mut self) -> Vec<ClientMessage> {
        let mut sent = Vec::new();
        while let Ok(msg) = self.outbound.try_recv() {
            sent.push(msg);
        }
        sent
    }
}

impl ChannelTransport {
    pub fn pair() -> (Self, ServerEnd, mpsc::UnboundedReceiver<TransportEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        (
            Self {
                outbound: outbound_tx,
            },
            ServerEnd {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
            inbound_rx,
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, msg: ClientMessage) -> Result<(), BattleError> {
        self.outbound
            .send(msg)
            .map_err(|_| BattleError::TransportClosed)
    }
}
