use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::protocol::BattleMode;

/// 앱 전체에 뿌리는 알림.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    RewardsGranted {
        mode: BattleMode,
        xp: u32,
        gems: u32,
    },
    LevelUp {
        level: u32,
    },
}

/// 명시적으로 주입되는 publish/subscribe 서비스.
///
/// 앱 시작 시 하나 만들어 `Arc` 로 각 전투 런타임에 넘긴다. 앱이 살아 있는 동안 내리지 않는다.
/// 구독자가 없을 때 publish 해도 에러가 아니다.
#[derive(Debug)]
pub struct EventBus<T: Clone> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone + std::fmt::Debug> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    /// 전달받은 구독자 수를 돌려준다.
    pub fn publish(&self, notice: T) -> usize {
        match self.tx.send(notice) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(notice)) => {
                debug!("No subscribers for {:?}", notice);
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + std::fmt::Debug> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(64)
    }
}
