use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::battle::TimerKind;

/// 1회성 타이머. 만료되면 `TimerKind` 를 런타임 채널로 돌려보낸다.
///
/// 전투 화면의 토큰 아래에서 돌기 때문에 teardown 후에는 아무것도 도착하지 않는다.
pub struct TimerService {
    tx: mpsc::UnboundedSender<TimerKind>,
    cancel: CancellationToken,
}

impl TimerService {
    pub fn new(parent: &CancellationToken) -> (Self, mpsc::UnboundedReceiver<TimerKind>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                cancel: parent.child_token(),
            },
            rx,
        )
    }

    pub fn schedule(&self, timer: TimerKind, after: Duration) {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Timer {:?} cancelled", timer);
                }
                _ = tokio::time::sleep(after) => {
                    let _ = tx.send(timer);
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
