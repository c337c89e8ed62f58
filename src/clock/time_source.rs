use chrono::Utc;
use tokio::time::Instant;

/// 현재 시각(epoch ms)을 알려주는 시계.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// 매번 벽시계를 읽는다.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// 생성 시점에 벽시계를 한 번 읽고, 이후로는 tokio 의 monotonic 시계로 진행한다.
///
/// 세션 도중 OS 시계가 바뀌어도 카운트다운이 튀지 않는다.
/// tokio 시간을 멈춘 테스트에서도 `advance` 에 맞춰 움직인다.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    epoch_ms: i64,
    anchor: Instant,
}

impl AnchoredClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now().timestamp_millis())
    }

    pub fn starting_at(epoch_ms: i64) -> Self {
        Self {
            epoch_ms,
            anchor: Instant::now(),
        }
    }
}

impl Default for AnchoredClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for AnchoredClock {
    fn now_ms(&self) -> i64 {
        self.epoch_ms + self.anchor.elapsed().as_millis() as i64
    }
}
