//! 서버가 준 종료 시각(epoch ms)으로부터 남은 시간을 계산하는 시계.
//!
//! 시계마다 자기 tick 태스크를 따로 가진다. 공유 tick 은 없다.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

mod time_source;

pub use time_source::{AnchoredClock, TimeSource, WallClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockId {
    /// PvP 시작 전 카운트다운 (start_time 까지)
    Countdown,
    /// PvP 매치 제한 시간
    Match,
    /// Raid 제한 시간
    Raid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockReading {
    Tick { remaining_secs: u64 },
    /// 표시 값이 바뀌지 않음 (tick 이 조금 일찍 온 경우)
    Unchanged,
    /// 처음으로 0 이하가 된 순간. 딱 한 번만 나온다.
    Expired,
    /// 만료 이후
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSignal {
    Tick { remaining_secs: u64 },
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockEvent {
    pub id: ClockId,
    pub signal: ClockSignal,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    end_ms: i64,
    last_emitted: Option<u64>,
    expired: bool,
}

impl Countdown {
    pub fn new(end_ms: i64) -> Self {
        Self {
            end_ms,
            last_emitted: None,
            expired: false,
        }
    }

    pub fn end_ms(&self) -> i64 {
        self.end_ms
    }

    /// 남은 시간(초, 올림). 마감이 지났으면 0.
    pub fn remaining_secs(&self, now_ms: i64) -> u64 {
        let remaining_ms = self.end_ms.saturating_sub(now_ms);
        if remaining_ms <= 0 {
            0
        } else {
            ((remaining_ms + 999) / 1000) as u64
        }
    }

    pub fn poll(&mut self, now_ms: i64) -> ClockReading {
        if self.expired {
            return ClockReading::Idle;
        }

        if self.end_ms.saturating_sub(now_ms) <= 0 {
            self.expired = true;
            return ClockReading::Expired;
        }

        let remaining_secs = self.remaining_secs(now_ms);
        match self.last_emitted {
            Some(last) if remaining_secs >= last => ClockReading::Unchanged,
            _ => {
                self.last_emitted = Some(remaining_secs);
                ClockReading::Tick { remaining_secs }
            }
        }
    }
}

/// Raid 시계 표시.
///
/// 한 시간 이상 남으면 `HH:MM`, 그 아래로는 `MM:SS` 로 보여준다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaidClockDisplay {
    pub remaining_secs: u64,
    pub text: String,
    /// UI 강조용. 동작은 바뀌지 않는다.
    pub urgent: bool,
}

impl RaidClockDisplay {
    pub fn new(remaining_secs: u64, urgency_threshold_secs: u64) -> Self {
        Self {
            remaining_secs,
            text: Self::format(remaining_secs),
            urgent: remaining_secs < urgency_threshold_secs,
        }
    }

    fn format(remaining_secs: u64) -> String {
        let hours = remaining_secs / 3600;
        let minutes = (remaining_secs % 3600) / 60;
        if hours > 0 {
            format!("{:02}:{:02}", hours, minutes)
        } else {
            format!("{:02}:{:02}", minutes, remaining_secs % 60)
        }
    }
}

/// 시계 태스크 핸들. drop 되거나 `stop` 하면 tick 이 멈춘다.
#[derive(Debug)]
pub struct ClockHandle {
    id: ClockId,
    cancel: CancellationToken,
}

impl ClockHandle {
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Clock {:?} stopped", self.id);
        }
        self.cancel.cancel();
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Clone)]
pub struct ClockService {
    time: Arc<dyn TimeSource>,
    tick: Duration,
}

impl ClockService {
    pub fn new(time: Arc<dyn TimeSource>, tick: Duration) -> Self {
        Self { time, tick }
    }

    /// 시계 하나를 띄운다. 첫 poll 은 즉시 일어나므로 이미 지난 마감은 바로 Expired 가 된다.
    pub fn start(
        &self,
        id: ClockId,
        end_ms: i64,
        parent: &CancellationToken,
        tx: mpsc::UnboundedSender<ClockEvent>,
    ) -> ClockHandle {
        let cancel = parent.child_token();
        let task_cancel = cancel.clone();
        let time = self.time.clone();
        let tick = self.tick;

        tokio::spawn(async move {
            let mut countdown = Countdown::new(end_ms);
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!("Clock {:?} cancelled", id);
                        return;
                    }
                    _ = interval.tick() => {}
                }

                let signal = match countdown.poll(time.now_ms()) {
                    ClockReading::Tick { remaining_secs } => ClockSignal::Tick { remaining_secs },
                    ClockReading::Unchanged => continue,
                    ClockReading::Expired => ClockSignal::Expired,
                    ClockReading::Idle => return,
                };

                if tx.send(ClockEvent { id, signal }).is_err() {
                    return;
                }
                if signal == ClockSignal::Expired {
                    debug!("Clock {:?} expired", id);
                    return;
                }
            }
        });

        ClockHandle { id, cancel }
    }
}
