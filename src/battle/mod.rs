//! 전투 상태 머신.
//!
//! 컨트롤러는 IO 를 하지 않는다. `Input` 하나를 받아 자기 상태를 바꾸고,
//! 런타임이 실행할 `Command` 목록을 돌려줄 뿐이다.

use std::time::Duration;

use serde::Serialize;

use crate::{
    clock::{ClockEvent, ClockId},
    effects::{audio::SoundCue, EffectKind},
    gateway::RewardRecord,
    protocol::{BattleMode, ClientMessage, ServerMessage},
};

pub mod pvp;
pub mod question;
pub mod raid;

pub use pvp::{MatchController, MatchStatus, PvpSnapshot};
pub use question::{Question, QuestionDeck};
pub use raid::{RaidController, RaidSnapshot, RaidStatus};

/// 프레젠테이션 레이어가 보낼 수 있는 의도(intent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerIntent {
    Answer { option_index: usize },
    Emote { emote: String },
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// 런타임이 예약해 두었다가 다시 컨트롤러로 넘겨주는 1회성 타이머.
///
/// 예약 시점의 문제 번호 / 디버프 세대를 들고 있어서, 늦게 도착한 타이머는 무시된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    InitTimeout,
    AdvanceQuestion { from_index: usize },
    DebuffExpired { generation: u64 },
    /// Raid 시계 만료 후 서버 판정을 기다리는 유예가 끝남
    TerminalGrace,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Server(ServerMessage),
    Intent(PlayerIntent),
    Clock(ClockEvent),
    Timer(TimerKind),
    Connection(ConnectionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// session-init 이 제한 시간 안에 오지 않음
    MatchCancelled,
    /// 세션 페이로드 없이 연결이 끊김
    Disconnected,
    UserRequested,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(ClientMessage),
    StartClock { id: ClockId, end_ms: i64 },
    StopClock(ClockId),
    Schedule { timer: TimerKind, after: Duration },
    Effect { kind: EffectKind, lifetime: Duration },
    Sound(SoundCue),
    Persist(RewardRecord),
    Exit(ExitReason),
}

impl Command {
    pub(crate) fn effect(kind: EffectKind, lifetime_ms: u64) -> Self {
        Command::Effect {
            kind,
            lifetime: Duration::from_millis(lifetime_ms),
        }
    }
}

pub trait Controller: Send {
    type Snapshot: Clone + Send + Sync + std::fmt::Debug + 'static;

    fn mode(&self) -> BattleMode;

    fn session_id(&self) -> &str;

    /// 전투 화면 진입 시 한 번. 세션 참가 요청과 init 타임아웃 예약.
    fn start(&mut self) -> Vec<Command>;

    fn handle(&mut self, input: Input, now_ms: i64) -> Vec<Command>;

    fn snapshot(&self) -> Self::Snapshot;

    /// Finished / Victory / Defeat
    fn is_terminal(&self) -> bool;
}
