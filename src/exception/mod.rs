use std::fmt;

use serde::Serialize;

/// 전투 엔진 전체에서 사용하는 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Transport closed")]
    TransportClosed,
    #[error("Gateway error: {0}")]
    Gateway(#[from] reqwest::Error),
    #[error("Gateway rejected request: {status} {body}")]
    GatewayStatus { status: u16, body: String },
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("Connection timeout")]
    ConnectionTimeout,
}

/// 답안 제출이 무시된 이유.
///
/// 오답과는 다르다. 거부된 제출은 콤보, 점수, 진행 상태 어느 것도 바꾸지 않는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitRejection {
    /// session-init 이전, 혹은 카운트다운 중
    NotStarted,
    /// 이전 제출의 결과를 기다리는 중
    Pending,
    /// 현재 문제는 이미 결과가 나와서 다음 문제로 넘어가기를 기다리는 중
    AlreadyAnswered,
    /// 남은 문제가 없음 (Raid 는 추가 문제를 기다리는 중)
    NoQuestion,
    /// 존재하지 않는 보기 번호
    InvalidOption,
    /// 매치 시계가 만료되어 입력이 동결됨
    TimeUp,
    /// 보스의 silence 디버프가 활성화된 상태
    Silenced,
    /// 이미 종료된 세션
    Finished,
}

impl fmt::Display for SubmitRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NOT_STARTED"),
            Self::Pending => write!(f, "PENDING"),
            Self::AlreadyAnswered => write!(f, "ALREADY_ANSWERED"),
            Self::NoQuestion => write!(f, "NO_QUESTION"),
            Self::InvalidOption => write!(f, "INVALID_OPTION"),
            Self::TimeUp => write!(f, "TIME_UP"),
            Self::Silenced => write!(f, "SILENCED"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}
