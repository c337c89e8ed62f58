use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    Correct,
    Wrong,
    Hit,
    BossSkill,
    Countdown,
    Victory,
    Defeat,
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// 브라우저 autoplay 정책 등으로 재생이 거부됨
    #[error("Playback rejected: {0}")]
    Rejected(String),
    #[error("Audio device unavailable")]
    Unavailable,
}

pub trait AudioSink: Send + Sync {
    fn play(&self, cue: SoundCue) -> Result<(), AudioError>;
}

/// 소리를 내지 않는 기본 sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn play(&self, _cue: SoundCue) -> Result<(), AudioError> {
        Ok(())
    }
}

/// 재생 실패는 게임 진행을 막지 않는다.
pub fn play_cue(sink: &dyn AudioSink, cue: SoundCue) {
    if let Err(e) = sink.play(cue) {
        debug!("Ignoring audio failure for {:?}: {}", cue, e);
    }
}
