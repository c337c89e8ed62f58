//! 1:1 제한 시간 대결 (PvP).
//!
//! `Waiting → Playing → Finished`. 정답 판정과 점수는 전부 서버가 정한다.
//! 클라이언트는 제출을 한 번만 보내고 결과 이벤트를 기다린다.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    Command, ConnectionState, Controller, ExitReason, Input, PlayerIntent, Question,
    QuestionDeck, TimerKind,
};
use crate::{
    clock::{ClockEvent, ClockId, ClockSignal},
    combo::ComboState,
    effects::{audio::SoundCue, EffectKind},
    env::{BattleSettings, EffectSettings},
    exception::SubmitRejection,
    gateway::{BattleOutcome, RewardRecord},
    protocol::{BattleMode, ClientMessage, Opponent, RawQuestion, RewardBreakdown, ServerMessage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Waiting,
    Playing,
    Finished,
}

/// 현재 문제의 하위 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QuestionPhase {
    Open,
    /// 제출 후 answer_result 대기 중 (isSubmitting)
    Pending { question_id: String },
    /// 결과 표시 중. 지연 후 다음 문제로 넘어간다.
    Resolved { correct: bool, points: u32 },
}

#[derive(Debug, Clone)]
pub struct PvpMatch {
    pub id: String,
    pub status: MatchStatus,
    pub opponent: Opponent,
    pub start_ms: i64,
    pub end_ms: i64,
    pub questions: QuestionDeck,
    pub my_score: u32,
    pub opponent_score: u32,
    pub current_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub outcome: BattleOutcome,
    pub my_score: u32,
    pub opponent_score: u32,
    pub winner_id: Option<String>,
    pub elo_delta: i32,
    pub rewards: RewardBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct PvpSnapshot {
    pub session_id: String,
    /// None 이면 아직 match_start 를 받지 못한 상태
    pub status: Option<MatchStatus>,
    pub opponent: Option<Opponent>,
    pub my_score: u32,
    pub opponent_score: u32,
    pub question_index: usize,
    pub question_count: usize,
    pub question: Option<Question>,
    pub phase: QuestionPhase,
    pub is_submitting: bool,
    pub streak: u32,
    pub multiplier: f64,
    pub countdown_secs: Option<u64>,
    pub remaining_secs: Option<u64>,
    pub time_up: bool,
    pub connected: bool,
    pub result: Option<MatchResult>,
    pub last_rejection: Option<SubmitRejection>,
}

pub struct MatchController {
    session_id: String,
    player_id: String,
    battle: BattleSettings,
    effects: EffectSettings,
    session: Option<PvpMatch>,
    phase: QuestionPhase,
    shown_at_ms: i64,
    combo: ComboState,
    countdown_secs: Option<u64>,
    remaining_secs: Option<u64>,
    time_up: bool,
    connected: bool,
    result: Option<MatchResult>,
    last_rejection: Option<SubmitRejection>,
    exited: bool,
}

impl MatchController {
    pub fn new(
        session_id: impl Into<String>,
        player_id: impl Into<String>,
        battle: BattleSettings,
        effects: EffectSettings,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            player_id: player_id.into(),
            battle,
            effects,
            session: None,
            phase: QuestionPhase::Open,
            shown_at_ms: 0,
            combo: ComboState::new(),
            countdown_secs: None,
            remaining_secs: None,
            time_up: false,
            connected: true,
            result: None,
            last_rejection: None,
            exited: false,
        }
    }

    pub fn session(&self) -> Option<&PvpMatch> {
        self.session.as_ref()
    }

    pub fn status(&self) -> Option<MatchStatus> {
        self.session.as_ref().map(|s| s.status)
    }

    pub fn phase(&self) -> &QuestionPhase {
        &self.phase
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    pub fn streak(&self) -> u32 {
        self.combo.streak()
    }

    /// 답안 제출. 같은 문제에 대한 두 번째 제출은 대기열에 쌓이지 않고 거부된다.
    pub fn submit(
        &mut self,
        option_index: usize,
        now_ms: i64,
    ) -> Result<Vec<Command>, SubmitRejection> {
        let session = self.session.as_ref().ok_or(SubmitRejection::NotStarted)?;
        match session.status {
            MatchStatus::Waiting => return Err(SubmitRejection::NotStarted),
            MatchStatus::Finished => return Err(SubmitRejection::Finished),
            MatchStatus::Playing => {}
        }
        if self.time_up {
            return Err(SubmitRejection::TimeUp);
        }
        match self.phase {
            QuestionPhase::Open => {}
            QuestionPhase::Pending { .. } => return Err(SubmitRejection::Pending),
            QuestionPhase::Resolved { .. } => return Err(SubmitRejection::AlreadyAnswered),
        }

        let question = session
            .questions
            .get(session.current_index)
            .ok_or(SubmitRejection::NoQuestion)?;
        let answer = question
            .options
            .get(option_index)
            .ok_or(SubmitRejection::InvalidOption)?
            .clone();
        let question_id = question.id.clone();
        let elapsed_ms = now_ms.saturating_sub(self.shown_at_ms).max(0) as u64;

        debug!(
            "[{}] Submitting answer for {} after {}ms",
            self.player_id, question_id, elapsed_ms
        );
        self.phase = QuestionPhase::Pending {
            question_id: question_id.clone(),
        };

        Ok(vec![Command::Send(ClientMessage::SubmitAnswer {
            question_id,
            answer,
            elapsed_ms,
        })])
    }

    fn on_server(&mut self, msg: ServerMessage, now_ms: i64) -> Vec<Command> {
        let kind = msg.kind();
        match msg {
            ServerMessage::MatchStart {
                match_id,
                questions,
                opponent,
                start_time,
                end_time,
            } => self.on_match_start(match_id, questions, opponent, start_time, end_time),
            ServerMessage::AnswerResult {
                question_id,
                correct,
                points,
            } => self.on_answer_result(question_id, correct, points),
            ServerMessage::OpponentScore { score } => self.on_opponent_score(score),
            ServerMessage::MatchFinished {
                my_score,
                opponent_score,
                winner_id,
                elo_delta,
                rewards,
            } => self.on_match_finished(my_score, opponent_score, winner_id, elo_delta, rewards),
            ServerMessage::OpponentEmote { emote } => self.on_opponent_emote(emote),
            ServerMessage::Error { code, message } => {
                warn!("[{}] Server error {}: {}", self.player_id, code, message);
                Vec::new()
            }
            ServerMessage::RaidStart { .. }
            | ServerMessage::RaidHpUpdate { .. }
            | ServerMessage::RaidBossSkill { .. }
            | ServerMessage::RaidMoreQuestions { .. }
            | ServerMessage::RaidVictory { .. }
            | ServerMessage::RaidTimeout => {
                debug!(
                    "[{}] PvP controller ignoring {} at {}",
                    self.player_id, kind, now_ms
                );
                Vec::new()
            }
        }
    }

    fn on_match_start(
        &mut self,
        match_id: String,
        questions: Vec<RawQuestion>,
        opponent: Opponent,
        start_time: i64,
        end_time: i64,
    ) -> Vec<Command> {
        if self.session.is_some() || self.exited {
            warn!("[{}] Duplicate match_start {} ignored", self.player_id, match_id);
            return Vec::new();
        }

        let questions = QuestionDeck::from_raw(questions);
        info!(
            "[{}] Match {} ready vs {} ({} questions)",
            self.player_id,
            match_id,
            opponent.name,
            questions.len()
        );

        self.session = Some(PvpMatch {
            id: match_id,
            status: MatchStatus::Waiting,
            opponent,
            start_ms: start_time,
            end_ms: end_time,
            questions,
            my_score: 0,
            opponent_score: 0,
            current_index: 0,
        });

        vec![Command::StartClock {
            id: ClockId::Countdown,
            end_ms: start_time,
        }]
    }

    fn begin_play(&mut self, now_ms: i64) -> Vec<Command> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.status = MatchStatus::Playing;
        self.countdown_secs = None;
        self.phase = QuestionPhase::Open;
        self.shown_at_ms = now_ms;
        info!("[{}] Match {} started", self.player_id, session.id);

        vec![Command::StartClock {
            id: ClockId::Match,
            end_ms: session.end_ms,
        }]
    }

    fn on_answer_result(&mut self, question_id: String, correct: bool, points: u32) -> Vec<Command> {
        let Some(session) = self.session.as_mut() else {
            warn!("[{}] answer_result before match_start ignored", self.player_id);
            return Vec::new();
        };
        if session.status != MatchStatus::Playing {
            debug!("[{}] answer_result outside play ignored", self.player_id);
            return Vec::new();
        }
        match &self.phase {
            QuestionPhase::Pending { question_id: pending } if *pending == question_id => {}
            _ => {
                warn!(
                    "[{}] Stale answer_result for {} ignored",
                    self.player_id, question_id
                );
                return Vec::new();
            }
        }

        let mut commands = Vec::new();
        if correct {
            session.my_score = session.my_score.saturating_add(points);
            let streak = self.combo.record_hit();
            commands.push(Command::effect(
                EffectKind::FloatingText {
                    text: format!("+{}", points),
                },
                self.effects.floating_text_ms,
            ));
            if streak >= 2 {
                commands.push(Command::effect(
                    EffectKind::Streak { streak },
                    self.effects.streak_ms,
                ));
            }
            commands.push(Command::Sound(SoundCue::Correct));
        } else {
            self.combo.miss();
            commands.push(Command::effect(
                EffectKind::FloatingText {
                    text: "MISS".to_string(),
                },
                self.effects.floating_text_ms,
            ));
            commands.push(Command::Sound(SoundCue::Wrong));
        }

        self.phase = QuestionPhase::Resolved { correct, points };
        commands.push(Command::Schedule {
            timer: TimerKind::AdvanceQuestion {
                from_index: session.current_index,
            },
            after: self.battle.result_display_delay(),
        });
        commands
    }

    fn advance(&mut self, from_index: usize, now_ms: i64) -> Vec<Command> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        if session.status != MatchStatus::Playing || session.current_index != from_index {
            return Vec::new();
        }
        if !matches!(self.phase, QuestionPhase::Resolved { .. }) {
            return Vec::new();
        }

        session.current_index = (from_index + 1).min(session.questions.len());
        self.phase = QuestionPhase::Open;
        self.shown_at_ms = now_ms;
        debug!(
            "[{}] Advanced to question {}/{}",
            self.player_id,
            session.current_index,
            session.questions.len()
        );
        Vec::new()
    }

    fn on_opponent_score(&mut self, score: u32) -> Vec<Command> {
        match self.session.as_mut() {
            Some(session) if session.status != MatchStatus::Finished => {
                session.opponent_score = session.opponent_score.max(score);
            }
            _ => debug!("[{}] opponent_score ignored", self.player_id),
        }
        Vec::new()
    }

    fn on_match_finished(
        &mut self,
        my_score: u32,
        opponent_score: u32,
        winner_id: Option<String>,
        elo_delta: i32,
        rewards: RewardBreakdown,
    ) -> Vec<Command> {
        let Some(session) = self.session.as_mut() else {
            warn!("[{}] match_finished before match_start ignored", self.player_id);
            return Vec::new();
        };
        if session.status == MatchStatus::Finished {
            return Vec::new();
        }

        session.status = MatchStatus::Finished;
        session.my_score = my_score;
        session.opponent_score = opponent_score;

        let outcome = match &winner_id {
            Some(winner) if *winner == self.player_id => BattleOutcome::Won,
            Some(_) => BattleOutcome::Lost,
            None if my_score > opponent_score => BattleOutcome::Won,
            None if my_score < opponent_score => BattleOutcome::Lost,
            None => BattleOutcome::Draw,
        };
        info!(
            "[{}] Match {} finished: {:?} {}-{} (elo {:+})",
            self.player_id, session.id, outcome, my_score, opponent_score, elo_delta
        );

        let record = RewardRecord {
            mode: BattleMode::Pvp,
            session_id: session.id.clone(),
            player_id: self.player_id.clone(),
            outcome,
            score: my_score,
            damage_dealt: 0,
            elo_delta,
            rewards: rewards.clone(),
        };
        self.result = Some(MatchResult {
            outcome,
            my_score,
            opponent_score,
            winner_id,
            elo_delta,
            rewards,
        });

        let cue = if outcome == BattleOutcome::Lost {
            SoundCue::Defeat
        } else {
            SoundCue::Victory
        };
        vec![
            Command::StopClock(ClockId::Countdown),
            Command::StopClock(ClockId::Match),
            Command::Sound(cue),
            Command::Persist(record),
        ]
    }

    fn on_opponent_emote(&mut self, emote: String) -> Vec<Command> {
        if self.status() == Some(MatchStatus::Finished) {
            return Vec::new();
        }
        vec![Command::effect(
            EffectKind::Emote { emote, mine: false },
            self.effects.emote_ms,
        )]
    }

    fn on_intent(&mut self, intent: PlayerIntent, now_ms: i64) -> Vec<Command> {
        match intent {
            PlayerIntent::Answer { option_index } => match self.submit(option_index, now_ms) {
                Ok(commands) => {
                    self.last_rejection = None;
                    commands
                }
                Err(rejection) => {
                    debug!("[{}] Submission ignored: {}", self.player_id, rejection);
                    self.last_rejection = Some(rejection);
                    Vec::new()
                }
            },
            PlayerIntent::Emote { emote } => {
                if self.status() == Some(MatchStatus::Finished) {
                    return Vec::new();
                }
                vec![
                    Command::Send(ClientMessage::SendEmote {
                        emote: emote.clone(),
                    }),
                    Command::effect(EffectKind::Emote { emote, mine: true }, self.effects.emote_ms),
                ]
            }
            PlayerIntent::Exit => {
                self.exited = true;
                vec![Command::Exit(ExitReason::UserRequested)]
            }
        }
    }

    fn on_clock(&mut self, event: ClockEvent, now_ms: i64) -> Vec<Command> {
        let Some(status) = self.status() else {
            return Vec::new();
        };

        match (status, event.id, event.signal) {
            (MatchStatus::Waiting, ClockId::Countdown, ClockSignal::Tick { remaining_secs }) => {
                self.countdown_secs = Some(remaining_secs);
                vec![Command::Sound(SoundCue::Countdown)]
            }
            (MatchStatus::Waiting, ClockId::Countdown, ClockSignal::Expired) => {
                self.begin_play(now_ms)
            }
            (MatchStatus::Playing, ClockId::Match, ClockSignal::Tick { remaining_secs }) => {
                self.remaining_secs = Some(remaining_secs);
                Vec::new()
            }
            (MatchStatus::Playing, ClockId::Match, ClockSignal::Expired) => {
                // 입력만 멈춘다. Finished 전환은 서버의 match_finished 가 한다.
                self.remaining_secs = Some(0);
                self.time_up = true;
                info!("[{}] Match clock expired, waiting for result", self.player_id);
                vec![Command::effect(EffectKind::TimeUp, self.effects.time_up_ms)]
            }
            (MatchStatus::Waiting, _, _)
            | (MatchStatus::Playing, _, _)
            | (MatchStatus::Finished, _, _) => Vec::new(),
        }
    }

    fn on_timer(&mut self, timer: TimerKind, now_ms: i64) -> Vec<Command> {
        match timer {
            TimerKind::InitTimeout => {
                if self.session.is_some() || self.exited {
                    return Vec::new();
                }
                warn!(
                    "[{}] No match_start for session {}, leaving battle",
                    self.player_id, self.session_id
                );
                self.exited = true;
                vec![Command::Exit(ExitReason::MatchCancelled)]
            }
            TimerKind::AdvanceQuestion { from_index } => self.advance(from_index, now_ms),
            TimerKind::DebuffExpired { .. } | TimerKind::TerminalGrace => Vec::new(),
        }
    }

    fn on_connection(&mut self, state: ConnectionState) -> Vec<Command> {
        match state {
            ConnectionState::Connected => {
                self.connected = true;
                Vec::new()
            }
            ConnectionState::Disconnected => {
                self.connected = false;
                if self.session.is_none() && !self.exited {
                    warn!("[{}] Disconnected before match_start", self.player_id);
                    self.exited = true;
                    return vec![Command::Exit(ExitReason::Disconnected)];
                }
                warn!("[{}] Connection lost during match", self.player_id);
                Vec::new()
            }
        }
    }
}

impl Controller for MatchController {
    type Snapshot = PvpSnapshot;

    fn mode(&self) -> BattleMode {
        BattleMode::Pvp
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn start(&mut self) -> Vec<Command> {
        vec![
            Command::Send(ClientMessage::JoinSession {
                session_id: self.session_id.clone(),
                mode: BattleMode::Pvp,
            }),
            Command::Schedule {
                timer: TimerKind::InitTimeout,
                after: self.battle.session_init_timeout(),
            },
        ]
    }

    fn handle(&mut self, input: Input, now_ms: i64) -> Vec<Command> {
        match input {
            Input::Server(msg) => self.on_server(msg, now_ms),
            Input::Intent(intent) => self.on_intent(intent, now_ms),
            Input::Clock(event) => self.on_clock(event, now_ms),
            Input::Timer(timer) => self.on_timer(timer, now_ms),
            Input::Connection(state) => self.on_connection(state),
        }
    }

    fn snapshot(&self) -> PvpSnapshot {
        let session = self.session.as_ref();
        PvpSnapshot {
            session_id: self.session_id.clone(),
            status: session.map(|s| s.status),
            opponent: session.map(|s| s.opponent.clone()),
            my_score: session.map_or(0, |s| s.my_score),
            opponent_score: session.map_or(0, |s| s.opponent_score),
            question_index: session.map_or(0, |s| s.current_index),
            question_count: session.map_or(0, |s| s.questions.len()),
            question: session
                .filter(|s| s.status == MatchStatus::Playing)
                .and_then(|s| s.questions.get(s.current_index).cloned()),
            phase: self.phase.clone(),
            is_submitting: matches!(self.phase, QuestionPhase::Pending { .. }),
            streak: self.combo.streak(),
            multiplier: self.combo.multiplier(),
            countdown_secs: self.countdown_secs,
            remaining_secs: self.remaining_secs,
            time_up: self.time_up,
            connected: self.connected,
            result: self.result.clone(),
            last_rejection: self.last_rejection,
        }
    }

    fn is_terminal(&self) -> bool {
        self.status() == Some(MatchStatus::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn raw_questions(count: usize) -> Vec<RawQuestion> {
        (0..count)
            .map(|i| RawQuestion {
                id: format!("q{}", i),
                prompt: format!("{} + {}", i, i),
                options: json!([format!("{}", i * 2), "x", "y", "z"]),
                correct_answer: None,
            })
            .collect()
    }

    fn controller() -> MatchController {
        MatchController::new(
            "session-1",
            "me",
            BattleSettings::default(),
            EffectSettings::default(),
        )
    }

    fn start_match(c: &mut MatchController, questions: usize) {
        c.handle(
            Input::Server(ServerMessage::MatchStart {
                match_id: "m1".to_string(),
                questions: raw_questions(questions),
                opponent: Opponent {
                    id: "rival".to_string(),
                    name: "Rival".to_string(),
                },
                start_time: NOW + 3_000,
                end_time: NOW + 63_000,
            }),
            NOW,
        );
        c.handle(
            Input::Clock(ClockEvent {
                id: ClockId::Countdown,
                signal: ClockSignal::Expired,
            }),
            NOW + 3_000,
        );
    }

    fn result(question_id: &str, correct: bool, points: u32) -> Input {
        Input::Server(ServerMessage::AnswerResult {
            question_id: question_id.to_string(),
            correct,
            points,
        })
    }

    fn advance_from(index: usize) -> Input {
        Input::Timer(TimerKind::AdvanceQuestion { from_index: index })
    }

    #[test]
    fn start_joins_and_arms_init_timeout() {
        let mut c = controller();
        let commands = c.start();
        assert!(matches!(
            commands[0],
            Command::Send(ClientMessage::JoinSession { .. })
        ));
        assert!(commands.contains(&Command::Schedule {
            timer: TimerKind::InitTimeout,
            after: BattleSettings::default().session_init_timeout(),
        }));
    }

    #[test]
    fn match_start_enters_waiting_and_starts_countdown() {
        let mut c = controller();
        let commands = c.handle(
            Input::Server(ServerMessage::MatchStart {
                match_id: "m1".to_string(),
                questions: raw_questions(3),
                opponent: Opponent {
                    id: "rival".to_string(),
                    name: "Rival".to_string(),
                },
                start_time: NOW + 3_000,
                end_time: NOW + 63_000,
            }),
            NOW,
        );
        assert_eq!(c.status(), Some(MatchStatus::Waiting));
        assert_eq!(
            commands,
            vec![Command::StartClock {
                id: ClockId::Countdown,
                end_ms: NOW + 3_000
            }]
        );
        assert_eq!(c.submit(0, NOW), Err(SubmitRejection::NotStarted));
    }

    #[test]
    fn countdown_expiry_starts_play_and_match_clock() {
        let mut c = controller();
        start_match(&mut c, 3);
        assert_eq!(c.status(), Some(MatchStatus::Playing));
        assert_eq!(c.snapshot().question.map(|q| q.id), Some("q0".to_string()));
    }

    #[test]
    fn submission_carries_elapsed_time() {
        let mut c = controller();
        start_match(&mut c, 3);
        let commands = c.submit(0, NOW + 4_250).unwrap();
        assert_eq!(
            commands,
            vec![Command::Send(ClientMessage::SubmitAnswer {
                question_id: "q0".to_string(),
                answer: "0".to_string(),
                elapsed_ms: 1_250,
            })]
        );
        assert!(c.snapshot().is_submitting);
    }

    #[test]
    fn second_submission_while_pending_is_a_noop() {
        let mut c = controller();
        start_match(&mut c, 3);
        c.submit(0, NOW + 4_000).unwrap();
        assert_eq!(c.submit(1, NOW + 4_100), Err(SubmitRejection::Pending));

        // intent 경로도 같은 가드를 탄다
        let commands = c.handle(
            Input::Intent(PlayerIntent::Answer { option_index: 0 }),
            NOW + 4_200,
        );
        assert!(commands.is_empty());
        assert_eq!(c.snapshot().last_rejection, Some(SubmitRejection::Pending));

        c.handle(result("q0", true, 100), NOW + 4_300);
        // 결과가 한 번만 반영된다
        c.handle(result("q0", true, 100), NOW + 4_400);
        assert_eq!(c.session().unwrap().my_score, 100);
    }

    #[test]
    fn stale_result_is_ignored() {
        let mut c = controller();
        start_match(&mut c, 3);
        c.submit(0, NOW + 4_000).unwrap();
        let commands = c.handle(result("q7", true, 500), NOW + 4_100);
        assert!(commands.is_empty());
        assert_eq!(c.session().unwrap().my_score, 0);
        assert!(matches!(c.phase(), QuestionPhase::Pending { .. }));
    }

    #[test]
    fn incorrect_result_resets_streak_and_schedules_advance() {
        let mut c = controller();
        start_match(&mut c, 3);
        c.submit(0, NOW + 4_000).unwrap();
        c.handle(result("q0", true, 100), NOW + 4_100);
        c.handle(advance_from(0), NOW + 5_600);
        c.submit(0, NOW + 6_000).unwrap();
        c.handle(result("q1", true, 100), NOW + 6_100);
        assert_eq!(c.streak(), 2);
        c.handle(advance_from(1), NOW + 7_600);

        c.submit(2, NOW + 8_000).unwrap();
        let commands = c.handle(result("q2", false, 0), NOW + 8_100);
        assert_eq!(c.streak(), 0);
        assert!(commands.contains(&Command::Schedule {
            timer: TimerKind::AdvanceQuestion { from_index: 2 },
            after: BattleSettings::default().result_display_delay(),
        }));
        assert_eq!(c.submit(1, NOW + 8_200), Err(SubmitRejection::AlreadyAnswered));
    }

    #[test]
    fn stale_advance_timer_does_not_skip_questions() {
        let mut c = controller();
        start_match(&mut c, 3);
        c.submit(0, NOW + 4_000).unwrap();
        c.handle(result("q0", true, 10), NOW + 4_100);
        c.handle(advance_from(0), NOW + 5_600);
        c.handle(advance_from(0), NOW + 5_700);
        assert_eq!(c.session().unwrap().current_index, 1);
    }

    #[test]
    fn opponent_updates_do_not_disturb_pending_question() {
        let mut c = controller();
        start_match(&mut c, 3);
        c.submit(0, NOW + 4_000).unwrap();
        c.handle(
            Input::Server(ServerMessage::OpponentScore { score: 200 }),
            NOW + 4_050,
        );
        c.handle(
            Input::Server(ServerMessage::OpponentScore { score: 150 }),
            NOW + 4_060,
        );
        assert_eq!(c.session().unwrap().opponent_score, 200);
        assert_eq!(
            c.phase(),
            &QuestionPhase::Pending {
                question_id: "q0".to_string()
            }
        );
    }

    #[test]
    fn clock_expiry_freezes_input_without_finishing() {
        let mut c = controller();
        start_match(&mut c, 3);
        let commands = c.handle(
            Input::Clock(ClockEvent {
                id: ClockId::Match,
                signal: ClockSignal::Expired,
            }),
            NOW + 63_000,
        );
        assert_eq!(c.status(), Some(MatchStatus::Playing));
        assert!(c.snapshot().time_up);
        assert!(matches!(commands[0], Command::Effect { kind: EffectKind::TimeUp, .. }));
        assert_eq!(c.submit(0, NOW + 63_100), Err(SubmitRejection::TimeUp));
    }

    #[test]
    fn scenario_five_confirmed_answers_then_finish() {
        let mut c = controller();
        start_match(&mut c, 5);
        let awarded = [100u32, 120, 90, 150, 110];

        let mut t = NOW + 4_000;
        for (i, points) in awarded.iter().enumerate() {
            c.submit(0, t).unwrap();
            c.handle(result(&format!("q{}", i), true, *points), t + 100);
            c.handle(advance_from(i), t + 1_600);
            t += 2_000;
        }
        let total: u32 = awarded.iter().sum();
        assert_eq!(c.session().unwrap().my_score, total);

        let commands = c.handle(
            Input::Server(ServerMessage::MatchFinished {
                my_score: total,
                opponent_score: 300,
                winner_id: Some("me".to_string()),
                elo_delta: 18,
                rewards: RewardBreakdown {
                    xp: 50,
                    gems: 5,
                    lives: 0,
                },
            }),
            t,
        );
        assert!(c.is_terminal());
        assert!(commands
            .iter()
            .any(|cmd| matches!(cmd, Command::Persist(r) if r.outcome == BattleOutcome::Won)));

        c.handle(
            Input::Server(ServerMessage::OpponentScore { score: 9_999 }),
            t + 10,
        );
        let snapshot = c.snapshot();
        assert_eq!(snapshot.status, Some(MatchStatus::Finished));
        assert_eq!(snapshot.opponent_score, 300);
        assert_eq!(snapshot.my_score, total);
    }

    #[test]
    fn init_timeout_without_session_exits() {
        let mut c = controller();
        let commands = c.handle(Input::Timer(TimerKind::InitTimeout), NOW);
        assert_eq!(commands, vec![Command::Exit(ExitReason::MatchCancelled)]);

        let mut c = controller();
        start_match(&mut c, 1);
        assert!(c.handle(Input::Timer(TimerKind::InitTimeout), NOW).is_empty());
    }

    #[test]
    fn disconnect_without_payload_redirects() {
        let mut c = controller();
        let commands = c.handle(Input::Connection(ConnectionState::Disconnected), NOW);
        assert_eq!(commands, vec![Command::Exit(ExitReason::Disconnected)]);

        let mut c = controller();
        start_match(&mut c, 1);
        let commands = c.handle(Input::Connection(ConnectionState::Disconnected), NOW);
        assert!(commands.is_empty());
        assert!(!c.snapshot().connected);
    }

    #[test]
    fn emotes_are_decorative_and_stop_after_finish() {
        let mut c = controller();
        start_match(&mut c, 1);
        let commands = c.handle(
            Input::Server(ServerMessage::OpponentEmote {
                emote: "wave".to_string(),
            }),
            NOW,
        );
        assert_eq!(commands.len(), 1);
        assert_eq!(c.session().unwrap().my_score, 0);

        c.handle(
            Input::Server(ServerMessage::MatchFinished {
                my_score: 0,
                opponent_score: 0,
                winner_id: None,
                elo_delta: 0,
                rewards: RewardBreakdown::default(),
            }),
            NOW,
        );
        assert_eq!(c.result().map(|r| r.outcome), Some(BattleOutcome::Draw));
        assert!(c
            .handle(
                Input::Intent(PlayerIntent::Emote {
                    emote: "gg".to_string()
                }),
                NOW
            )
            .is_empty());
    }
}
