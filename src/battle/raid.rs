//! 협동 보스 레이드.
//!
//! 판정은 로컬에서 즉시 하고, 데미지는 서버로 흘려보내기만 한다.
//! 보스 HP 는 `raid_hp_update` 브로드캐스트만 바꿀 수 있다.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    Command, ConnectionState, Controller, ExitReason, Input, PlayerIntent, Question,
    QuestionDeck, TimerKind,
};
use crate::{
    answer::{evaluate, Verdict},
    clock::{ClockEvent, ClockId, ClockSignal, Countdown, RaidClockDisplay},
    combo::ComboState,
    effects::{audio::SoundCue, EffectKind},
    env::{BattleSettings, EffectSettings},
    exception::SubmitRejection,
    gateway::{BattleOutcome, RewardRecord},
    protocol::{
        BattleMode, BossStats, ClientMessage, LeaderboardEntry, RawQuestion, RewardBreakdown,
        ServerMessage,
    },
};

/// 입력을 막는 디버프
const SILENCE: &str = "silence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidStatus {
    Loading,
    Active,
    Victory,
    Defeat,
}

impl RaidStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RaidStatus::Victory | RaidStatus::Defeat)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Boss {
    pub name: String,
    pub max_hp: u32,
    pub current_hp: u32,
}

impl Boss {
    fn from_stats(stats: BossStats) -> Self {
        let current_hp = stats.current_hp.unwrap_or(stats.max_hp).min(stats.max_hp);
        Self {
            name: stats.name,
            max_hp: stats.max_hp,
            current_hp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveDebuff {
    pub tag: String,
    pub generation: u64,
    pub expires_at_ms: i64,
}

impl ActiveDebuff {
    pub fn blocks_input(&self) -> bool {
        self.tag.eq_ignore_ascii_case(SILENCE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RaidPhase {
    Open,
    Resolved { verdict: Verdict },
}

#[derive(Debug, Clone)]
pub struct RaidEncounter {
    pub id: String,
    pub status: RaidStatus,
    pub boss: Boss,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub questions: QuestionDeck,
    pub current_index: usize,
    pub end_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaidResult {
    pub outcome: BattleOutcome,
    pub mvp: Option<String>,
    pub damage_dealt: u32,
    pub rewards: RewardBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaidSnapshot {
    pub session_id: String,
    pub status: RaidStatus,
    pub raid_id: Option<String>,
    pub boss: Option<Boss>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub question_index: usize,
    pub question_count: usize,
    pub question: Option<Question>,
    pub phase: RaidPhase,
    pub streak: u32,
    pub multiplier: f64,
    pub damage_dealt: u32,
    pub active_debuff: Option<ActiveDebuff>,
    pub clock: Option<RaidClockDisplay>,
    pub fetching_more: bool,
    /// 시계는 끝났지만 서버의 최종 판정을 아직 기다리는 중
    pub time_up: bool,
    pub connected: bool,
    pub result: Option<RaidResult>,
    pub last_rejection: Option<SubmitRejection>,
}

pub struct RaidController {
    session_id: String,
    player_id: String,
    battle: BattleSettings,
    effects: EffectSettings,
    encounter: Option<RaidEncounter>,
    phase: RaidPhase,
    combo: ComboState,
    damage_dealt: u32,
    active_debuff: Option<ActiveDebuff>,
    debuff_generation: u64,
    fetching_more: bool,
    clock: Option<RaidClockDisplay>,
    time_up: bool,
    connected: bool,
    result: Option<RaidResult>,
    last_rejection: Option<SubmitRejection>,
    exited: bool,
}

impl RaidController {
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
            encounter: None,
            phase: RaidPhase::Open,
            combo: ComboState::new(),
            damage_dealt: 0,
            active_debuff: None,
            debuff_generation: 0,
            fetching_more: false,
            clock: None,
            time_up: false,
            connected: true,
            result: None,
            last_rejection: None,
            exited: false,
        }
    }

    pub fn status(&self) -> RaidStatus {
        self.encounter
            .as_ref()
            .map_or(RaidStatus::Loading, |e| e.status)
    }

    pub fn encounter(&self) -> Option<&RaidEncounter> {
        self.encounter.as_ref()
    }

    pub fn active_debuff(&self) -> Option<&ActiveDebuff> {
        self.active_debuff.as_ref()
    }

    pub fn streak(&self) -> u32 {
        self.combo.streak()
    }

    pub fn damage_dealt(&self) -> u32 {
        self.damage_dealt
    }

    pub fn result(&self) -> Option<&RaidResult> {
        self.result.as_ref()
    }

    /// 로컬 판정 후 데미지를 보낸다.
    ///
    /// silence 중에는 오답으로 치지 않고 `Silenced` 로 거부한다.
    pub fn submit(
        &mut self,
        option_index: usize,
    ) -> Result<(Verdict, Vec<Command>), SubmitRejection> {
        let encounter = self.encounter.as_ref().ok_or(SubmitRejection::NotStarted)?;
        match encounter.status {
            RaidStatus::Loading => return Err(SubmitRejection::NotStarted),
            RaidStatus::Victory | RaidStatus::Defeat => return Err(SubmitRejection::Finished),
            RaidStatus::Active => {}
        }
        if self.time_up {
            return Err(SubmitRejection::TimeUp);
        }
        if self
            .active_debuff
            .as_ref()
            .map_or(false, ActiveDebuff::blocks_input)
        {
            return Err(SubmitRejection::Silenced);
        }
        if let RaidPhase::Resolved { .. } = self.phase {
            return Err(SubmitRejection::AlreadyAnswered);
        }

        let question = encounter
            .questions
            .get(encounter.current_index)
            .ok_or(SubmitRejection::NoQuestion)?;
        if option_index >= question.options.len() {
            return Err(SubmitRejection::InvalidOption);
        }
        let verdict = evaluate(
            &question.options,
            question.correct_answer.as_deref(),
            option_index,
        );
        let from_index = encounter.current_index;

        let mut commands = Vec::new();
        match verdict {
            Verdict::Correct => {
                let damage = self.combo.hit(self.battle.base_damage);
                let streak = self.combo.streak();
                self.damage_dealt = self.damage_dealt.saturating_add(damage);
                debug!(
                    "[{}] Hit for {} (streak {}, x{})",
                    self.player_id,
                    damage,
                    streak,
                    self.combo.multiplier()
                );

                commands.push(Command::Send(ClientMessage::SubmitDamage { amount: damage }));
                commands.push(Command::effect(
                    EffectKind::Projectile,
                    self.effects.projectile_ms,
                ));
                commands.push(Command::effect(
                    EffectKind::FloatingText {
                        text: format!("-{}", damage),
                    },
                    self.effects.floating_text_ms,
                ));
                if streak >= 2 {
                    commands.push(Command::effect(
                        EffectKind::Streak { streak },
                        self.effects.streak_ms,
                    ));
                }
                commands.push(Command::Sound(SoundCue::Hit));
            }
            Verdict::Incorrect => {
                self.combo.miss();
                commands.push(Command::effect(
                    EffectKind::FloatingText {
                        text: "MISS".to_string(),
                    },
                    self.effects.floating_text_ms,
                ));
                commands.push(Command::Sound(SoundCue::Wrong));
            }
        }

        self.phase = RaidPhase::Resolved { verdict };
        commands.push(Command::Schedule {
            timer: TimerKind::AdvanceQuestion { from_index },
            after: self.battle.result_display_delay(),
        });
        Ok((verdict, commands))
    }

    /// 남은 문제가 기준보다 적으면 추가 문제를 요청한다. 동시에 하나만.
    fn maybe_request_more(&mut self) -> Option<Command> {
        let encounter = self.encounter.as_ref()?;
        if encounter.status != RaidStatus::Active || self.fetching_more || self.time_up {
            return None;
        }

        let remaining = encounter
            .questions
            .len()
            .saturating_sub(encounter.current_index);
        if remaining >= self.battle.question_low_water_mark {
            return None;
        }

        self.fetching_more = true;
        info!(
            "[{}] {} questions left, requesting more",
            self.player_id, remaining
        );
        Some(Command::Send(ClientMessage::FetchMoreQuestions {
            seen_ids: encounter.questions.ids(),
        }))
    }

    fn on_server(&mut self, msg: ServerMessage, now_ms: i64) -> Vec<Command> {
        if self.status().is_terminal() {
            debug!(
                "[{}] {} after raid end ignored",
                self.player_id,
                msg.kind()
            );
            return Vec::new();
        }

        let kind = msg.kind();
        match msg {
            ServerMessage::RaidStart {
                raid_id,
                boss,
                questions,
                end_time,
            } => self.on_raid_start(raid_id, boss, questions, end_time, now_ms),
            ServerMessage::RaidHpUpdate {
                current_hp,
                attacker_id,
                damage,
                leaderboard,
            } => self.on_hp_update(current_hp, attacker_id, damage, leaderboard),
            ServerMessage::RaidBossSkill { debuff, duration_ms } => {
                self.on_boss_skill(debuff, duration_ms, now_ms)
            }
            ServerMessage::RaidMoreQuestions { questions } => self.on_more_questions(questions),
            ServerMessage::RaidVictory { mvp, rewards } => self.on_victory(mvp, rewards),
            ServerMessage::RaidTimeout => {
                info!("[{}] Server reported raid timeout", self.player_id);
                self.defeat()
            }
            ServerMessage::Error { code, message } => {
                warn!("[{}] Server error {}: {}", self.player_id, code, message);
                if self.fetching_more {
                    // 추가 문제 요청이 실패했을 수도 있으니 다음 진행 때 다시 시도한다.
                    self.fetching_more = false;
                }
                Vec::new()
            }
            ServerMessage::MatchStart { .. }
            | ServerMessage::AnswerResult { .. }
            | ServerMessage::OpponentScore { .. }
            | ServerMessage::MatchFinished { .. }
            | ServerMessage::OpponentEmote { .. } => {
                debug!("[{}] Raid controller ignoring {}", self.player_id, kind);
                Vec::new()
            }
        }
    }

    fn on_raid_start(
        &mut self,
        raid_id: String,
        boss: BossStats,
        questions: Vec<RawQuestion>,
        end_time: i64,
        now_ms: i64,
    ) -> Vec<Command> {
        if self.encounter.is_some() || self.exited {
            warn!("[{}] Duplicate raid_start {} ignored", self.player_id, raid_id);
            return Vec::new();
        }

        let boss = Boss::from_stats(boss);
        let questions = QuestionDeck::from_raw(questions);
        info!(
            "[{}] Raid {} against {} ({}/{} hp, {} questions)",
            self.player_id,
            raid_id,
            boss.name,
            boss.current_hp,
            boss.max_hp,
            questions.len()
        );

        let remaining_secs = Countdown::new(end_time).remaining_secs(now_ms);
        self.clock = Some(RaidClockDisplay::new(
            remaining_secs,
            self.battle.urgency_threshold_secs,
        ));
        self.encounter = Some(RaidEncounter {
            id: raid_id,
            status: RaidStatus::Active,
            boss,
            leaderboard: Vec::new(),
            questions,
            current_index: 0,
            end_ms: end_time,
        });
        self.phase = RaidPhase::Open;

        let mut commands = vec![Command::StartClock {
            id: ClockId::Raid,
            end_ms: end_time,
        }];
        commands.extend(self.maybe_request_more());
        commands
    }

    fn on_hp_update(
        &mut self,
        current_hp: u32,
        attacker_id: String,
        damage: u32,
        leaderboard: Vec<LeaderboardEntry>,
    ) -> Vec<Command> {
        let Some(encounter) = self.encounter.as_mut() else {
            warn!("[{}] raid_hp_update before raid_start ignored", self.player_id);
            return Vec::new();
        };

        encounter.boss.current_hp = current_hp.min(encounter.boss.max_hp);
        encounter.leaderboard = leaderboard;
        debug!(
            "[{}] Boss hp {}/{} ({} hit for {})",
            self.player_id,
            encounter.boss.current_hp,
            encounter.boss.max_hp,
            attacker_id,
            damage
        );

        vec![Command::effect(
            EffectKind::BossHurt { damage },
            self.effects.boss_hurt_ms,
        )]
    }

    fn on_boss_skill(&mut self, debuff: String, duration_ms: u64, now_ms: i64) -> Vec<Command> {
        if self.status() != RaidStatus::Active {
            return Vec::new();
        }

        self.debuff_generation += 1;
        let generation = self.debuff_generation;
        info!(
            "[{}] Boss cast {} for {}ms",
            self.player_id, debuff, duration_ms
        );
        self.active_debuff = Some(ActiveDebuff {
            tag: debuff.clone(),
            generation,
            expires_at_ms: now_ms.saturating_add(duration_ms as i64),
        });

        vec![
            Command::effect(EffectKind::DebuffBanner { debuff }, duration_ms),
            Command::Sound(SoundCue::BossSkill),
            Command::Schedule {
                timer: TimerKind::DebuffExpired { generation },
                after: std::time::Duration::from_millis(duration_ms),
            },
        ]
    }

    fn on_more_questions(&mut self, questions: Vec<RawQuestion>) -> Vec<Command> {
        self.fetching_more = false;
        let Some(encounter) = self.encounter.as_mut() else {
            return Vec::new();
        };

        let added = encounter.questions.append(questions);
        debug!(
            "[{}] Appended {} questions (total {})",
            self.player_id,
            added,
            encounter.questions.len()
        );
        if added == 0 {
            return Vec::new();
        }
        self.maybe_request_more().into_iter().collect()
    }

    fn on_victory(&mut self, mvp: String, rewards: RewardBreakdown) -> Vec<Command> {
        let Some(encounter) = self.encounter.as_mut() else {
            warn!("[{}] raid_victory before raid_start ignored", self.player_id);
            return Vec::new();
        };

        encounter.status = RaidStatus::Victory;
        info!(
            "[{}] Raid {} cleared, mvp {}",
            self.player_id, encounter.id, mvp
        );
        let raid_id = encounter.id.clone();
        self.finish(raid_id, BattleOutcome::Victory, Some(mvp), rewards)
    }

    fn defeat(&mut self) -> Vec<Command> {
        let Some(encounter) = self.encounter.as_mut() else {
            return Vec::new();
        };
        if encounter.status.is_terminal() {
            return Vec::new();
        }

        encounter.status = RaidStatus::Defeat;
        info!("[{}] Raid {} lost on time", self.player_id, encounter.id);
        self.time_up = true;
        let raid_id = encounter.id.clone();
        self.finish(raid_id, BattleOutcome::Defeat, None, RewardBreakdown::default())
    }

    fn finish(
        &mut self,
        raid_id: String,
        outcome: BattleOutcome,
        mvp: Option<String>,
        rewards: RewardBreakdown,
    ) -> Vec<Command> {
        self.active_debuff = None;
        self.fetching_more = false;

        let record = RewardRecord {
            mode: BattleMode::Raid,
            session_id: raid_id,
            player_id: self.player_id.clone(),
            outcome,
            score: self.damage_dealt,
            damage_dealt: self.damage_dealt,
            elo_delta: 0,
            rewards: rewards.clone(),
        };
        self.result = Some(RaidResult {
            outcome,
            mvp,
            damage_dealt: self.damage_dealt,
            rewards,
        });

        let cue = if outcome == BattleOutcome::Victory {
            SoundCue::Victory
        } else {
            SoundCue::Defeat
        };
        vec![
            Command::StopClock(ClockId::Raid),
            Command::Sound(cue),
            Command::Persist(record),
        ]
    }

    fn advance(&mut self, from_index: usize) -> Vec<Command> {
        let Some(encounter) = self.encounter.as_mut() else {
            return Vec::new();
        };
        if encounter.status != RaidStatus::Active || encounter.current_index != from_index {
            return Vec::new();
        }
        if !matches!(self.phase, RaidPhase::Resolved { .. }) {
            return Vec::new();
        }

        encounter.current_index = (from_index + 1).min(encounter.questions.len());
        self.phase = RaidPhase::Open;
        self.maybe_request_more().into_iter().collect()
    }

    fn on_intent(&mut self, intent: PlayerIntent) -> Vec<Command> {
        match intent {
            PlayerIntent::Answer { option_index } => match self.submit(option_index) {
                Ok((_, commands)) => {
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
                if self.status() != RaidStatus::Active {
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

    fn on_clock(&mut self, event: ClockEvent) -> Vec<Command> {
        if event.id != ClockId::Raid || self.status() != RaidStatus::Active {
            return Vec::new();
        }

        match event.signal {
            ClockSignal::Tick { remaining_secs } => {
                self.clock = Some(RaidClockDisplay::new(
                    remaining_secs,
                    self.battle.urgency_threshold_secs,
                ));
                Vec::new()
            }
            ClockSignal::Expired => {
                self.clock = Some(RaidClockDisplay::new(0, self.battle.urgency_threshold_secs));
                if self.time_up {
                    return Vec::new();
                }
                self.time_up = true;
                info!(
                    "[{}] Raid clock expired, waiting {}ms for the server verdict",
                    self.player_id, self.battle.terminal_grace_ms
                );
                vec![
                    Command::effect(EffectKind::TimeUp, self.effects.time_up_ms),
                    Command::Schedule {
                        timer: TimerKind::TerminalGrace,
                        after: self.battle.terminal_grace(),
                    },
                ]
            }
        }
    }

    fn on_timer(&mut self, timer: TimerKind) -> Vec<Command> {
        match timer {
            TimerKind::InitTimeout => {
                if self.encounter.is_some() || self.exited {
                    return Vec::new();
                }
                warn!(
                    "[{}] No raid_start for session {}, leaving battle",
                    self.player_id, self.session_id
                );
                self.exited = true;
                vec![Command::Exit(ExitReason::MatchCancelled)]
            }
            TimerKind::AdvanceQuestion { from_index } => self.advance(from_index),
            TimerKind::TerminalGrace => {
                if !self.time_up || self.status() != RaidStatus::Active {
                    return Vec::new();
                }
                warn!(
                    "[{}] No raid verdict after clock expiry, falling back to defeat",
                    self.player_id
                );
                self.defeat()
            }
            TimerKind::DebuffExpired { generation } => {
                if self
                    .active_debuff
                    .as_ref()
                    .map_or(false, |d| d.generation == generation)
                {
                    debug!("[{}] Debuff cleared", self.player_id);
                    self.active_debuff = None;
                }
                Vec::new()
            }
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
                if self.encounter.is_none() && !self.exited {
                    warn!("[{}] Disconnected before raid_start", self.player_id);
                    self.exited = true;
                    return vec![Command::Exit(ExitReason::Disconnected)];
                }
                warn!("[{}] Connection lost during raid", self.player_id);
                Vec::new()
            }
        }
    }
}

impl Controller for RaidController {
    type Snapshot = RaidSnapshot;

    fn mode(&self) -> BattleMode {
        BattleMode::Raid
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn start(&mut self) -> Vec<Command> {
        vec![
            Command::Send(ClientMessage::JoinSession {
                session_id: self.session_id.clone(),
                mode: BattleMode::Raid,
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
            Input::Intent(intent) => self.on_intent(intent),
            Input::Clock(event) => self.on_clock(event),
            Input::Timer(timer) => self.on_timer(timer),
            Input::Connection(state) => self.on_connection(state),
        }
    }

    fn snapshot(&self) -> RaidSnapshot {
        let encounter = self.encounter.as_ref();
        RaidSnapshot {
            session_id: self.session_id.clone(),
            status: self.status(),
            raid_id: encounter.map(|e| e.id.clone()),
            boss: encounter.map(|e| e.boss.clone()),
            leaderboard: encounter.map_or_else(Vec::new, |e| e.leaderboard.clone()),
            question_index: encounter.map_or(0, |e| e.current_index),
            question_count: encounter.map_or(0, |e| e.questions.len()),
            question: encounter
                .filter(|e| e.status == RaidStatus::Active)
                .and_then(|e| e.questions.get(e.current_index).cloned()),
            phase: self.phase,
            streak: self.combo.streak(),
            multiplier: self.combo.multiplier(),
            damage_dealt: self.damage_dealt,
            active_debuff: self.active_debuff.clone(),
            clock: self.clock.clone(),
            fetching_more: self.fetching_more,
            time_up: self.time_up,
            connected: self.connected,
            result: self.result.clone(),
            last_rejection: self.last_rejection,
        }
    }

    fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn questions(range: std::ops::Range<usize>) -> Vec<RawQuestion> {
        range
            .map(|i| RawQuestion {
                id: format!("r{}", i),
                prompt: format!("{} x 2", i),
                options: json!([format!("{}", i * 2), "-1", "-2", "-3"]),
                correct_answer: Some(json!("a")),
            })
            .collect()
    }

    fn controller() -> RaidController {
        RaidController::new(
            "raid-session",
            "me",
            BattleSettings::default(),
            EffectSettings::default(),
        )
    }

    fn start_raid(c: &mut RaidController, count: usize) -> Vec<Command> {
        c.handle(
            Input::Server(ServerMessage::RaidStart {
                raid_id: "raid-1".to_string(),
                boss: BossStats {
                    name: "Divisor".to_string(),
                    max_hp: 1000,
                    current_hp: None,
                },
                questions: questions(0..count),
                end_time: NOW + 300_000,
            }),
            NOW,
        )
    }

    /// 답을 내고 다음 문제로 넘긴다. 보낸 데미지가 있으면 돌려준다.
    fn answer(c: &mut RaidController, option_index: usize) -> Option<u32> {
        let index = c.encounter().unwrap().current_index;
        let (_, commands) = c.submit(option_index).unwrap();
        c.handle(
            Input::Timer(TimerKind::AdvanceQuestion { from_index: index }),
            NOW,
        );
        commands.into_iter().find_map(|cmd| match cmd {
            Command::Send(ClientMessage::SubmitDamage { amount }) => Some(amount),
            _ => None,
        })
    }

    fn server(c: &mut RaidController, msg: ServerMessage) -> Vec<Command> {
        c.handle(Input::Server(msg), NOW)
    }

    #[test]
    fn raid_start_activates_and_starts_clock() {
        let mut c = controller();
        let commands = start_raid(&mut c, 10);
        assert_eq!(c.status(), RaidStatus::Active);
        assert_eq!(
            commands,
            vec![Command::StartClock {
                id: ClockId::Raid,
                end_ms: NOW + 300_000
            }]
        );
        let snapshot = c.snapshot();
        assert_eq!(snapshot.boss.unwrap().current_hp, 1000);
        assert_eq!(snapshot.clock.unwrap().text, "05:00");
    }

    #[test]
    fn scenario_streak_tiers_drive_damage() {
        let mut c = controller();
        start_raid(&mut c, 20);

        let damages: Vec<Option<u32>> = (0..6).map(|_| answer(&mut c, 0)).collect();
        assert_eq!(
            damages,
            vec![Some(50), Some(60), Some(60), Some(60), Some(75), Some(75)]
        );
        assert_eq!(c.streak(), 6);

        assert_eq!(answer(&mut c, 1), None);
        assert_eq!(c.streak(), 0);

        assert_eq!(answer(&mut c, 0), Some(50));
        assert_eq!(c.damage_dealt(), 50 + 60 * 3 + 75 * 2 + 50);
    }

    #[test]
    fn hp_update_overrides_optimistic_hit() {
        let mut c = controller();
        start_raid(&mut c, 10);
        let (verdict, commands) = c.submit(0).unwrap();
        assert_eq!(verdict, Verdict::Correct);
        assert!(commands
            .iter()
            .any(|cmd| matches!(cmd, Command::Effect { kind: EffectKind::Projectile, .. })));
        // 로컬 판정은 HP 를 건드리지 않는다
        assert_eq!(c.encounter().unwrap().boss.current_hp, 1000);

        let commands = server(
            &mut c,
            ServerMessage::RaidHpUpdate {
                current_hp: 930,
                attacker_id: "someone-else".to_string(),
                damage: 70,
                leaderboard: vec![LeaderboardEntry {
                    participant: "someone-else".to_string(),
                    total_damage: 70,
                }],
            },
        );
        assert_eq!(c.encounter().unwrap().boss.current_hp, 930);
        assert_eq!(c.encounter().unwrap().leaderboard.len(), 1);
        assert!(matches!(
            commands[0],
            Command::Effect {
                kind: EffectKind::BossHurt { damage: 70 },
                ..
            }
        ));

        server(
            &mut c,
            ServerMessage::RaidHpUpdate {
                current_hp: 5_000,
                attacker_id: "me".to_string(),
                damage: 0,
                leaderboard: Vec::new(),
            },
        );
        assert_eq!(c.encounter().unwrap().boss.current_hp, 1000);
        assert!(c.encounter().unwrap().leaderboard.is_empty());
    }

    #[test]
    fn silence_rejects_without_counting_a_miss() {
        let mut c = controller();
        start_raid(&mut c, 10);
        answer(&mut c, 0);
        answer(&mut c, 0);
        assert_eq!(c.streak(), 2);

        let commands = server(
            &mut c,
            ServerMessage::RaidBossSkill {
                debuff: "silence".to_string(),
                duration_ms: 3_000,
            },
        );
        assert!(commands.contains(&Command::Schedule {
            timer: TimerKind::DebuffExpired { generation: 1 },
            after: std::time::Duration::from_millis(3_000),
        }));

        assert_eq!(c.submit(1).unwrap_err(), SubmitRejection::Silenced);
        c.handle(Input::Intent(PlayerIntent::Answer { option_index: 0 }), NOW);
        assert_eq!(c.snapshot().last_rejection, Some(SubmitRejection::Silenced));
        assert_eq!(c.streak(), 2);

        c.handle(Input::Timer(TimerKind::DebuffExpired { generation: 1 }), NOW + 3_000);
        assert!(c.active_debuff().is_none());
        assert_eq!(answer(&mut c, 0), Some(60));
    }

    #[test]
    fn only_latest_debuff_timer_clears() {
        let mut c = controller();
        start_raid(&mut c, 10);
        for tag in ["silence", "blur"] {
            server(
                &mut c,
                ServerMessage::RaidBossSkill {
                    debuff: tag.to_string(),
                    duration_ms: 1_000,
                },
            );
        }
        c.handle(Input::Timer(TimerKind::DebuffExpired { generation: 1 }), NOW);
        assert_eq!(c.active_debuff().map(|d| d.tag.as_str()), Some("blur"));
        // blur 는 입력을 막지 않는다
        assert!(c.submit(0).is_ok());

        c.handle(Input::Timer(TimerKind::DebuffExpired { generation: 2 }), NOW);
        assert!(c.active_debuff().is_none());
    }

    #[test]
    fn low_water_mark_requests_once() {
        let mut c = controller();
        let commands = start_raid(&mut c, 6);
        assert_eq!(commands.len(), 1);

        answer(&mut c, 0);
        assert!(!c.snapshot().fetching_more);

        let index = c.encounter().unwrap().current_index;
        let (_, _) = c.submit(0).unwrap();
        let commands = c.handle(
            Input::Timer(TimerKind::AdvanceQuestion { from_index: index }),
            NOW,
        );
        assert_eq!(
            commands,
            vec![Command::Send(ClientMessage::FetchMoreQuestions {
                seen_ids: (0..6).map(|i| format!("r{}", i)).collect(),
            })]
        );

        let index = c.encounter().unwrap().current_index;
        c.submit(0).unwrap();
        let commands = c.handle(
            Input::Timer(TimerKind::AdvanceQuestion { from_index: index }),
            NOW,
        );
        assert!(commands.is_empty());

        let commands = server(
            &mut c,
            ServerMessage::RaidMoreQuestions {
                questions: questions(4..12),
            },
        );
        assert!(commands.is_empty());
        assert_eq!(c.encounter().unwrap().questions.len(), 12);
        assert!(!c.snapshot().fetching_more);
    }

    fn expire_clock(c: &mut RaidController) -> Vec<Command> {
        c.handle(
            Input::Clock(ClockEvent {
                id: ClockId::Raid,
                signal: ClockSignal::Expired,
            }),
            NOW + 300_000,
        )
    }

    fn persisted(commands: &[Command]) -> Vec<BattleOutcome> {
        commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::Persist(record) => Some(record.outcome),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn clock_expiry_freezes_input_and_waits_for_verdict() {
        let mut c = controller();
        start_raid(&mut c, 10);
        answer(&mut c, 0);

        let commands = expire_clock(&mut c);
        assert_eq!(c.status(), RaidStatus::Active);
        assert!(persisted(&commands).is_empty());
        assert!(matches!(
            commands[0],
            Command::Effect {
                kind: EffectKind::TimeUp,
                ..
            }
        ));
        assert!(commands.contains(&Command::Schedule {
            timer: TimerKind::TerminalGrace,
            after: BattleSettings::default().terminal_grace(),
        }));

        let snapshot = c.snapshot();
        assert!(snapshot.time_up);
        assert_eq!(snapshot.clock.unwrap().text, "00:00");
        assert_eq!(c.submit(0).unwrap_err(), SubmitRejection::TimeUp);
        assert_eq!(c.streak(), 1);

        // 두 번째 Expired 는 유예 타이머를 다시 걸지 않는다
        assert!(expire_clock(&mut c).is_empty());
    }

    #[test]
    fn victory_after_clock_expiry_still_wins() {
        let mut c = controller();
        start_raid(&mut c, 10);
        answer(&mut c, 0);
        expire_clock(&mut c);

        let commands = c.handle(
            Input::Server(ServerMessage::RaidVictory {
                mvp: "me".to_string(),
                rewards: RewardBreakdown {
                    xp: 80,
                    gems: 5,
                    lives: 0,
                },
            }),
            NOW + 300_050,
        );
        assert_eq!(c.status(), RaidStatus::Victory);
        assert_eq!(persisted(&commands), vec![BattleOutcome::Victory]);

        // 늦게 온 유예 타이머는 결과를 바꾸지 않는다
        let commands = c.handle(Input::Timer(TimerKind::TerminalGrace), NOW + 305_000);
        assert!(commands.is_empty());
        assert_eq!(c.status(), RaidStatus::Victory);
    }

    #[test]
    fn server_timeout_during_grace_is_defeat() {
        let mut c = controller();
        start_raid(&mut c, 10);
        expire_clock(&mut c);

        let commands = server(&mut c, ServerMessage::RaidTimeout);
        assert_eq!(c.status(), RaidStatus::Defeat);
        assert_eq!(persisted(&commands), vec![BattleOutcome::Defeat]);
        assert!(c.handle(Input::Timer(TimerKind::TerminalGrace), NOW).is_empty());
    }

    #[test]
    fn grace_expiry_without_verdict_falls_back_to_defeat() {
        let mut c = controller();
        start_raid(&mut c, 10);
        answer(&mut c, 0);
        expire_clock(&mut c);

        let commands = c.handle(Input::Timer(TimerKind::TerminalGrace), NOW + 305_000);
        assert_eq!(c.status(), RaidStatus::Defeat);
        assert!(commands.iter().any(|cmd| matches!(
            cmd,
            Command::Persist(r) if r.outcome == BattleOutcome::Defeat && r.damage_dealt == 50
        )));

        assert!(server(
            &mut c,
            ServerMessage::RaidVictory {
                mvp: "me".to_string(),
                rewards: RewardBreakdown::default(),
            }
        )
        .is_empty());
        assert_eq!(c.status(), RaidStatus::Defeat);
        assert_eq!(c.submit(0).unwrap_err(), SubmitRejection::Finished);
    }

    #[test]
    fn stray_grace_timer_before_expiry_is_ignored() {
        let mut c = controller();
        start_raid(&mut c, 10);
        assert!(c.handle(Input::Timer(TimerKind::TerminalGrace), NOW).is_empty());
        assert_eq!(c.status(), RaidStatus::Active);
    }

    #[test]
    fn clock_at_mount_never_reads_below_first_tick() {
        let mut c = controller();
        c.handle(
            Input::Server(ServerMessage::RaidStart {
                raid_id: "raid-2".to_string(),
                boss: BossStats {
                    name: "Divisor".to_string(),
                    max_hp: 1000,
                    current_hp: None,
                },
                questions: questions(0..10),
                end_time: NOW + 1_500,
            }),
            NOW,
        );
        let mounted = c.snapshot().clock.unwrap();
        assert_eq!(mounted.remaining_secs, 2);

        let mut countdown = Countdown::new(NOW + 1_500);
        let first_tick = match countdown.poll(NOW) {
            crate::clock::ClockReading::Tick { remaining_secs } => remaining_secs,
            other => panic!("unexpected reading {:?}", other),
        };
        assert!(first_tick <= mounted.remaining_secs);
    }

    #[test]
    fn victory_is_terminal() {
        let mut c = controller();
        start_raid(&mut c, 10);
        let commands = server(
            &mut c,
            ServerMessage::RaidVictory {
                mvp: "me".to_string(),
                rewards: RewardBreakdown {
                    xp: 120,
                    gems: 10,
                    lives: 1,
                },
            },
        );
        assert!(c.is_terminal());
        assert!(commands.contains(&Command::StopClock(ClockId::Raid)));
        assert_eq!(c.result().and_then(|r| r.mvp.as_deref()), Some("me"));

        let commands = c.handle(
            Input::Clock(ClockEvent {
                id: ClockId::Raid,
                signal: ClockSignal::Expired,
            }),
            NOW,
        );
        assert!(commands.is_empty());
        assert_eq!(c.status(), RaidStatus::Victory);
    }

    #[test]
    fn urgency_flag_follows_clock_ticks() {
        let mut c = controller();
        start_raid(&mut c, 10);
        c.handle(
            Input::Clock(ClockEvent {
                id: ClockId::Raid,
                signal: ClockSignal::Tick { remaining_secs: 59 },
            }),
            NOW,
        );
        let clock = c.snapshot().clock.unwrap();
        assert_eq!(clock.text, "00:59");
        assert!(clock.urgent);
    }
}
