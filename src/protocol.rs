use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// --- 공용 페이로드 ---

/// 서버가 내려주는 가공 전 문제.
///
/// `options` 와 `correct_answer` 는 모양이 일정하지 않아서 JSON 값 그대로 받고,
/// `battle::question::Question::from_raw` 에서 정규화한다.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RawQuestion {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub options: JsonValue,
    #[serde(default, alias = "correct_answer_key")]
    pub correct_answer: Option<JsonValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Opponent {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BossStats {
    pub name: String,
    pub max_hp: u32,
    /// 중간 합류 시 이미 깎인 HP. 없으면 max_hp 로 시작한다.
    #[serde(default)]
    pub current_hp: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub participant: String,
    pub total_damage: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RewardBreakdown {
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub gems: u32,
    #[serde(default)]
    pub lives: i32,
}

// --- Server to Client Messages ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// PvP session-init. 문제 목록은 이 시점에 고정된다.
    #[serde(rename = "match_start")]
    MatchStart {
        match_id: String,
        questions: Vec<RawQuestion>,
        opponent: Opponent,
        start_time: i64, // epoch ms
        end_time: i64,   // epoch ms
    },

    /// 내가 제출한 답의 판정 결과.
    #[serde(rename = "answer_result")]
    AnswerResult {
        question_id: String,
        correct: bool,
        points: u32,
    },

    /// 상대가 정답을 맞혀 점수가 바뀌었음을 알립니다.
    #[serde(rename = "opponent_score")]
    OpponentScore { score: u32 },

    /// 매치 종료. 최종 점수와 보상이 포함된 authoritative 이벤트.
    #[serde(rename = "match_finished")]
    MatchFinished {
        my_score: u32,
        opponent_score: u32,
        #[serde(default)]
        winner_id: Option<String>,
        #[serde(default)]
        elo_delta: i32,
        #[serde(default)]
        rewards: RewardBreakdown,
    },

    #[serde(rename = "opponent_emote")]
    OpponentEmote { emote: String },

    /// Raid session-init.
    #[serde(rename = "raid_start")]
    RaidStart {
        raid_id: String,
        boss: BossStats,
        questions: Vec<RawQuestion>,
        end_time: i64, // epoch ms
    },

    /// 보스 HP 브로드캐스트. current_hp 의 유일한 writer.
    #[serde(rename = "raid_hp_update")]
    RaidHpUpdate {
        current_hp: u32,
        attacker_id: String,
        damage: u32,
        #[serde(default)]
        leaderboard: Vec<LeaderboardEntry>,
    },

    #[serde(rename = "raid_boss_skill")]
    RaidBossSkill { debuff: String, duration_ms: u64 },

    #[serde(rename = "raid_more_questions")]
    RaidMoreQuestions { questions: Vec<RawQuestion> },

    #[serde(rename = "raid_victory")]
    RaidVictory {
        mvp: String,
        #[serde(default)]
        rewards: RewardBreakdown,
    },

    #[serde(rename = "raid_timeout")]
    RaidTimeout,

    /// 에러가 발생했음을 알립니다.
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::MatchStart { .. } => "match_start",
            ServerMessage::AnswerResult { .. } => "answer_result",
            ServerMessage::OpponentScore { .. } => "opponent_score",
            ServerMessage::MatchFinished { .. } => "match_finished",
            ServerMessage::OpponentEmote { .. } => "opponent_emote",
            ServerMessage::RaidStart { .. } => "raid_start",
            ServerMessage::RaidHpUpdate { .. } => "raid_hp_update",
            ServerMessage::RaidBossSkill { .. } => "raid_boss_skill",
            ServerMessage::RaidMoreQuestions { .. } => "raid_more_questions",
            ServerMessage::RaidVictory { .. } => "raid_victory",
            ServerMessage::RaidTimeout => "raid_timeout",
            ServerMessage::Error { .. } => "error",
        }
    }
}

// --- Client to Server Messages ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join_session")]
    JoinSession { session_id: String, mode: BattleMode },

    #[serde(rename = "leave_session")]
    LeaveSession { session_id: String },

    /// PvP 답안 제출. elapsed_ms 는 문제가 표시된 시점부터 클라이언트가 잰 시간.
    #[serde(rename = "submit_answer")]
    SubmitAnswer {
        question_id: String,
        answer: String,
        elapsed_ms: u64,
    },

    /// Raid 데미지 보고 (fire-and-forget).
    #[serde(rename = "submit_damage")]
    SubmitDamage { amount: u32 },

    #[serde(rename = "fetch_more_questions")]
    FetchMoreQuestions { seen_ids: Vec<String> },

    #[serde(rename = "send_emote")]
    SendEmote { emote: String },

    // 매치 전 초대 흐름. 전투 루프에서는 쓰지 않는다.
    #[serde(rename = "challenge")]
    Challenge { opponent_id: String },

    #[serde(rename = "challenge_response")]
    ChallengeResponse { challenge_id: String, accepted: bool },
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BattleMode {
    Pvp,
    Raid,
}

impl BattleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BattleMode::Pvp => "pvp",
            BattleMode::Raid => "raid",
        }
    }
}
