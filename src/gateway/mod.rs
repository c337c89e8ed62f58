//! REST 게이트웨이 경계. 전투가 끝날 때 한 번만 호출된다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    exception::BattleError,
    protocol::{BattleMode, RewardBreakdown},
};

pub mod http;

pub use http::HttpRewardsGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleOutcome {
    Won,
    Lost,
    Draw,
    Victory,
    Defeat,
}

/// 종료 시 저장할 보상 기록.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub mode: BattleMode,
    pub session_id: String,
    pub player_id: String,
    pub outcome: BattleOutcome,
    pub score: u32,
    pub damage_dealt: u32,
    pub elo_delta: i32,
    pub rewards: RewardBreakdown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardReceipt {
    #[serde(default)]
    pub total_xp: u64,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub leveled_up: bool,
}

#[async_trait]
pub trait RewardsGateway: Send + Sync {
    async fn complete_session(&self, record: &RewardRecord) -> Result<RewardReceipt, BattleError>;
}
