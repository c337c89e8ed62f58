use serde::Serialize;

/// 콤보 단계별 배율 (퍼센트). 부동소수 오차 없이 floor 하기 위해 정수로 둔다.
const TIER_BASE_PCT: u32 = 100;
const TIER_BOOSTED_PCT: u32 = 120;
const TIER_MAX_PCT: u32 = 150;

const BOOSTED_STREAK: u32 = 2;
const MAX_STREAK: u32 = 5;

fn tier_pct(streak: u32) -> u32 {
    if streak >= MAX_STREAK {
        TIER_MAX_PCT
    } else if streak >= BOOSTED_STREAK {
        TIER_BOOSTED_PCT
    } else {
        TIER_BASE_PCT
    }
}

/// 연속 정답 수에 따른 배율. 0–1: ×1.0, 2–4: ×1.2, 5 이상: ×1.5
pub fn tier(streak: u32) -> f64 {
    tier_pct(streak) as f64 / 100.0
}

/// `floor(base_damage * tier(streak))`
pub fn damage(base_damage: u32, streak: u32) -> u32 {
    let scaled = base_damage as u64 * tier_pct(streak) as u64 / 100;
    scaled.min(u32::MAX as u64) as u32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComboState {
    streak: u32,
}

impl ComboState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn multiplier(&self) -> f64 {
        tier(self.streak)
    }

    /// 정답 하나를 기록하고 새 streak 을 돌려준다.
    pub fn record_hit(&mut self) -> u32 {
        self.streak = self.streak.saturating_add(1);
        self.streak
    }

    /// 정답 처리. streak 을 먼저 올리고, 올라간 streak 기준으로 데미지를 계산한다.
    pub fn hit(&mut self, base_damage: u32) -> u32 {
        let streak = self.record_hit();
        damage(base_damage, streak)
    }

    pub fn miss(&mut self) {
        self.streak = 0;
    }
}
