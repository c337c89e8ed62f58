use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub battle: BattleSettings,
    #[serde(default)]
    pub effects: EffectSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        tracing::debug!("Loading configuration for RUN_MODE: {}", &run_mode);

        let s = Config::builder()
            // Load environment-specific file (e.g., development.toml, production.toml)
            .add_source(
                File::with_name(&format!("config/{}", run_mode))
                    .format(FileFormat::Toml)
                    .required(false),
            )
            // Add environment variables (e.g., APP__BATTLE__BASE_DAMAGE=60)
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    pub directory: String,
    pub filename: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            filename: "battle.log".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    /// 세션당 하나 열리는 실시간 이벤트 채널 주소
    pub ws_url: String,
    /// 보상 저장용 REST 게이트웨이 주소
    pub api_base_url: String,
    pub log_level: String,
    pub auth_token: Option<String>,
    pub connect_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8080/battle/ws".to_string(),
            api_base_url: "http://127.0.0.1:8080/api".to_string(),
            log_level: "info".to_string(),
            auth_token: None,
            connect_timeout_ms: 5_000,
        }
    }
}

impl ServerSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// 전투 규칙 관련 수치.
///
/// 모든 필드에 기본값이 있어서 설정 파일이 없어도 동작한다.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BattleSettings {
    /// Raid 정답 1회당 기본 데미지 (콤보 배율 적용 전)
    pub base_damage: u32,
    /// 정답/오답 결과를 보여준 뒤 다음 문제로 넘어가기까지의 지연
    pub result_display_delay_ms: u64,
    /// session-init 을 기다리는 최대 시간. 넘기면 전투 화면에서 나간다.
    pub session_init_timeout_ms: u64,
    /// 남은 문제가 이 값보다 적어지면 Raid 가 추가 문제를 요청한다.
    pub question_low_water_mark: usize,
    /// Raid 시계가 이 값(초) 미만이면 urgent 표시
    pub urgency_threshold_secs: u64,
    /// Raid 시계가 끝난 뒤 서버의 victory/timeout 을 기다리는 시간. 넘기면 로컬 패배.
    pub terminal_grace_ms: u64,
    pub clock_tick_ms: u64,
}

impl Default for BattleSettings {
    fn default() -> Self {
        Self {
            base_damage: 50,
            result_display_delay_ms: 1_500,
            session_init_timeout_ms: 15_000,
            question_low_water_mark: 5,
            urgency_threshold_secs: 60,
            terminal_grace_ms: 5_000,
            clock_tick_ms: 1_000,
        }
    }
}

impl BattleSettings {
    pub fn result_display_delay(&self) -> Duration {
        Duration::from_millis(self.result_display_delay_ms)
    }

    pub fn session_init_timeout(&self) -> Duration {
        Duration::from_millis(self.session_init_timeout_ms)
    }

    pub fn terminal_grace(&self) -> Duration {
        Duration::from_millis(self.terminal_grace_ms)
    }

    pub fn clock_tick(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms.max(1))
    }
}

/// 이펙트 종류별 수명 (ms)
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EffectSettings {
    pub floating_text_ms: u64,
    pub projectile_ms: u64,
    pub boss_hurt_ms: u64,
    pub emote_ms: u64,
    pub time_up_ms: u64,
    pub streak_ms: u64,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            floating_text_ms: 1_200,
            projectile_ms: 600,
            boss_hurt_ms: 400,
            emote_ms: 3_000,
            time_up_ms: 2_500,
            streak_ms: 1_500,
        }
    }
}
