//! 수학 배틀 클라이언트의 실시간 전투 엔진.
//!
//! PvP 대결과 Raid 보스전의 상태 머신, 시계, 판정, 콤보 계산, 이펙트 레이어,
//! 그리고 이들을 한 루프에서 돌리는 런타임을 담고 있다.

use std::io;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use env::Settings;

pub mod answer;
pub mod battle;
pub mod clock;
pub mod combo;
pub mod effects;
pub mod env;
pub mod exception;
pub mod gateway;
pub mod notify;
pub mod protocol;
pub mod runtime;
pub mod transport;

/// 전역 subscriber 설정. 반환값이 살아 있는 동안 파일 로그가 flush 된다.
pub struct LoggerManager {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

impl LoggerManager {
    pub fn setup(settings: &Settings) -> Self {
        let file_appender = RollingFileAppender::new(
            Rotation::DAILY,
            &settings.logging.directory,
            &settings.logging.filename,
        );
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.server.log_level));

        // stdout 은 플레이어 입력 프롬프트가 쓰므로 콘솔 로그는 stderr 로 보낸다.
        let console_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(true)
            .with_target(false)
            .compact();

        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        tracing::info!(
            "Logger ready: {}/{}",
            settings.logging.directory,
            settings.logging.filename
        );

        Self { _guard: guard }
    }
}

/// 결과를 그대로 흘려보내면서 성공/실패 쪽에만 로그를 남긴다.
pub trait LogExt<T, E> {
    fn log_ok(self, f: impl FnOnce(&T)) -> Self;
    fn log_err(self, f: impl FnOnce(&E)) -> Self;
}

impl<T, E> LogExt<T, E> for Result<T, E> {
    fn log_ok(self, f: impl FnOnce(&T)) -> Self {
        if let Ok(ref value) = self {
            f(value);
        }
        self
    }

    fn log_err(self, f: impl FnOnce(&E)) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }
}
