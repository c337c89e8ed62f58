#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use math_battle::{
    clock::AnchoredClock,
    effects::audio::NullAudio,
    exception::BattleError,
    gateway::{RewardReceipt, RewardRecord, RewardsGateway},
    notify::{EventBus, Notice},
    protocol::{ClientMessage, RawQuestion},
    runtime::BattleDeps,
    transport::{ChannelTransport, ServerEnd},
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;

pub const NOW: i64 = 1_700_000_000_000;

/// 저장 요청을 기록만 하는 게이트웨이
#[derive(Default)]
pub struct RecordingGateway {
    pub records: Mutex<Vec<RewardRecord>>,
    pub fail: bool,
}

impl RecordingGateway {
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn records(&self) -> Vec<RewardRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl RewardsGateway for RecordingGateway {
    async fn complete_session(&self, record: &RewardRecord) -> Result<RewardReceipt, BattleError> {
        self.records.lock().push(record.clone());
        if self.fail {
            return Err(BattleError::GatewayStatus {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(RewardReceipt {
            total_xp: 1_000,
            level: Some(4),
            leveled_up: true,
        })
    }
}

pub fn deps(
    transport: ChannelTransport,
    gateway: Arc<RecordingGateway>,
    notices: Arc<EventBus<Notice>>,
) -> BattleDeps<ChannelTransport, RecordingGateway> {
    BattleDeps {
        transport: Arc::new(transport),
        gateway,
        notices,
        time: Arc::new(AnchoredClock::starting_at(NOW)),
        audio: Arc::new(NullAudio),
    }
}

/// 보기 0 번이 정답인 문제들. 정답 키는 글자 인덱스("a")로 온다.
pub fn questions(prefix: &str, count: usize) -> Vec<RawQuestion> {
    (0..count)
        .map(|i| RawQuestion {
            id: format!("{}{}", prefix, i),
            prompt: format!("<b>{} + {}</b>", i, i + 1),
            options: json!([format!("{}", 2 * i + 1), "0", "-1", "100"]),
            correct_answer: Some(json!("a")),
        })
        .collect()
}

/// 클라이언트가 다음으로 보낸 메시지
pub async fn next_sent(server: &mut ServerEnd) -> ClientMessage {
    tokio::time::timeout(Duration::from_secs(30), server.outbound.recv())
        .await
        .expect("client sent nothing")
        .expect("client side dropped")
}

/// 스냅샷이 조건을 만족할 때까지 기다린다. 시간이 멈춘 테스트에서는 시계가 알아서 흘러간다.
pub async fn wait_until<S: Clone>(rx: &mut watch::Receiver<S>, mut pred: impl FnMut(&S) -> bool) -> S {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            {
                let current = rx.borrow_and_update();
                if pred(&current) {
                    return current.clone();
                }
            }
            if rx.changed().await.is_err() {
                let last = rx.borrow().clone();
                assert!(pred(&last), "runner stopped before condition was met");
                return last;
            }
        }
    })
    .await
    .expect("condition not reached in time")
}
