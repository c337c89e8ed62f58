//! 장식용 이펙트 레이어.
//!
//! 이펙트는 추가되고 수명이 지나면 걸러질 뿐, 제자리에서 수정되지 않는다.
//! 컨트롤러는 이 레이어를 읽지 않는다. 이펙트가 사라지거나 중복되어도 HP, 점수, 콤보는 그대로다.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::clock::TimeSource;

pub mod audio;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize)]
pub struct EffectId(Uuid);

impl EffectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EffectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EffectId> for Uuid {
    fn from(effect_id: EffectId) -> Self {
        effect_id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectKind {
    /// 떠오르는 숫자/텍스트 (+120, -75, MISS ...)
    FloatingText { text: String },
    /// 내 공격 투사체
    Projectile,
    /// 보스 피격 플래시. HP 브로드캐스트에서만 생긴다.
    BossHurt { damage: u32 },
    DebuffBanner { debuff: String },
    Emote { emote: String, mine: bool },
    TimeUp,
    Streak { streak: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Effect {
    pub id: EffectId,
    pub kind: EffectKind,
    pub spawned_at_ms: i64,
    pub lifetime_ms: u64,
}

impl Effect {
    pub fn expires_at_ms(&self) -> i64 {
        self.spawned_at_ms + self.lifetime_ms as i64
    }
}

/// 현재 살아 있는 이펙트 목록.
#[derive(Debug, Clone, Default)]
pub struct EffectLayer {
    entries: Vec<Effect>,
}

impl EffectLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) {
        self.entries.push(effect);
    }

    /// id 로 걸러낸다. 이미 없으면 false.
    pub fn remove(&mut self, id: EffectId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|effect| effect.id != id);
        before != self.entries.len()
    }

    /// 수명이 지난 이펙트를 모두 걸러내고 제거된 개수를 돌려준다.
    pub fn prune(&mut self, now_ms: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|effect| effect.expires_at_ms() > now_ms);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Effect] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 이펙트를 띄우고 수명이 끝나면 지연 제거한다.
pub struct EffectScheduler {
    layer: Arc<Mutex<EffectLayer>>,
    tx: Arc<watch::Sender<Vec<Effect>>>,
    time: Arc<dyn TimeSource>,
    cancel: CancellationToken,
}

impl EffectScheduler {
    pub fn new(time: Arc<dyn TimeSource>, parent: &CancellationToken) -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            layer: Arc::new(Mutex::new(EffectLayer::new())),
            tx: Arc::new(tx),
            time,
            cancel: parent.child_token(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Effect>> {
        self.tx.subscribe()
    }

    pub fn active(&self) -> Vec<Effect> {
        self.layer.lock().entries().to_vec()
    }

    pub fn spawn(&self, kind: EffectKind, lifetime: Duration) -> EffectId {
        let effect = Effect {
            id: EffectId::new(),
            kind,
            spawned_at_ms: self.time.now_ms(),
            lifetime_ms: lifetime.as_millis() as u64,
        };
        let id = effect.id;

        {
            let mut layer = self.layer.lock();
            // 제거 태스크보다 먼저 수명이 끝난 항목은 여기서 같이 걸러낸다.
            let stale = layer.prune(effect.spawned_at_ms);
            if stale > 0 {
                debug!("Pruned {} expired effects", stale);
            }
            layer.push(effect);
            self.tx.send_replace(layer.entries().to_vec());
        }

        let layer = self.layer.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(lifetime) => {
                    let mut layer = layer.lock();
                    if layer.remove(id) {
                        tx.send_replace(layer.entries().to_vec());
                    }
                }
            }
        });

        id
    }

    /// 대기 중인 제거 태스크를 모두 취소하고 레이어를 비운다.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let mut layer = self.layer.lock();
        let dropped = layer.len();
        layer.clear();
        self.tx.send_replace(Vec::new());
        debug!("Effect scheduler shut down ({} effects dropped)", dropped);
    }
}
