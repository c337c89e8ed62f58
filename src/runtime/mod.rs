//! 전투 화면 하나당 하나씩 도는 이벤트 루프.
//!
//! 서버 이벤트, 플레이어 입력, 시계, 타이머를 한 곳에서 순서대로 컨트롤러에 넘기고,
//! 컨트롤러가 돌려준 `Command` 를 실행한다. 컨트롤러 상태를 만지는 태스크는 이 루프 하나뿐이다.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    battle::{Command, ConnectionState, Controller, ExitReason, Input, PlayerIntent, TimerKind},
    clock::{ClockEvent, ClockHandle, ClockId, ClockService, TimeSource},
    effects::{
        audio::{play_cue, AudioSink},
        Effect, EffectScheduler,
    },
    env::BattleSettings,
    exception::BattleError,
    gateway::{RewardRecord, RewardsGateway},
    notify::{EventBus, Notice},
    protocol::ClientMessage,
    transport::{Transport, TransportEvent},
    LogExt,
};

pub mod timers;

use timers::TimerService;

/// 런타임이 주입받는 의존성
pub struct BattleDeps<T, G> {
    pub transport: Arc<T>,
    pub gateway: Arc<G>,
    pub notices: Arc<EventBus<Notice>>,
    pub time: Arc<dyn TimeSource>,
    pub audio: Arc<dyn AudioSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleExit {
    /// Finished / Victory / Defeat 에 도달
    Completed,
    /// 세션이 시작되지 못해 화면을 떠난다
    Redirected(ExitReason),
    /// 플레이어가 나갔다
    Abandoned,
    TransportClosed,
}

/// 프레젠테이션 레이어가 쥐는 쪽.
pub struct BattleHandle<S> {
    intents: mpsc::UnboundedSender<PlayerIntent>,
    snapshots: watch::Receiver<S>,
    effects: watch::Receiver<Vec<Effect>>,
    cancel: CancellationToken,
}

impl<S: Clone> BattleHandle<S> {
    /// 루프가 이미 끝났으면 false
    pub fn send(&self, intent: PlayerIntent) -> bool {
        self.intents.send(intent).is_ok()
    }

    pub fn answer(&self, option_index: usize) -> bool {
        self.send(PlayerIntent::Answer { option_index })
    }

    pub fn emote(&self, emote: impl Into<String>) -> bool {
        self.send(PlayerIntent::Emote {
            emote: emote.into(),
        })
    }

    pub fn intent_sender(&self) -> mpsc::UnboundedSender<PlayerIntent> {
        self.intents.clone()
    }

    pub fn snapshot(&self) -> S {
        self.snapshots.borrow().clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<S> {
        self.snapshots.clone()
    }

    pub fn effects(&self) -> watch::Receiver<Vec<Effect>> {
        self.effects.clone()
    }

    /// 화면 이탈. 루프는 leave_session 을 보내고 모든 태스크를 정리한 뒤 끝난다.
    pub fn leave(&self) {
        self.cancel.cancel();
    }
}

pub struct BattleRunner<C: Controller, T, G> {
    controller: C,
    deps: BattleDeps<T, G>,
    cancel: CancellationToken,
    intents: mpsc::UnboundedReceiver<PlayerIntent>,
    snapshots: watch::Sender<C::Snapshot>,
    clocks: ClockService,
    clock_tx: mpsc::UnboundedSender<ClockEvent>,
    clock_rx: mpsc::UnboundedReceiver<ClockEvent>,
    active_clocks: HashMap<ClockId, ClockHandle>,
    timers: TimerService,
    timer_rx: mpsc::UnboundedReceiver<TimerKind>,
    effects: EffectScheduler,
    persisted: bool,
    exit: Option<ExitReason>,
}

impl<C, T, G> BattleRunner<C, T, G>
where
    C: Controller,
    T: Transport + 'static,
    G: RewardsGateway + 'static,
{
    pub fn new(
        controller: C,
        deps: BattleDeps<T, G>,
        settings: &BattleSettings,
    ) -> (Self, BattleHandle<C::Snapshot>) {
        let cancel = CancellationToken::new();
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());
        let (clock_tx, clock_rx) = mpsc::unbounded_channel();
        let (timers, timer_rx) = TimerService::new(&cancel);
        let effects = EffectScheduler::new(deps.time.clone(), &cancel);
        let clocks = ClockService::new(deps.time.clone(), settings.clock_tick());

        let handle = BattleHandle {
            intents: intent_tx,
            snapshots: snapshot_rx,
            effects: effects.subscribe(),
            cancel: cancel.clone(),
        };

        let runner = Self {
            controller,
            deps,
            cancel,
            intents: intent_rx,
            snapshots: snapshot_tx,
            clocks,
            clock_tx,
            clock_rx,
            active_clocks: HashMap::new(),
            timers,
            timer_rx,
            effects,
            persisted: false,
            exit: None,
        };
        (runner, handle)
    }

    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Result<BattleExit, BattleError> {
        let session_id = self.controller.session_id().to_string();
        info!(
            "Battle {} ({}) starting",
            session_id,
            self.controller.mode().as_str()
        );

        let commands = self.controller.start();
        self.execute(commands).await;
        self.publish();

        let outcome = loop {
            if let Some(outcome) = self.settled() {
                break outcome;
            }

            let input = tokio::select! {
                _ = self.cancel.cancelled() => break BattleExit::Abandoned,
                event = inbound.recv() => match event {
                    Some(TransportEvent::Message(msg)) => Input::Server(msg),
                    Some(TransportEvent::Connected) => Input::Connection(ConnectionState::Connected),
                    Some(TransportEvent::Disconnected) => Input::Connection(ConnectionState::Disconnected),
                    None => {
                        warn!("Transport for {} closed", session_id);
                        let now = self.deps.time.now_ms();
                        let commands = self
                            .controller
                            .handle(Input::Connection(ConnectionState::Disconnected), now);
                        self.execute(commands).await;
                        self.publish();
                        break self.settled().unwrap_or(BattleExit::TransportClosed);
                    }
                },
                Some(intent) = self.intents.recv() => Input::Intent(intent),
                Some(event) = self.clock_rx.recv() => Input::Clock(event),
                Some(timer) = self.timer_rx.recv() => Input::Timer(timer),
            };

            let now = self.deps.time.now_ms();
            let commands = self.controller.handle(input, now);
            self.execute(commands).await;
            self.publish();
        };

        self.teardown(&session_id).await;
        info!("Battle {} ended: {:?}", session_id, outcome);
        Ok(outcome)
    }

    /// 루프를 끝낼 이유가 생겼는지
    fn settled(&self) -> Option<BattleExit> {
        match self.exit {
            Some(ExitReason::UserRequested) => Some(BattleExit::Abandoned),
            Some(reason) => Some(BattleExit::Redirected(reason)),
            None if self.controller.is_terminal() => Some(BattleExit::Completed),
            None => None,
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.controller.snapshot());
    }

    async fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Send(msg) => self.send(msg).await,
                Command::StartClock { id, end_ms } => {
                    let handle = self
                        .clocks
                        .start(id, end_ms, &self.cancel, self.clock_tx.clone());
                    // 같은 id 의 이전 시계는 drop 되면서 멈춘다.
                    self.active_clocks.insert(id, handle);
                }
                Command::StopClock(id) => {
                    if let Some(handle) = self.active_clocks.remove(&id) {
                        handle.stop();
                    }
                }
                Command::Schedule { timer, after } => self.timers.schedule(timer, after),
                Command::Effect { kind, lifetime } => {
                    self.effects.spawn(kind, lifetime);
                }
                Command::Sound(cue) => play_cue(self.deps.audio.as_ref(), cue),
                Command::Persist(record) => self.persist(record).await,
                Command::Exit(reason) => {
                    info!("Leaving battle: {:?}", reason);
                    self.exit = Some(reason);
                }
            }
        }
    }

    async fn send(&self, msg: ClientMessage) {
        let _ = self
            .deps
            .transport
            .send(msg)
            .await
            .log_err(|e| warn!("Failed to send message: {}", e));
    }

    /// 종료 시 한 번만 보상을 저장한다. 실패해도 결과 화면은 유지된다.
    async fn persist(&mut self, record: RewardRecord) {
        if self.persisted {
            debug!("Rewards for {} already persisted", record.session_id);
            return;
        }
        self.persisted = true;

        match self.deps.gateway.complete_session(&record).await {
            Ok(receipt) => {
                self.deps.notices.publish(Notice::RewardsGranted {
                    mode: record.mode,
                    xp: record.rewards.xp,
                    gems: record.rewards.gems,
                });
                match receipt.level {
                    Some(level) if receipt.leveled_up => {
                        self.deps.notices.publish(Notice::LevelUp { level });
                    }
                    _ => {}
                }
            }
            Err(e) => error!(
                "Failed to persist rewards for {}: {}",
                record.session_id, e
            ),
        }
    }

    async fn teardown(&mut self, session_id: &str) {
        self.send(ClientMessage::LeaveSession {
            session_id: session_id.to_string(),
        })
        .await;

        for (_, handle) in self.active_clocks.drain() {
            handle.stop();
        }
        self.timers.shutdown();
        self.effects.shutdown();
        self.cancel.cancel();
        self.publish();
    }
}
