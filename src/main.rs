use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use math_battle::{
    battle::{Controller, MatchController, PlayerIntent, RaidController},
    clock::AnchoredClock,
    effects::audio::NullAudio,
    env::Settings,
    gateway::HttpRewardsGateway,
    notify::{EventBus, Notice},
    protocol::ClientMessage,
    runtime::{BattleDeps, BattleExit, BattleHandle, BattleRunner},
    transport::{Transport, WsTransport},
    LogExt, LoggerManager,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Pvp,
    Raid,
}

#[derive(Parser)]
#[command(
    name = "math battle",
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None,
)]
struct Args {
    #[arg(long, value_enum)]
    mode: Mode,

    #[arg(long)]
    session: String,

    /// 생략하면 임시 id 를 만든다
    #[arg(long)]
    player: Option<String>,

    /// 입장 전에 보낼 대결 신청 상대 (PvP)
    #[arg(long)]
    challenge: Option<String>,
}

/// stdin 한 줄을 intent 로 바꾼다. 숫자는 보기 번호(1부터), `emote <x>`, `exit`.
fn parse_intent(line: &str) -> Option<PlayerIntent> {
    let line = line.trim();
    if line.eq_ignore_ascii_case("exit") {
        return Some(PlayerIntent::Exit);
    }
    if let Some(emote) = line.strip_prefix("emote ") {
        return Some(PlayerIntent::Emote {
            emote: emote.trim().to_string(),
        });
    }
    match line.parse::<usize>() {
        Ok(n) if n >= 1 => Some(PlayerIntent::Answer {
            option_index: n - 1,
        }),
        _ => None,
    }
}

fn spawn_console<S>(handle: &BattleHandle<S>)
where
    S: Clone + Serialize + Send + Sync + 'static,
{
    let intents = handle.intent_sender();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_intent(&line) {
                Some(intent) => {
                    if intents.send(intent).is_err() {
                        break;
                    }
                }
                None => warn!("Unrecognised input: {}", line),
            }
        }
    });

    let mut snapshots = handle.snapshots();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            match serde_json::to_string(&snapshot) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to render snapshot: {}", e),
            }
        }
    });
}

async fn play<C>(
    controller: C,
    settings: &Settings,
    transport: Arc<WsTransport>,
    inbound: tokio::sync::mpsc::UnboundedReceiver<math_battle::transport::TransportEvent>,
    notices: Arc<EventBus<Notice>>,
) -> anyhow::Result<BattleExit>
where
    C: Controller + 'static,
    C::Snapshot: Serialize,
{
    let gateway = HttpRewardsGateway::new(
        &settings.server.api_base_url,
        settings.server.auth_token.clone(),
    )?;

    let deps = BattleDeps {
        transport,
        gateway: Arc::new(gateway),
        notices,
        time: Arc::new(AnchoredClock::new()),
        audio: Arc::new(NullAudio),
    };
    let (runner, handle) = BattleRunner::new(controller, deps, &settings.battle);
    spawn_console(&handle);

    let exit = runner.run(inbound).await?;
    Ok(exit)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    let settings = Settings::new().context("Failed to load settings")?;
    let _logger = LoggerManager::setup(&settings);

    let player_id = args
        .player
        .unwrap_or_else(|| format!("guest-{}", Uuid::new_v4()));
    info!("Player {} joining session {}", player_id, args.session);

    let (transport, inbound) = WsTransport::connect(
        &settings.server.ws_url,
        settings.server.auth_token.as_deref(),
        settings.server.connect_timeout(),
    )
    .await
    .log_ok(|_| info!("Connected to {}", settings.server.ws_url))
    .context("Failed to connect to battle server")?;
    let transport = Arc::new(transport);

    if let Some(opponent_id) = args.challenge {
        transport
            .send(ClientMessage::Challenge { opponent_id })
            .await
            .context("Failed to send challenge")?;
    }

    let notices = Arc::new(EventBus::<Notice>::default());
    let mut notice_rx = notices.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notice_rx.recv().await {
            info!("Notice: {:?}", notice);
        }
    });

    let exit = match args.mode {
        Mode::Pvp => {
            let controller = MatchController::new(
                args.session,
                player_id,
                settings.battle.clone(),
                settings.effects.clone(),
            );
            play(controller, &settings, transport.clone(), inbound, notices).await?
        }
        Mode::Raid => {
            let controller = RaidController::new(
                args.session,
                player_id,
                settings.battle.clone(),
                settings.effects.clone(),
            );
            play(controller, &settings, transport.clone(), inbound, notices).await?
        }
    };

    let _ = transport
        .close()
        .await
        .log_err(|e| warn!("Close failed: {}", e));
    info!("Battle finished: {:?}", exit);
    Ok(())
}
