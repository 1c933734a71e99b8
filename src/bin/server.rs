use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use manhunt_event_server::arena::{Arena, HostEvent};
use manhunt_event_server::commands::{
    parse_command_line, run_chat_command, run_console_command, CommandOutcome, CHAT_COMMAND,
};
use manhunt_event_server::config::HuntConfig;
use manhunt_event_server::constants::{REVEAL_GLYPH, REVEAL_GLYPH_COLOR, TICK_MS};
use manhunt_event_server::error::HuntError;
use manhunt_event_server::lang::{normalize_language, render};
use manhunt_event_server::machine::{DeathVerdict, HuntEvent};
use manhunt_event_server::server_protocol::{parse_client_message, ParsedClientMessage};
use manhunt_event_server::server_utils::{
    chat_command, is_admin_name, parse_admins, parse_landmark, player_order_key, sanitize_name,
    sanitize_tag,
};
use manhunt_event_server::state_store::FileStateStore;
use manhunt_event_server::types::{NameMap, Vec3};
use rand::Rng;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Radius of the protected zone around `MANHUNT_LANDMARK`.
const SAFE_ZONE_RADIUS: f32 = 150.0;
const SPAWN_POINT: Vec3 = Vec3::new(0.0, 0.0, 0.0);

type SharedState = Arc<Mutex<ServerState>>;
type ServerEvent = HuntEvent<Arena, FileStateStore>;

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    player_id: Option<String>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    active_client_by_player_id: HashMap<String, String>,
    admins: BTreeSet<String>,
    event: ServerEvent,
}

impl ServerState {
    fn new(event: ServerEvent, admins: BTreeSet<String>) -> Self {
        Self {
            clients: HashMap::new(),
            active_client_by_player_id: HashMap::new(),
            admins,
            event,
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let config_path = std::env::var("MANHUNT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/manhunt-config.json"));
    let data_path = std::env::var("MANHUNT_DATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/manhunt.json"));
    let admins = parse_admins(std::env::var("MANHUNT_ADMINS").ok().as_deref());
    let landmark = parse_landmark(std::env::var("MANHUNT_LANDMARK").ok().as_deref());

    let config = HuntConfig::load_or_default(&config_path);
    let mut arena = Arena::new();
    arena.enable_clans();
    if config.prize > 0 {
        arena.enable_rewards();
    }
    arena.set_landmark(landmark);
    if let Some(center) = landmark {
        arena.add_safe_zone(center, SAFE_ZONE_RADIUS);
    }

    let seed = rand::rng().random::<u64>();
    let mut event = HuntEvent::new(config, arena, FileStateStore::new(data_path), seed);
    let now = now_ms();
    event.host_mut().set_clock(now);
    event.recover(now);
    info!(phase = event.phase().label(), admins = admins.len(), "manhunt event loaded");

    let state = Arc::new(Mutex::new(ServerState::new(event, admins)));
    start_tick_loop(state.clone());
    start_console_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/event", get(event_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(port, "listening");
    axum::serve(listener, app).await
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn event_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(build_event_status(&guard.event))
}

fn build_event_status(event: &ServerEvent) -> Value {
    let phase = event.phase();
    json!({
        "phase": phase.label(),
        "endTime": phase.end_time_ms().and_then(format_timestamp),
        "hunted": roster_entries(event.registry().hunted()),
        "hunters": roster_entries(event.registry().hunters()),
        "pendingTimers": event.timers().pending(),
    })
}

fn roster_entries(names: &NameMap) -> Vec<Value> {
    let mut entries: Vec<(&String, &String)> = names.iter().collect();
    entries.sort_by_key(|(id, _)| player_order_key(id));
    entries
        .into_iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect()
}

fn format_timestamp(ms: u64) -> Option<String> {
    let millis = i64::try_from(ms).ok()?;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                player_id: None,
            },
        );
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(state, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid message").await;
        return;
    };

    let mut guard = state.lock().await;
    let now = now_ms();
    guard.event.host_mut().set_clock(now);

    if let ParsedClientMessage::Hello {
        name,
        lang,
        team,
        clan,
    } = message
    {
        handle_hello(&mut guard, client_id, &name, lang, team, clan);
        deliver_host_events(&mut guard);
        return;
    }

    let Some(player_id) = guard
        .clients
        .get(client_id)
        .and_then(|client| client.player_id.clone())
    else {
        send_to_client(
            &mut guard,
            client_id,
            &json!({ "type": "error", "message": "hello required" }),
            QueuePolicy::DisconnectOnFull,
        );
        return;
    };

    match message {
        ParsedClientMessage::Hello { .. } => {}
        ParsedClientMessage::Chat { text } => handle_chat(&mut guard, &player_id, &text, now),
        ParsedClientMessage::Console { line } => {
            let result = run_console_command(&mut guard.event, Some(&player_id), &line, now);
            send_command_result(&mut guard, &player_id, result);
        }
        ParsedClientMessage::Move { position, flying } => {
            let arena = guard.event.host_mut();
            arena.set_position(&player_id, position);
            if let (Some(flying), Some(participant)) = (flying, arena.player_mut(&player_id)) {
                participant.flying = flying;
            }
        }
        ParsedClientMessage::Death { killer } => {
            let verdict = guard
                .event
                .on_player_death(&player_id, killer.as_deref(), now);
            if verdict != DeathVerdict::Vetoed {
                guard.event.host_mut().respawn(&player_id, SPAWN_POINT);
            }
            send_to_player(
                &mut guard,
                &player_id,
                &json!({ "type": "death_result", "verdict": verdict }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::Mount { seat } => {
            let allowed = guard.event.can_mount(&player_id, &seat);
            send_to_player(
                &mut guard,
                &player_id,
                &json!({ "type": "mount_result", "seat": seat, "allowed": allowed }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::Ping { t } => {
            send_to_player(
                &mut guard,
                &player_id,
                &json!({ "type": "pong", "t": t }),
                QueuePolicy::DropOnFull,
            );
        }
    }

    deliver_host_events(&mut guard);
}

fn handle_hello(
    state: &mut ServerState,
    client_id: &str,
    name: &str,
    lang: Option<String>,
    team: Option<String>,
    clan: Option<String>,
) {
    let already_bound = state
        .clients
        .get(client_id)
        .is_some_and(|client| client.player_id.is_some());
    if already_bound {
        send_to_client(
            state,
            client_id,
            &json!({ "type": "error", "message": "already joined" }),
            QueuePolicy::DisconnectOnFull,
        );
        return;
    }

    let player_id = make_id("player");
    let name = sanitize_name(name);
    let admin = is_admin_name(&state.admins, &name);
    let language = normalize_language(lang.as_deref());

    let arena = state.event.host_mut();
    let player = arena.connect(&player_id, &name, SPAWN_POINT);
    player.participant.admin = admin;
    player.participant.team = sanitize_tag(team.as_deref());
    arena.set_language(&player_id, language);
    if let Some(clan) = sanitize_tag(clan.as_deref()) {
        arena.set_clan(&player_id, &clan);
    }

    if let Some(client) = state.clients.get_mut(client_id) {
        client.player_id = Some(player_id.clone());
    }
    state
        .active_client_by_player_id
        .insert(player_id.clone(), client_id.to_string());
    info!(player = %player_id, name = %name, admin, language, "participant connected");

    let phase = state.event.phase();
    let overlay = overlay_snapshot(state.event.host_mut(), &player_id, language);
    send_to_client(
        state,
        client_id,
        &json!({
            "type": "welcome",
            "playerId": player_id,
            "name": name,
            "admin": admin,
            "language": language,
            "phase": phase,
            "banners": overlay["banners"],
            "markers": overlay["markers"],
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

/// What is already on screen, so a late joiner starts with the same view.
fn overlay_snapshot(arena: &mut Arena, viewer: &str, language: &'static str) -> Value {
    let banners: Vec<Value> = arena
        .live_banners_for(viewer)
        .iter()
        .map(|view| {
            json!({
                "name": view.name,
                "style": view.style,
                "color": view.style.rgba(),
                "text": render(language, &view.message),
                "expiresAt": view.expires_at_ms,
            })
        })
        .collect();
    let markers: Vec<Value> = arena
        .live_markers()
        .iter()
        .map(|marker| {
            json!({
                "id": marker.id,
                "position": marker.position,
                "glyph": REVEAL_GLYPH,
                "color": REVEAL_GLYPH_COLOR,
            })
        })
        .collect();
    json!({ "banners": banners, "markers": markers })
}

fn handle_chat(state: &mut ServerState, player_id: &str, text: &str, now: u64) {
    let command = chat_command(text).and_then(parse_command_line);
    match command {
        Some((name, args)) if name == CHAT_COMMAND => {
            let result = run_chat_command(&mut state.event, player_id, &args, now);
            send_command_result(state, player_id, result);
        }
        Some((name, _)) => {
            debug!(player = %player_id, command = %name, "unknown chat command");
        }
        None => {
            let from = state
                .event
                .host()
                .player(player_id)
                .map(|player| player.participant.name.clone())
                .unwrap_or_default();
            broadcast(
                state,
                &json!({ "type": "chat", "from": from, "text": text }),
                QueuePolicy::DropOnFull,
            );
        }
    }
}

fn send_command_result(
    state: &mut ServerState,
    player_id: &str,
    result: Result<CommandOutcome, HuntError>,
) {
    let message = match result {
        Ok(outcome) => json!({ "type": "command_result", "outcome": outcome }),
        Err(error) => {
            warn!(player = %player_id, %error, "command failed");
            json!({ "type": "error", "message": error.to_string() })
        }
    };
    send_to_player(state, player_id, &message, QueuePolicy::DisconnectOnFull);
}

async fn handle_disconnect(state: SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    disconnect_client_internal(&mut guard, client_id);
    deliver_host_events(&mut guard);
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let Some(context) = state.clients.remove(client_id) else {
        return;
    };
    let Some(bound_player_id) = context.player_id else {
        return;
    };
    if state
        .active_client_by_player_id
        .get(&bound_player_id)
        .map(|active| active != client_id)
        .unwrap_or(true)
    {
        return;
    }
    state.active_client_by_player_id.remove(&bound_player_id);

    let now = now_ms();
    state.event.host_mut().set_clock(now);
    state.event.on_disconnect(&bound_player_id, now);
    state.event.host_mut().disconnect(&bound_player_id);
    info!(player = %bound_player_id, "participant disconnected");
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            let now = now_ms();
            guard.event.host_mut().set_clock(now);
            guard.event.tick(now);
            deliver_host_events(&mut guard);
        }
    });
}

/// Reads `mhunt start|end` from the server console.
fn start_console_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let mut guard = state.lock().await;
            let now = now_ms();
            guard.event.host_mut().set_clock(now);
            match run_console_command(&mut guard.event, None, &line, now) {
                Ok(outcome) => info!(?outcome, "console command"),
                Err(error) => warn!(%error, "console command failed"),
            }
            deliver_host_events(&mut guard);
        }
    });
}

/// Turns what the event asked of the arena into per-client messages,
/// rendered in each recipient's language.
fn deliver_host_events(state: &mut ServerState) {
    let events = state.event.host_mut().take_events();
    for event in events {
        match event {
            HostEvent::Banner { audience, banner } => {
                for id in state.event.host().recipients(&audience) {
                    let text = render(language_of(state, &id), &banner.message);
                    let message = json!({
                        "type": "banner",
                        "name": banner.name,
                        "style": banner.style,
                        "color": banner.style.rgba(),
                        "text": text,
                        "ttlMs": banner.ttl_ms,
                    });
                    send_to_player(state, &id, &message, QueuePolicy::DropOnFull);
                }
            }
            HostEvent::ClearBanners { audience } => {
                for id in state.event.host().recipients(&audience) {
                    send_to_player(
                        state,
                        &id,
                        &json!({ "type": "clear_banners" }),
                        QueuePolicy::DropOnFull,
                    );
                }
            }
            HostEvent::Chat { audience, message } => {
                for id in state.event.host().recipients(&audience) {
                    let text = render(language_of(state, &id), &message);
                    send_to_player(
                        state,
                        &id,
                        &json!({ "type": "chat", "from": "Manhunt", "text": text }),
                        QueuePolicy::DropOnFull,
                    );
                }
            }
            HostEvent::MarkerPlaced { marker, position } => broadcast(
                state,
                &json!({
                    "type": "marker",
                    "id": marker,
                    "position": position,
                    "glyph": REVEAL_GLYPH,
                    "color": REVEAL_GLYPH_COLOR,
                }),
                QueuePolicy::DropOnFull,
            ),
            HostEvent::MarkerRemoved { marker } => broadcast(
                state,
                &json!({ "type": "marker_removed", "id": marker }),
                QueuePolicy::DropOnFull,
            ),
            HostEvent::Teleported { id, to } => send_to_player(
                state,
                &id,
                &json!({ "type": "teleport", "position": to }),
                QueuePolicy::DisconnectOnFull,
            ),
            HostEvent::Beacon {
                viewer,
                position,
                duration_ms,
            } => send_to_player(
                state,
                &viewer,
                &json!({ "type": "beacon", "position": position, "durationMs": duration_ms }),
                QueuePolicy::DropOnFull,
            ),
            HostEvent::Hostile { id, duration_ms } => send_to_player(
                state,
                &id,
                &json!({ "type": "hostile", "durationMs": duration_ms }),
                QueuePolicy::DropOnFull,
            ),
            HostEvent::KillVetoed { id } => send_to_player(
                state,
                &id,
                &json!({ "type": "kill_vetoed" }),
                QueuePolicy::DropOnFull,
            ),
            HostEvent::Credited { id, amount } => send_to_player(
                state,
                &id,
                &json!({ "type": "credited", "amount": amount }),
                QueuePolicy::DropOnFull,
            ),
        }
    }
}

fn language_of(state: &ServerState, player_id: &str) -> &'static str {
    state
        .event
        .host()
        .player(player_id)
        .map(|player| player.language)
        .unwrap_or("en")
}

fn send_to_player(state: &mut ServerState, player_id: &str, message: &Value, policy: QueuePolicy) {
    let Some(client_id) = state.active_client_by_player_id.get(player_id).cloned() else {
        return;
    };
    send_to_client(state, &client_id, message, policy);
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        close_client(state, client_id, "send queue full");
        disconnect_client_internal(state, client_id);
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let client_ids: Vec<String> = state.active_client_by_player_id.values().cloned().collect();
    let mut failed_clients = Vec::new();
    for client_id in client_ids {
        let Some(client) = state.clients.get(&client_id) else {
            continue;
        };
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.clone()))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id);
        }
    }
    for client_id in failed_clients {
        disconnect_client_internal(state, &client_id);
    }
}

fn close_client(state: &ServerState, client_id: &str, reason: &str) {
    if let Some(client) = state.clients.get(client_id) {
        let _ = client.tx.try_send(OutboundMessage::Close {
            code: 1008,
            reason: reason.to_string(),
        });
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
