use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use draft_royale_server::cards::{demo_catalog, load_catalog, CatalogEntry};
use draft_royale_server::config::{GameConfig, ServerConfig};
use draft_royale_server::history_store::HistoryStore;
use draft_royale_server::participants::MatchId;
use draft_royale_server::protocol::{parse_client_message, ClientMessage, GameAction};
use draft_royale_server::registry::{
    CleanupTtl, ConnectionId, ConnectionRegistry, JoinOutcome, MatchRegistry,
};
use draft_royale_server::rng::Rng;
use draft_royale_server::server_utils::{
    normalize_match_id, parse_leaderboard_limit, sanitize_name,
};
use draft_royale_server::types::ServerEvent;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

const DEMO_CATALOG_SIZE: usize = 360;

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
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

#[derive(Debug)]
struct CleanupRequest {
    match_id: MatchId,
    token: u64,
    delay: Duration,
}

struct ServerState {
    clients: HashMap<ConnectionId, ClientContext>,
    connections: ConnectionRegistry,
    matches: MatchRegistry,
    history: HistoryStore,
    catalog: Vec<CatalogEntry>,
    cleanup_tx: mpsc::UnboundedSender<CleanupRequest>,
}

impl ServerState {
    fn new(
        config: &ServerConfig,
        history: HistoryStore,
        catalog: Vec<CatalogEntry>,
        cleanup_tx: mpsc::UnboundedSender<CleanupRequest>,
    ) -> Self {
        Self {
            clients: HashMap::new(),
            connections: ConnectionRegistry::new(),
            matches: MatchRegistry::new(CleanupTtl {
                lobby: config.lobby_ttl,
                multiplayer: config.multiplayer_ttl,
                solo: config.solo_ttl,
            }),
            history,
            catalog,
            cleanup_tx,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();
    let catalog = resolve_catalog(&config);
    let history = HistoryStore::new(config.history_path.clone());
    info!(
        history = %config.history_path.display(),
        identities = history.len(),
        catalog = catalog.len(),
        "history loaded"
    );

    let (cleanup_tx, cleanup_rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(ServerState::new(
        &config, history, catalog, cleanup_tx,
    )));
    start_cleanup_loop(state.clone(), cleanup_rx);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found, serving api only");
        app
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(port = config.port, "listening");
    axum::serve(listener, app).await
}

fn resolve_catalog(config: &ServerConfig) -> Vec<CatalogEntry> {
    let Some(path) = config.cube_path.as_ref() else {
        return demo_catalog(DEMO_CATALOG_SIZE);
    };
    match load_catalog(path) {
        Ok(entries) if !entries.is_empty() => entries,
        Ok(_) => {
            warn!(path = %path.display(), "cube file is empty, using demo catalog");
            demo_catalog(DEMO_CATALOG_SIZE)
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to load cube, using demo catalog");
            demo_catalog(DEMO_CATALOG_SIZE)
        }
    }
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("dist/client"), PathBuf::from("../dist/client")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn leaderboard_handler(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(
        guard
            .history
            .build_leaderboard(parse_leaderboard_limit(query.limit.as_deref())),
    )
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let connection = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard
            .clients
            .insert(connection, ClientContext { tx: tx.clone() });
    }
    debug!(connection, "socket opened");

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
                handle_client_message(&state, connection, raw.as_str()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(&state, connection, &text).await;
                } else {
                    let mut guard = state.lock().await;
                    send_error(&mut guard, connection, "invalid utf8 message");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        disconnect_client_internal(&mut guard, connection);
    }
    debug!(connection, "socket closed");
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: &SharedState, connection: ConnectionId, raw: &str) {
    let mut guard = state.lock().await;
    let message = match parse_client_message(raw) {
        Ok(message) => message,
        Err(reason) => {
            send_error(&mut guard, connection, &reason);
            return;
        }
    };

    match message {
        ClientMessage::Join { match_id, name } => {
            handle_join(&mut guard, connection, match_id.as_deref(), &name);
        }
        ClientMessage::Ping { t } => {
            send_to_client(
                &mut guard,
                connection,
                &ServerEvent::Pong { t },
                QueuePolicy::DropOnFull,
            );
        }
        ClientMessage::SetReady { ready } => {
            let Some((match_id, name)) = guard.connections.binding(connection).cloned() else {
                send_error(&mut guard, connection, "join a match first");
                return;
            };
            guard.matches.touch(&match_id);
            match guard.matches.set_ready(&match_id, &name, ready) {
                Ok(()) => broadcast_lobby(&mut guard, &match_id),
                Err(error) => send_error(&mut guard, connection, &error.to_string()),
            }
        }
        ClientMessage::StartGame { config } => {
            handle_start(&mut guard, connection, config.unwrap_or_default());
        }
        ClientMessage::Game(action) => {
            handle_game_action(&mut guard, connection, action);
        }
    }
}

fn handle_join(
    state: &mut ServerState,
    connection: ConnectionId,
    requested_match: Option<&str>,
    requested_name: &str,
) {
    let Some(match_id) = normalize_match_id(requested_match) else {
        send_error(state, connection, "matchId may only hold letters, digits and '-'");
        return;
    };
    let name = sanitize_name(requested_name);

    if let Some((previous_match, previous_name)) = state.connections.binding(connection).cloned() {
        if previous_match != match_id || previous_name != name {
            state.connections.disconnect(connection);
            state.matches.mark_disconnected(&previous_match, &previous_name);
            broadcast_lobby(state, &previous_match);
            schedule_cleanup_if_idle(state, &previous_match);
        }
    }

    let outcome = match state.matches.join(&match_id, &name) {
        Ok(outcome) => outcome,
        Err(error) => {
            send_error(state, connection, &error.to_string());
            return;
        }
    };
    if let Some(superseded) = state.connections.bind(&match_id, &name, connection) {
        if let Some(old) = state.clients.get(&superseded) {
            let _ = old.tx.try_send(OutboundMessage::Close {
                code: 4001,
                reason: "superseded by new connection".to_string(),
            });
        }
    }
    state.matches.touch(&match_id);
    info!(match_id = %match_id, player = %name, ?outcome, "player joined");

    send_to_client(
        state,
        connection,
        &ServerEvent::Welcome {
            match_id: match_id.to_string(),
            name: name.clone(),
        },
        QueuePolicy::DisconnectOnFull,
    );
    broadcast_lobby(state, &match_id);
    if outcome == JoinOutcome::Rejoined {
        send_game_state(state, &match_id, &name, connection);
    }
}

fn handle_start(state: &mut ServerState, connection: ConnectionId, mut config: GameConfig) {
    let Some((match_id, name)) = state.connections.binding(connection).cloned() else {
        send_error(state, connection, "join a match first");
        return;
    };
    state.matches.touch(&match_id);

    let members: Vec<String> = state
        .matches
        .lobby_view(&match_id)
        .map(|view| view.members.into_iter().map(|member| member.name).collect())
        .unwrap_or_default();
    // A lone player always gets at least one rival.
    if state.matches.connected_count(&match_id) == 1 && config.bot_count == 0 {
        config.bot_count = 1;
    }
    let seed = now_ms() as u32;
    let mut rng = Rng::new(seed);
    let bots = state.history.sample_bots(config.bot_count, &members, &mut rng);
    if bots.len() < config.bot_count {
        debug!(
            match_id = %match_id,
            wanted = config.bot_count,
            found = bots.len(),
            "not enough recorded identities for bots"
        );
    }

    let catalog = std::mem::take(&mut state.catalog);
    let started = state
        .matches
        .start_game(&match_id, &name, config, &catalog, bots, seed)
        .map(|game| (game.players().len(), game.bots().len()));
    state.catalog = catalog;

    match started {
        Ok((players, bots)) => {
            info!(match_id = %match_id, host = %name, players, bots, seed, "match running");
            broadcast_lobby(state, &match_id);
            broadcast_game_state(state, &match_id);
        }
        Err(error) => send_error(state, connection, &error.to_string()),
    }
}

fn handle_game_action(state: &mut ServerState, connection: ConnectionId, action: GameAction) {
    let Some((match_id, name)) = state.connections.binding(connection).cloned() else {
        send_error(state, connection, "join a match first");
        return;
    };
    state.matches.touch(&match_id);
    let action_name = action.name();

    let Some(game) = state.matches.game_mut(&match_id) else {
        send_error(state, connection, "match is not running");
        return;
    };
    let result = game.apply_action(&name, action);
    let records = game.drain_history();
    let finished = game.is_ended().then(|| game.summary());
    for record in &records {
        state.history.record(record);
    }

    match result {
        Ok(()) => {
            debug!(match_id = %match_id, player = %name, action = action_name, "action applied");
            broadcast_game_state(state, &match_id);
        }
        Err(error) if error.is_fatal() => {
            warn!(
                match_id = %match_id,
                player = %name,
                action = action_name,
                %error,
                "match abandoned"
            );
            broadcast_event(
                state,
                &match_id,
                &ServerEvent::Error {
                    message: error.to_string(),
                },
            );
            state.matches.remove(&match_id);
            state.connections.forget_match(&match_id);
            return;
        }
        Err(error) => {
            debug!(
                match_id = %match_id,
                player = %name,
                action = action_name,
                %error,
                "action rejected"
            );
            send_error(state, connection, &error.to_string());
            return;
        }
    }

    if let Some(summary) = finished {
        info!(match_id = %match_id, winner = ?summary.winner, "match finished");
        broadcast_event(state, &match_id, &ServerEvent::GameOver(summary));
        if let Some((token, delay)) = state.matches.schedule_cleanup(&match_id) {
            request_cleanup(state, match_id, token, delay);
        }
    }
}

fn disconnect_client_internal(state: &mut ServerState, connection: ConnectionId) {
    state.clients.remove(&connection);
    let Some((match_id, name)) = state.connections.disconnect(connection) else {
        return;
    };
    state.matches.mark_disconnected(&match_id, &name);
    info!(match_id = %match_id, player = %name, "player disconnected");
    broadcast_lobby(state, &match_id);
    schedule_cleanup_if_idle(state, &match_id);
}

fn schedule_cleanup_if_idle(state: &mut ServerState, match_id: &MatchId) {
    if state.matches.connected_count(match_id) > 0 {
        return;
    }
    if let Some((token, delay)) = state.matches.schedule_cleanup(match_id) {
        request_cleanup(state, match_id.clone(), token, delay);
    }
}

fn request_cleanup(state: &ServerState, match_id: MatchId, token: u64, delay: Duration) {
    if state
        .cleanup_tx
        .send(CleanupRequest {
            match_id,
            token,
            delay,
        })
        .is_err()
    {
        warn!("cleanup loop is gone");
    }
}

fn start_cleanup_loop(state: SharedState, mut rx: mpsc::UnboundedReceiver<CleanupRequest>) {
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(request.delay).await;
                let mut guard = state.lock().await;
                if guard
                    .matches
                    .expire_if_current(&request.match_id, request.token)
                {
                    guard.connections.forget_match(&request.match_id);
                }
            });
        }
    });
}

fn send_game_state(
    state: &mut ServerState,
    match_id: &MatchId,
    name: &str,
    connection: ConnectionId,
) {
    let Some(game) = state.matches.game(match_id) else {
        return;
    };
    match game.build_state_view(name) {
        Ok(view) => send_to_client(
            state,
            connection,
            &ServerEvent::GameState(Box::new(view)),
            QueuePolicy::DisconnectOnFull,
        ),
        Err(error) => {
            warn!(match_id = %match_id, player = %name, %error, "failed to build state view");
        }
    }
}

fn broadcast_game_state(state: &mut ServerState, match_id: &MatchId) {
    for (name, connection) in state.connections.players_in(match_id) {
        send_game_state(state, match_id, &name, connection);
    }
}

fn broadcast_lobby(state: &mut ServerState, match_id: &MatchId) {
    let Some(view) = state.matches.lobby_view(match_id) else {
        return;
    };
    broadcast_event(state, match_id, &ServerEvent::LobbyState(view));
}

fn broadcast_event(state: &mut ServerState, match_id: &MatchId, event: &ServerEvent) {
    for (_, connection) in state.connections.players_in(match_id) {
        send_to_client(state, connection, event, QueuePolicy::DisconnectOnFull);
    }
}

fn send_error(state: &mut ServerState, connection: ConnectionId, message: &str) {
    send_to_client(
        state,
        connection,
        &ServerEvent::Error {
            message: message.to_string(),
        },
        QueuePolicy::DisconnectOnFull,
    );
}

fn send_to_client(
    state: &mut ServerState,
    connection: ConnectionId,
    event: &ServerEvent,
    policy: QueuePolicy,
) {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(connection, %error, "failed to serialize event");
            return;
        }
    };
    let send_failed = state
        .clients
        .get(&connection)
        .map(|client| client.tx.try_send(OutboundMessage::Text(payload)).is_err())
        .unwrap_or(false);
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        warn!(connection, "outbound queue full, dropping client");
        disconnect_client_internal(state, connection);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
