use clap::Parser;
use draft_royale_server::autopilot::next_action;
use draft_royale_server::cards::demo_catalog;
use draft_royale_server::config::GameConfig;
use draft_royale_server::engine::Game;
use draft_royale_server::history_store::HistoryStore;
use draft_royale_server::participants::{MatchId, ParticipantKind, Phase};
use draft_royale_server::rng::Rng;
use draft_royale_server::types::GameSummary;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

const CATALOG_SIZE: usize = 360;
const STEP_SAFETY_LIMIT: u64 = 50_000;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    single: bool,
    #[arg(long)]
    players: Option<usize>,
    #[arg(long)]
    bots: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    /// History file bots are sampled from and finished matches are written to.
    #[arg(long)]
    history: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    players: usize,
    bots: usize,
    seed: u32,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    players: usize,
    bots: usize,
    winner: Option<String>,
    #[serde(rename = "winnerKind")]
    winner_kind: Option<ParticipantKind>,
    actions: u64,
    #[serde(rename = "finalStage")]
    final_stage: u32,
    #[serde(rename = "historyRecords")]
    history_records: usize,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    step: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageActions")]
    average_actions: u64,
    #[serde(rename = "winnerKinds")]
    winner_kinds: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<u64>,
    details: Value,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms));
    let history_path = cli.history.clone().unwrap_or_else(|| {
        std::env::temp_dir()
            .join(format!("{match_id}-{}", std::process::id()))
            .join("history.json")
    });
    let mut history = HistoryStore::new(history_path);

    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut winner_kinds: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_actions = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({
                "players": scenario.players,
                "bots": scenario.bots,
            }),
        );
        let scenario_run = run_scenario(&scenario, &match_id, &mut history);

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &match_id,
                Some(&scenario.name),
                Some(scenario.seed),
                Some(anomaly.step),
                json!({
                    "message": anomaly.message,
                }),
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_actions += scenario_run.result.actions;
        *winner_kinds
            .entry(winner_kind_key(scenario_run.result.winner_kind))
            .or_insert(0) += 1;

        emit_log(
            "info",
            "scenario_finished",
            &match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            Some(scenario_run.result.actions),
            json!({
                "winner": scenario_run.result.winner,
                "finalStage": scenario_run.result.final_stage,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        match serde_json::to_string(&scenario_run.result) {
            Ok(line) => println!("{line}"),
            Err(error) => emit_log(
                "error",
                "result_serialize_failed",
                &match_id,
                Some(&scenario.name),
                Some(scenario.seed),
                None,
                json!({ "error": error.to_string() }),
            ),
        }
        scenario_results.push(scenario_run.result);
    }

    let run_finished_at_ms = now_ms();
    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        run_finished_at_ms,
        scenario_results,
        winner_kinds,
        total_anomalies,
        total_actions,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &match_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &match_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageActions": summary.average_actions,
            "winnerKinds": summary.winner_kinds,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn run_scenario(
    scenario: &Scenario,
    match_id: &str,
    history: &mut HistoryStore,
) -> ScenarioRunResult {
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();

    let names: Vec<String> = (1..=scenario.players)
        .map(|idx| format!("{}-p{idx}", scenario.name))
        .collect();
    let mut rng = Rng::new(scenario.seed);
    let bots = history.sample_bots(scenario.bots, &names, &mut rng);
    if bots.len() < scenario.bots {
        emit_log(
            "warn",
            "bots_unavailable",
            match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({ "wanted": scenario.bots, "found": bots.len() }),
        );
    }
    let bot_count = bots.len();

    let mut game = match Game::new(
        MatchId::new(format!("{match_id}-{}", scenario.name)),
        names.clone(),
        bots,
        &demo_catalog(CATALOG_SIZE),
        GameConfig {
            bot_count,
            ..GameConfig::default()
        },
        scenario.seed,
    ) {
        Ok(game) => game,
        Err(error) => {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                0,
                format!("match failed to start: {error}"),
            );
            return ScenarioRunResult {
                result: empty_result(scenario, bot_count, anomalies),
                anomaly_records,
            };
        }
    };

    let mut step = 0u64;
    let mut history_records = 0usize;
    'outer: while !game.is_ended() {
        let mut progressed = false;
        for name in &names {
            while let Some(action) = next_action(&game, name) {
                let action_name = action.name();
                if let Err(error) = game.apply_action(name, action) {
                    push_anomaly(
                        &mut anomalies,
                        &mut anomaly_records,
                        &mut anomaly_seen,
                        step,
                        format!("{name} {action_name} rejected: {error}"),
                    );
                    break 'outer;
                }
                step += 1;
                progressed = true;

                for record in game.drain_history() {
                    history.record(&record);
                    history_records += 1;
                }
                for message in collect_game_anomalies(&game) {
                    push_anomaly(
                        &mut anomalies,
                        &mut anomaly_records,
                        &mut anomaly_seen,
                        step,
                        message,
                    );
                }
                if game.is_ended() || step > STEP_SAFETY_LIMIT {
                    break 'outer;
                }
            }
        }
        if !progressed {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                step,
                "no seat can act".to_string(),
            );
            break;
        }
    }
    if step > STEP_SAFETY_LIMIT {
        push_anomaly(
            &mut anomalies,
            &mut anomaly_records,
            &mut anomaly_seen,
            step,
            "step safety limit exceeded".to_string(),
        );
    }

    let summary = game.summary();
    if game.is_ended() {
        for message in collect_summary_anomalies(&summary, scenario.players + bot_count) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                step,
                message,
            );
        }
    }
    let final_stage = game
        .players()
        .iter()
        .map(|player| player.stage)
        .max()
        .unwrap_or(1);
    let winner_kind = summary
        .placements
        .iter()
        .find(|entry| entry.placement == 1)
        .map(|entry| entry.kind);

    ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            players: scenario.players,
            bots: bot_count,
            winner: summary.winner,
            winner_kind,
            actions: step,
            final_stage,
            history_records,
            anomalies,
        },
        anomaly_records,
    }
}

fn empty_result(scenario: &Scenario, bots: usize, anomalies: Vec<String>) -> ScenarioResultLine {
    ScenarioResultLine {
        scenario: scenario.name.clone(),
        seed: scenario.seed,
        players: scenario.players,
        bots,
        winner: None,
        winner_kind: None,
        actions: 0,
        final_stage: 0,
        history_records: 0,
        anomalies,
    }
}

fn collect_game_anomalies(game: &Game) -> Vec<String> {
    let mut anomalies = Vec::new();
    let threshold = game.config.poison_to_lose;

    let winners = game
        .players()
        .iter()
        .filter(|player| player.phase() == Phase::Winner)
        .count();
    if winners > 1 {
        anomalies.push(format!("{winners} players hold the winner phase"));
    }

    for player in game.players() {
        if matches!(player.phase(), Phase::Draft | Phase::Build) && player.poison >= threshold {
            anomalies.push(format!(
                "{} keeps playing at lethal poison {}",
                player.name, player.poison
            ));
        }
        if player.treasures > game.config.max_treasures {
            anomalies.push(format!(
                "{} holds {} treasures over the cap",
                player.name, player.treasures
            ));
        }
    }

    let remaining = game.live_count();
    if game.ghost().is_some() && remaining % 2 == 0 {
        anomalies.push(format!("ghost present with {remaining} participants left"));
    }
    anomalies
}

fn collect_summary_anomalies(summary: &GameSummary, participants: usize) -> Vec<String> {
    let mut anomalies = Vec::new();
    let mut placements: Vec<u32> = summary
        .placements
        .iter()
        .map(|entry| entry.placement)
        .collect();
    placements.sort_unstable();
    let expected: Vec<u32> = (1..=participants as u32).collect();
    if placements != expected {
        anomalies.push(format!("placements {placements:?} are not 1..={participants}"));
    }
    if summary.winner.is_none() {
        anomalies.push("match ended without a winner".to_string());
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(now_ms));

    if cli.single || cli.players.is_some() || cli.bots.is_some() {
        let players = cli.players.unwrap_or(2).clamp(1, 16);
        let bots = cli.bots.unwrap_or(0).clamp(0, 15);
        return vec![Scenario {
            name: format!("custom-p{players}b{bots}"),
            players,
            bots,
            seed,
        }];
    }

    vec![
        Scenario {
            name: "duel-p2".to_string(),
            players: 2,
            bots: 0,
            seed,
        },
        Scenario {
            name: "odd-table-p5".to_string(),
            players: 5,
            bots: 0,
            seed: normalize_seed(seed as u64 + 1),
        },
        Scenario {
            name: "solo-vs-bots-p1b3".to_string(),
            players: 1,
            bots: 3,
            seed: normalize_seed(seed as u64 + 2),
        },
    ]
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    step: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        step,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn winner_kind_key(kind: Option<ParticipantKind>) -> String {
    match kind {
        Some(ParticipantKind::Human) => "human",
        Some(ParticipantKind::Bot) => "bot",
        Some(ParticipantKind::Ghost) => "ghost",
        None => "none",
    }
    .to_string()
}

fn build_run_summary(
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    winner_kinds: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_actions: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_actions = if scenario_count == 0 {
        0
    } else {
        total_actions / scenario_count as u64
    };
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_actions,
        winner_kinds,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    match_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    step: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        match_id: match_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        step,
        details,
    };
    if let Ok(line) = serde_json::to_string(&log_line) {
        eprintln!("{line}");
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
    std::fs::write(path, summary_text)
}
