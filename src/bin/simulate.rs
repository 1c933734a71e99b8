use clap::Parser;
use manhunt_event_server::arena::{Arena, HostEvent};
use manhunt_event_server::commands::{run_chat_command, run_console_command, CommandOutcome};
use manhunt_event_server::config::HuntConfig;
use manhunt_event_server::constants::TICK_MS;
use manhunt_event_server::machine::{DeathVerdict, EventTimer, HuntEvent, StartOutcome};
use manhunt_event_server::state_store::MemoryStateStore;
use manhunt_event_server::types::{EndReason, Phase, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const ARENA_RADIUS: f32 = 600.0;
const SAFE_ZONE_RADIUS: f32 = 150.0;
const HUNTED_STEP: f32 = 1.5;
const HUNTER_STEP: f32 = 2.0;
const CATCH_RADIUS: f32 = 15.0;
/// Chance per tick, inside catch radius, that the hunted wins the fight.
const BOUNTY_CHANCE: f32 = 0.02;
const SIM_PRIZE: i64 = 100;

type SimEvent = HuntEvent<Arena, MemoryStateStore>;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    single: bool,
    #[arg(long)]
    bots: Option<i32>,
    #[arg(long)]
    minutes: Option<i32>,
    /// Chance per tick that a hunter in range kills the hunted.
    #[arg(long)]
    aggression: Option<f32>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    bots: usize,
    minutes: i32,
    aggression: f32,
    #[serde(rename = "leaveChance")]
    leave_chance: f64,
    seed: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    bots: usize,
    minutes: i32,
    reason: String,
    hunted: Option<String>,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    reveals: usize,
    beacons: usize,
    #[serde(rename = "bountyKills")]
    bounty_kills: usize,
    vetoes: usize,
    winners: Vec<String>,
    #[serde(rename = "pointsAwarded")]
    points_awarded: i64,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
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
    #[serde(rename = "averageDurationMs")]
    average_duration_ms: u64,
    #[serde(rename = "reasonCounts")]
    reason_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

/// Counters gathered from the arena's event log while a scenario runs.
#[derive(Default)]
struct Tally {
    reveals: usize,
    beacons: usize,
    bounty_kills: usize,
    vetoes: usize,
    winners: Vec<String>,
    points_awarded: i64,
    anomalies: Vec<String>,
    anomaly_records: Vec<AnomalyRecord>,
    anomaly_seen: HashSet<String>,
}

impl Tally {
    fn anomaly(&mut self, tick: u64, message: String) {
        push_anomaly(
            &mut self.anomalies,
            &mut self.anomaly_records,
            &mut self.anomaly_seen,
            tick,
            message,
        );
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_duration_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            bots = scenario.bots,
            minutes = scenario.minutes,
            aggression = scenario.aggression,
            leave_chance = scenario.leave_chance,
            "scenario started"
        );
        let scenario_run = run_scenario(&scenario);

        for anomaly in &scenario_run.anomaly_records {
            warn!(
                match_id = %match_id,
                scenario = %scenario.name,
                seed = scenario.seed,
                tick = anomaly.tick,
                message = %anomaly.message,
                "anomaly detected"
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_duration_ms += scenario_run.result.duration_ms;
        *reason_counts
            .entry(scenario_run.result.reason.clone())
            .or_insert(0) += 1;

        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            tick = scenario_run.finished_tick,
            reason = %scenario_run.result.reason,
            duration_ms = scenario_run.result.duration_ms,
            reveals = scenario_run.result.reveals,
            anomaly_count = scenario_run.anomaly_records.len(),
            "scenario finished"
        );

        if let Ok(line) = serde_json::to_string(&scenario_run.result) {
            println!("{line}");
        }
        scenario_results.push(scenario_run.result);
    }

    let run_finished_at_ms = now_ms();
    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        run_finished_at_ms,
        scenario_results.clone(),
        reason_counts,
        total_anomalies,
        total_duration_ms,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            error!(
                match_id = %match_id,
                path = %path.display(),
                %error,
                "summary write failed"
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    info!(
        match_id = %match_id,
        scenario_count = summary.scenario_count,
        anomaly_count = summary.anomaly_count,
        average_duration_ms = summary.average_duration_ms,
        reason_counts = ?summary.reason_counts,
        summary_out = summary_out_written.as_deref(),
        "run finished"
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn run_scenario(scenario: &Scenario) -> ScenarioRunResult {
    let mut rng = StdRng::seed_from_u64(scenario.seed as u64);
    let config = HuntConfig {
        event_minutes: scenario.minutes.max(1) as u32,
        warmup_seconds: 10.0,
        arm_delay_seconds: 5.0,
        hunted_notice_seconds: 2.0,
        prize: SIM_PRIZE,
        ..HuntConfig::default()
    };
    let deadline_ms = config.starting_deadline_ms(0) + 60_000;

    let mut arena = Arena::new();
    arena.enable_rewards();
    arena.set_landmark(Some(Vec3::default()));
    arena.add_safe_zone(Vec3::default(), SAFE_ZONE_RADIUS);
    let bot_ids: Vec<String> = (1..=scenario.bots).map(|idx| format!("bot_{idx}")).collect();
    for (idx, id) in bot_ids.iter().enumerate() {
        let position = random_position(&mut rng);
        arena.connect(id, &format!("Bot-{:02}", idx + 1), position);
    }
    let mut event: SimEvent =
        HuntEvent::new(config, arena, MemoryStateStore::new(), scenario.seed as u64);
    let mut tally = Tally::default();

    let mut now = 0u64;
    let mut tick = 0u64;
    let hunted = match run_console_command(&mut event, None, "mhunt start", now) {
        Ok(CommandOutcome::Start(StartOutcome::Started { hunted })) => Some(hunted),
        other => {
            tally.anomaly(tick, format!("event did not start: {other:?}"));
            None
        }
    };

    let mut reason: Option<EndReason> = None;
    if let Some(hunted) = hunted.as_deref() {
        for id in bot_ids.iter().filter(|id| id.as_str() != hunted) {
            if let Err(error) = run_chat_command(&mut event, id, &["join".to_string()], now) {
                tally.anomaly(tick, format!("{id} could not join: {error}"));
            }
        }

        let mut targets: HashMap<String, Vec3> = HashMap::new();
        while now < deadline_ms {
            now += TICK_MS;
            tick += 1;
            event.host_mut().set_clock(now);
            event.tick(now);
            absorb_events(&mut event, &mut tally, &mut targets);
            if event.phase().is_idle() {
                reason.get_or_insert(EndReason::TimerExpired);
                break;
            }

            move_bots(&mut event, &mut rng, hunted, &targets);
            if let Some(ended) = resolve_encounters(&mut event, &mut rng, scenario, hunted, now) {
                reason = Some(ended);
            } else if rng.random_bool(scenario.leave_chance) {
                event.on_disconnect(hunted, now);
                event.host_mut().disconnect(hunted);
                reason = Some(EndReason::HuntedDisconnected);
            }
            absorb_events(&mut event, &mut tally, &mut targets);

            for message in check_invariants(&event) {
                tally.anomaly(tick, message);
            }
            if reason.is_some() {
                break;
            }
        }

        if !event.phase().is_idle() {
            tally.anomaly(tick, format!("event still {} at deadline", event.phase().label()));
        }
    }

    // Let the UI teardown fire so the arena ends clean.
    event.tick(now + 60_000);
    absorb_events(&mut event, &mut tally, &mut HashMap::new());
    for message in check_invariants(&event) {
        tally.anomaly(tick, message);
    }

    let result = ScenarioResultLine {
        scenario: scenario.name.clone(),
        seed: scenario.seed,
        bots: scenario.bots,
        minutes: scenario.minutes,
        reason: reason
            .map(|reason| reason.label().to_string())
            .unwrap_or_else(|| "not_started".to_string()),
        hunted,
        duration_ms: now,
        reveals: tally.reveals,
        beacons: tally.beacons,
        bounty_kills: tally.bounty_kills,
        vetoes: tally.vetoes,
        winners: tally.winners,
        points_awarded: tally.points_awarded,
        anomalies: tally.anomalies,
    };
    ScenarioRunResult {
        result,
        anomaly_records: tally.anomaly_records,
        finished_tick: tick,
    }
}

fn absorb_events(event: &mut SimEvent, tally: &mut Tally, targets: &mut HashMap<String, Vec3>) {
    for host_event in event.host_mut().take_events() {
        match host_event {
            HostEvent::MarkerPlaced { .. } => tally.reveals += 1,
            HostEvent::Beacon {
                viewer, position, ..
            } => {
                tally.beacons += 1;
                targets.insert(viewer, position);
            }
            HostEvent::KillVetoed { .. } => tally.vetoes += 1,
            HostEvent::Credited { id, amount } => {
                tally.points_awarded += amount;
                tally.winners.push(id);
            }
            _ => {}
        }
    }
}

/// The hunted wanders; hunters head for the last position revealed to them.
fn move_bots(
    event: &mut SimEvent,
    rng: &mut StdRng,
    hunted: &str,
    targets: &HashMap<String, Vec3>,
) {
    let moves: Vec<(String, Vec3)> = event
        .host()
        .players()
        .map(|player| {
            let id = &player.participant.id;
            let from = player.participant.position;
            let to = match targets.get(id) {
                Some(target) if id != hunted => step_towards(from, *target, HUNTER_STEP),
                _ => {
                    let step = if id == hunted { HUNTED_STEP } else { HUNTER_STEP };
                    random_step(rng, from, step)
                }
            };
            (id.clone(), to)
        })
        .collect();
    for (id, position) in moves {
        event.host_mut().set_position(&id, position);
    }
}

fn resolve_encounters(
    event: &mut SimEvent,
    rng: &mut StdRng,
    scenario: &Scenario,
    hunted: &str,
    now: u64,
) -> Option<EndReason> {
    if !matches!(event.phase(), Phase::Active { .. }) {
        return None;
    }
    let hunted_at = event.host().player(hunted)?.participant.position;
    let in_range: Vec<String> = event
        .registry()
        .hunters()
        .keys()
        .filter(|id| {
            event
                .host()
                .player(id)
                .is_some_and(|player| player.participant.position.flat_distance(hunted_at) <= CATCH_RADIUS)
        })
        .cloned()
        .collect();

    for hunter in in_range {
        let roll = rng.random::<f32>();
        if roll < scenario.aggression {
            if let DeathVerdict::Ended(reason) = event.on_player_death(hunted, Some(&hunter), now) {
                return Some(reason);
            }
        } else if roll < scenario.aggression + BOUNTY_CHANCE
            && event.on_player_death(&hunter, Some(hunted), now) == DeathVerdict::BountyKill
        {
            let respawn_at = random_position(rng);
            event.host_mut().respawn(&hunter, respawn_at);
        }
    }
    None
}

fn check_invariants(event: &SimEvent) -> Vec<String> {
    let mut anomalies = Vec::new();
    let registry = event.registry();
    if registry
        .hunted()
        .keys()
        .any(|id| registry.hunters().contains_key(id))
    {
        anomalies.push("participant registered as both hunted and hunter".to_string());
    }

    match event.phase() {
        Phase::Idle => {
            if !registry.hunted().is_empty() || !registry.hunters().is_empty() {
                anomalies.push("idle event keeps registrations".to_string());
            }
            if event.live_markers() > 0 {
                anomalies.push("reveal markers left after wrapup".to_string());
            }
            if event
                .timers()
                .pending()
                .iter()
                .any(|timer| *timer != EventTimer::UiTeardown)
            {
                anomalies.push("phase timers pending while idle".to_string());
            }
        }
        Phase::Starting { .. } => {
            if registry.hunted().is_empty() {
                anomalies.push("starting event without hunted".to_string());
            }
            if event.timers().is_pending(EventTimer::Reveal) {
                anomalies.push("reveal scheduled before arming".to_string());
            }
        }
        Phase::Active { .. } => {
            if registry.hunted().is_empty() {
                anomalies.push("active event without hunted".to_string());
            }
            if !event.timers().is_pending(EventTimer::Reveal)
                || !event.timers().is_pending(EventTimer::ActiveExpiry)
            {
                anomalies.push("active event missing reveal or expiry timer".to_string());
            }
        }
    }
    anomalies
}

fn random_position(rng: &mut StdRng) -> Vec3 {
    let angle = rng.random_range(0.0..std::f32::consts::TAU);
    let distance = rng.random_range(SAFE_ZONE_RADIUS..ARENA_RADIUS);
    Vec3::new(angle.cos() * distance, 0.0, angle.sin() * distance)
}

fn random_step(rng: &mut StdRng, from: Vec3, step: f32) -> Vec3 {
    let angle = rng.random_range(0.0..std::f32::consts::TAU);
    clamp_to_arena(Vec3::new(
        from.x + angle.cos() * step,
        from.y,
        from.z + angle.sin() * step,
    ))
}

fn step_towards(from: Vec3, target: Vec3, step: f32) -> Vec3 {
    let distance = from.flat_distance(target);
    if distance <= step {
        return Vec3::new(target.x, from.y, target.z);
    }
    let ratio = step / distance;
    Vec3::new(
        from.x + (target.x - from.x) * ratio,
        from.y,
        from.z + (target.z - from.z) * ratio,
    )
}

fn clamp_to_arena(position: Vec3) -> Vec3 {
    let distance = position.flat_distance(Vec3::default());
    if distance <= ARENA_RADIUS {
        return position;
    }
    let ratio = ARENA_RADIUS / distance;
    Vec3::new(position.x * ratio, position.y, position.z * ratio)
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(now_ms));
    let aggression = cli.aggression.unwrap_or(0.05).clamp(0.0, 1.0);

    if cli.single || cli.bots.is_some() || cli.minutes.is_some() {
        let bots = clamp_i32(cli.bots.unwrap_or(4), 2, 64) as usize;
        return vec![Scenario {
            name: format!("custom-bots{bots}"),
            bots,
            minutes: clamp_i32(cli.minutes.unwrap_or(5), 1, 60),
            aggression,
            leave_chance: 0.0,
            seed,
        }];
    }

    vec![
        Scenario {
            name: "quick-hunt-bots3".to_string(),
            bots: 3,
            minutes: 3,
            aggression,
            leave_chance: 0.0,
            seed,
        },
        Scenario {
            name: "crowd-hunt-bots8".to_string(),
            bots: 8,
            minutes: 5,
            aggression,
            leave_chance: 0.0,
            seed: normalize_seed(seed as u64 + 1),
        },
        Scenario {
            name: "hunted-leaves-bots4".to_string(),
            bots: 4,
            minutes: 5,
            aggression: 0.0,
            leave_chance: 0.001,
            seed: normalize_seed(seed as u64 + 2),
        },
    ]
}

fn clamp_i32(value: i32, min: i32, max: i32) -> i32 {
    value.clamp(min, max)
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    reason_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_duration_ms: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_duration_ms = if scenario_count == 0 {
        0
    } else {
        total_duration_ms / scenario_count as u64
    };
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_duration_ms,
        reason_counts,
        scenarios,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scenario_result(reason: &str, duration_ms: u64) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            bots: 3,
            minutes: 1,
            reason: reason.to_string(),
            hunted: Some("bot_1".to_string()),
            duration_ms,
            reveals: 0,
            beacons: 0,
            bounty_kills: 0,
            vetoes: 0,
            winners: Vec::new(),
            points_awarded: 0,
            anomalies: Vec::new(),
        }
    }

    fn scenario(seed: u32) -> Scenario {
        Scenario {
            name: "test".to_string(),
            bots: 3,
            minutes: 1,
            aggression: 0.2,
            leave_chance: 0.0,
            seed,
        }
    }

    #[test]
    fn default_match_id_contains_seed_and_timestamp() {
        assert_eq!(default_match_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_calculates_average_duration() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![
                make_scenario_result("timer_expired", 60_000),
                make_scenario_result("hunted_killed_by_hunter", 90_000),
            ],
            BTreeMap::from([
                ("timer_expired".to_string(), 1usize),
                ("hunted_killed_by_hunter".to_string(), 1usize),
            ]),
            1,
            150_000,
        );
        assert_eq!(summary.average_duration_ms, 75_000);
        assert_eq!(summary.scenario_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("manhunt-missing-{}", now_ms()))
            .join("summary.json");
        let summary = build_run_summary(
            "sim-1-1".to_string(),
            1,
            2,
            vec![make_scenario_result("timer_expired", 60_000)],
            BTreeMap::from([("timer_expired".to_string(), 1usize)]),
            0,
            60_000,
        );
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn push_anomaly_keeps_records_and_deduplicates_summary_messages() {
        let mut anomalies = Vec::new();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        push_anomaly(&mut anomalies, &mut records, &mut seen, 10, "same anomaly".to_string());
        push_anomaly(&mut anomalies, &mut records, &mut seen, 11, "same anomaly".to_string());

        assert_eq!(anomalies.len(), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tick, 10);
        assert_eq!(records[1].tick, 11);
    }

    #[test]
    fn step_towards_never_overshoots() {
        let from = Vec3::new(0.0, 5.0, 0.0);
        assert_eq!(step_towards(from, Vec3::new(1.0, 0.0, 0.0), 2.0), Vec3::new(1.0, 5.0, 0.0));
        let moved = step_towards(from, Vec3::new(10.0, 0.0, 0.0), 2.0);
        assert!((moved.x - 2.0).abs() < 1e-4);
        assert_eq!(moved.y, 5.0);
    }

    #[test]
    fn scenario_is_deterministic_for_a_seed() {
        let first = run_scenario(&scenario(7));
        let second = run_scenario(&scenario(7));
        assert_eq!(first.result, second.result);
    }

    #[test]
    fn scenario_ends_cleanly() {
        let run = run_scenario(&scenario(3));
        assert_ne!(run.result.reason, "not_started");
        assert!(run.result.hunted.is_some());
        assert!(run.result.reveals > 0);
        assert!(run.result.anomalies.is_empty(), "{:?}", run.result.anomalies);
    }
}
