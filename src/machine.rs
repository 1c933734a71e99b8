//! The event lifecycle: `Idle -> Starting -> Active -> Idle`.
//!
//! [`HuntEvent`] owns the configuration, the host, the registry and the
//! timer set. It is driven from outside by hooks (`request_start`,
//! `on_player_death`, `on_disconnect`, `join_hunt`, ...) and by `tick`,
//! which fires due timers. Every hook takes the current time explicitly;
//! nothing in here reads a clock.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::HuntConfig;
use crate::constants::UI_TEARDOWN_MS;
use crate::eject::safe_eject;
use crate::error::HuntError;
use crate::host::GameHost;
use crate::lang::{render, Message, MessageKey};
use crate::outcome::{resolve_outcome, Outcome};
use crate::registry::ParticipantRegistry;
use crate::reveal::run_reveal_cycle;
use crate::selection::select_hunted;
use crate::state_store::{EventState, StateStore};
use crate::timers::TimerSet;
use crate::types::{
    Audience, Banner, EndReason, MarkerId, MountCategory, NameMap, ParticipantId, Phase,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTimer {
    HuntedNotice,
    Warmup,
    ArmDelay,
    ActiveExpiry,
    Reveal,
    MarkerSweep,
    UiTeardown,
}

impl EventTimer {
    pub fn label(self) -> &'static str {
        match self {
            EventTimer::HuntedNotice => "hunted_notice",
            EventTimer::Warmup => "warmup",
            EventTimer::ArmDelay => "arm_delay",
            EventTimer::ActiveExpiry => "active_expiry",
            EventTimer::Reveal => "reveal",
            EventTimer::MarkerSweep => "marker_sweep",
            EventTimer::UiTeardown => "ui_teardown",
        }
    }
}

/// What a timer does when it fires. Phase-bound actions carry the phase
/// they were scheduled for and do nothing if the event has moved on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deferred {
    AnnounceHunted,
    WarmupOver { started_at_ms: u64 },
    Arm { started_at_ms: u64 },
    Expire { end_time_ms: u64 },
    Reveal,
    SweepMarkers,
    TeardownUi,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { hunted: ParticipantId },
    AlreadyRunning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum DeathVerdict {
    /// Not an event death; the host proceeds normally.
    Ignored,
    /// The kill is cancelled and the victim survives at minimal health.
    Vetoed,
    /// A hunted killed a hunter; announced, the event goes on.
    BountyKill,
    Ended(EndReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    Joined,
    NoActiveEvent,
    AlreadyParticipating,
    SameTeamAsHunted,
}

pub struct HuntEvent<H: GameHost, S: StateStore> {
    config: HuntConfig,
    host: H,
    registry: ParticipantRegistry<S>,
    timers: TimerSet<EventTimer, Deferred>,
    rng: StdRng,
    live_markers: Vec<(MarkerId, u64)>,
}

impl<H: GameHost, S: StateStore> HuntEvent<H, S> {
    /// Loads persisted state through `store`. Call [`HuntEvent::recover`]
    /// once the host is ready to re-arm timers for an interrupted event.
    pub fn new(config: HuntConfig, host: H, store: S, seed: u64) -> Self {
        Self {
            config,
            host,
            registry: ParticipantRegistry::open(store),
            timers: TimerSet::new(),
            rng: StdRng::seed_from_u64(seed),
            live_markers: Vec::new(),
        }
    }

    pub fn config(&self) -> &HuntConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn registry(&self) -> &ParticipantRegistry<S> {
        &self.registry
    }

    pub fn state(&self) -> &EventState {
        self.registry.state()
    }

    pub fn phase(&self) -> Phase {
        self.registry.phase()
    }

    pub fn timers(&self) -> &TimerSet<EventTimer, Deferred> {
        &self.timers
    }

    pub fn live_markers(&self) -> usize {
        self.live_markers.len()
    }

    /// Picks up a persisted event after a restart: a still-running event has
    /// its timers re-armed for the remaining time, a stale one is wrapped up.
    pub fn recover(&mut self, now_ms: u64) {
        let phase = self.registry.phase();
        let Some(deadline) = self.running_deadline(phase) else {
            return;
        };
        if now_ms >= deadline {
            info!(phase = phase.label(), "persisted event is stale, wrapping up");
            self.wrapup(EndReason::StaleRestart, None, now_ms);
            return;
        }

        match phase {
            Phase::Idle => {}
            Phase::Starting { started_at_ms } => {
                let warmup_end = started_at_ms.saturating_add(self.config.warmup_ms());
                if self.config.warmup_ms() > 0 && now_ms < warmup_end {
                    self.timers.schedule(
                        EventTimer::Warmup,
                        now_ms,
                        warmup_end - now_ms,
                        Deferred::WarmupOver { started_at_ms },
                    );
                } else {
                    let arm_at = if self.config.warmup_ms() == 0 {
                        started_at_ms
                    } else {
                        warmup_end.saturating_add(self.config.arm_delay_ms())
                    };
                    self.timers.schedule(
                        EventTimer::ArmDelay,
                        now_ms,
                        arm_at.saturating_sub(now_ms),
                        Deferred::Arm { started_at_ms },
                    );
                }
                info!(started_at_ms, "resumed warmup after restart");
            }
            Phase::Active { end_time_ms } => {
                self.timers.schedule(
                    EventTimer::ActiveExpiry,
                    now_ms,
                    end_time_ms - now_ms,
                    Deferred::Expire { end_time_ms },
                );
                self.timers.schedule_repeating(
                    EventTimer::Reveal,
                    now_ms,
                    0,
                    self.config.reveal_interval_ms(),
                    Deferred::Reveal,
                );
                info!(
                    remaining_ms = end_time_ms - now_ms,
                    "resumed active event after restart"
                );
            }
        }
    }

    pub fn request_start(&mut self, now_ms: u64) -> Result<StartOutcome, HuntError> {
        let phase = self.registry.phase();
        if let Some(deadline) = self.running_deadline(phase) {
            if now_ms < deadline {
                info!(
                    phase = phase.label(),
                    "{}",
                    render("en", &Message::new(MessageKey::AlreadyStarted))
                );
                return Ok(StartOutcome::AlreadyRunning);
            }
            info!(phase = phase.label(), "previous event is stale, restarting");
            self.wrapup(EndReason::StaleRestart, None, now_ms);
        }

        let connected = self.host.connected();
        let target = match select_hunted(
            &connected,
            self.registry.last_hunted(),
            self.config.no_duplicates,
            self.config.selection_policy(),
            &mut self.rng,
        ) {
            Ok(target) => target.clone(),
            Err(error) => {
                warn!(%error, "manhunt start skipped");
                return Err(error);
            }
        };

        self.timers.cancel_all();
        self.registry
            .begin_starting(now_ms, &target.id, &target.name)?;
        info!(hunted = %target.id, name = %target.name, "manhunt starting");

        self.banner(&Audience::All, Message::new(MessageKey::NotifySoonStart));
        self.host
            .emit(&Audience::All, &Message::new(MessageKey::ChatSoonStart));
        self.timers.schedule(
            EventTimer::HuntedNotice,
            now_ms,
            self.config.hunted_notice_ms(),
            Deferred::AnnounceHunted,
        );

        if self.config.warmup_ms() == 0 {
            self.warmup_over(now_ms, now_ms)?;
        } else {
            self.timers.schedule(
                EventTimer::Warmup,
                now_ms,
                self.config.warmup_ms(),
                Deferred::WarmupOver {
                    started_at_ms: now_ms,
                },
            );
        }

        Ok(StartOutcome::Started { hunted: target.id })
    }

    /// The single exit from `Starting`/`Active`. Returns `None` when there
    /// was nothing to end.
    pub fn wrapup(
        &mut self,
        reason: EndReason,
        relevant: Option<&str>,
        now_ms: u64,
    ) -> Option<Outcome> {
        if self.registry.phase().is_idle() {
            debug!(reason = reason.label(), "wrapup with no event running");
            return None;
        }

        let canceled = self.timers.cancel_all();
        let roster = self.registry.finish_event();
        for (marker, _) in self.live_markers.drain(..) {
            self.host.remove_marker(marker);
        }

        let outcome = resolve_outcome(reason, relevant, &roster);
        if let Some(notice) = outcome.notice {
            self.host.emit(&Audience::All, &Message::new(notice));
        }
        for (id, name) in &outcome.recipients {
            self.announce_winner(id, name);
        }

        for id in roster.hunted.keys() {
            if let Err(error) = self.host.set_hostile_for(id, 0) {
                debug!(participant = %id, %error, "could not clear hostility");
            }
        }
        self.host
            .emit(&Audience::All, &Message::new(MessageKey::ChatEventEnded));
        self.timers.schedule(
            EventTimer::UiTeardown,
            now_ms,
            UI_TEARDOWN_MS,
            Deferred::TeardownUi,
        );

        info!(
            reason = reason.label(),
            winners = outcome.recipients.len(),
            canceled_timers = canceled,
            "manhunt ended"
        );
        Some(outcome)
    }

    pub fn end_by_command(&mut self, now_ms: u64) -> Option<Outcome> {
        self.wrapup(EndReason::AdminCommand, None, now_ms)
    }

    pub fn on_player_death(
        &mut self,
        victim: &str,
        killer: Option<&str>,
        now_ms: u64,
    ) -> DeathVerdict {
        if self.registry.phase().is_idle() {
            return DeathVerdict::Ignored;
        }
        let killer = killer.filter(|killer| *killer != victim);

        if self.registry.is_hunted(victim) {
            if let Some(killer) = killer {
                if self.config.no_friendly_kills && self.same_team(victim, killer) {
                    if let Err(error) = self.host.veto_kill(victim) {
                        warn!(participant = %victim, %error, "friendly kill veto failed");
                    }
                    info!(victim = %victim, killer = %killer, "friendly kill on hunted vetoed");
                    return DeathVerdict::Vetoed;
                }
                if self.registry.is_hunter(killer) {
                    self.wrapup(EndReason::HuntedKilledByHunter, Some(killer), now_ms);
                    return DeathVerdict::Ended(EndReason::HuntedKilledByHunter);
                }
            }
            self.wrapup(EndReason::InterferedDeath, None, now_ms);
            return DeathVerdict::Ended(EndReason::InterferedDeath);
        }

        if self.registry.is_hunter(victim) && killer.is_some_and(|id| self.registry.is_hunted(id)) {
            let name = self
                .registry
                .hunters()
                .get(victim)
                .cloned()
                .unwrap_or_else(|| victim.to_string());
            self.host.emit(
                &Audience::All,
                &Message::with_args(MessageKey::HunterKilledByBounty, [name]),
            );
            return DeathVerdict::BountyKill;
        }

        DeathVerdict::Ignored
    }

    /// Only a hunted leaving ends the event; hunters keep their registration.
    pub fn on_disconnect(&mut self, id: &str, now_ms: u64) -> Option<Outcome> {
        if self.registry.phase().is_running() && self.registry.is_hunted(id) {
            return self.wrapup(EndReason::HuntedDisconnected, Some(id), now_ms);
        }
        None
    }

    pub fn join_hunt(&mut self, id: &str) -> Result<JoinOutcome, HuntError> {
        let audience = Audience::One(id.to_string());
        if self.registry.phase().is_idle() {
            self.host
                .emit(&audience, &Message::new(MessageKey::ChatNoActiveEvent));
            return Ok(JoinOutcome::NoActiveEvent);
        }
        if self.registry.is_registered(id) {
            return Ok(JoinOutcome::AlreadyParticipating);
        }
        let participant = self
            .host
            .find(id)
            .ok_or_else(|| HuntError::UnknownParticipant(id.to_string()))?;

        if self.config.no_friendly_kills && self.shares_clan_with_hunted(id) {
            self.host
                .emit(&audience, &Message::new(MessageKey::ChatNoHuntTeam));
            return Ok(JoinOutcome::SameTeamAsHunted);
        }

        self.registry.add_hunter(id, &participant.name)?;
        self.host
            .emit(&audience, &Message::new(MessageKey::ChatYouJoined));
        self.host.emit(
            &Audience::AllExcept(id.to_string()),
            &Message::with_args(MessageKey::ChatNewJoin, [participant.name.as_str()]),
        );
        info!(participant = %id, hunters = self.registry.hunters().len(), "hunter joined");
        Ok(JoinOutcome::Joined)
    }

    /// Hunted participants may not use seats of a disabled vehicle category.
    pub fn can_mount(&self, id: &str, seat: &str) -> bool {
        if self.registry.phase().is_idle() || !self.registry.is_hunted(id) {
            return true;
        }
        match MountCategory::of_seat(seat) {
            Some(category) => !self.config.disabled_mounts().contains(&category),
            None => true,
        }
    }

    pub fn can_animal_target(&self, id: &str) -> bool {
        !(self.registry.phase().is_running()
            && self.config.no_animals
            && self.registry.is_hunted(id))
    }

    /// Fires every timer due at `now_ms`. Returns how many fired.
    pub fn tick(&mut self, now_ms: u64) -> usize {
        let mut fired = 0;
        while let Some((timer, action)) = self.timers.pop_due(now_ms) {
            fired += 1;
            if let Err(error) = self.run_deferred(action, now_ms) {
                let failure = HuntError::DeferredActionFailure {
                    timer: timer.label(),
                    reason: error.to_string(),
                };
                warn!(error = %failure, "deferred action failed");
            }
        }
        fired
    }

    fn run_deferred(&mut self, action: Deferred, now_ms: u64) -> Result<(), HuntError> {
        match action {
            Deferred::AnnounceHunted => {
                if self.registry.phase().is_running() {
                    let hunted: Vec<ParticipantId> =
                        self.registry.hunted().keys().cloned().collect();
                    for id in hunted {
                        self.banner(&Audience::One(id), Message::new(MessageKey::NotifyHunted));
                    }
                }
                Ok(())
            }
            Deferred::WarmupOver { started_at_ms } => self.warmup_over(started_at_ms, now_ms),
            Deferred::Arm { started_at_ms } => self.arm(started_at_ms, now_ms),
            Deferred::Expire { end_time_ms } => {
                if self.registry.phase().end_time_ms() == Some(end_time_ms) {
                    self.wrapup(EndReason::TimerExpired, None, now_ms);
                }
                Ok(())
            }
            Deferred::Reveal => {
                self.reveal(now_ms);
                Ok(())
            }
            Deferred::SweepMarkers => {
                self.sweep_markers(now_ms);
                Ok(())
            }
            Deferred::TeardownUi => {
                self.host.clear_banners(&Audience::All);
                Ok(())
            }
        }
    }

    fn warmup_over(&mut self, started_at_ms: u64, now_ms: u64) -> Result<(), HuntError> {
        if self.registry.phase() != (Phase::Starting { started_at_ms }) {
            debug!(started_at_ms, "warmup timer outlived its event");
            return Ok(());
        }

        self.banner(&Audience::All, Message::new(MessageKey::NotifyStarted));
        self.host
            .emit(&Audience::All, &Message::new(MessageKey::ChatStarted));

        if self.config.warmup_ms() == 0 {
            return self.arm(started_at_ms, now_ms);
        }
        self.timers.schedule(
            EventTimer::ArmDelay,
            now_ms,
            self.config.arm_delay_ms(),
            Deferred::Arm { started_at_ms },
        );
        Ok(())
    }

    fn arm(&mut self, started_at_ms: u64, now_ms: u64) -> Result<(), HuntError> {
        if self.registry.phase() != (Phase::Starting { started_at_ms }) {
            debug!(started_at_ms, "arm timer outlived its event");
            return Ok(());
        }

        let duration = self.config.event_duration_ms();
        let end_time_ms = now_ms.saturating_add(duration);
        self.registry.activate(end_time_ms)?;
        self.timers.schedule(
            EventTimer::ActiveExpiry,
            now_ms,
            duration,
            Deferred::Expire { end_time_ms },
        );
        let interval = self.config.reveal_interval_ms();
        self.timers
            .schedule_repeating(EventTimer::Reveal, now_ms, interval, interval, Deferred::Reveal);

        let hunted: Vec<ParticipantId> = self.registry.hunted().keys().cloned().collect();
        for id in &hunted {
            if let Err(error) = self.host.set_hostile_for(id, duration) {
                warn!(participant = %id, %error, "could not mark hunted hostile");
            }
            if let Err(error) = safe_eject(&mut self.host, id) {
                warn!(participant = %id, %error, "safe-eject failed on arming");
            }
        }
        info!(end_time_ms, hunted = hunted.len(), "manhunt active");

        self.reveal(now_ms);
        Ok(())
    }

    fn reveal(&mut self, now_ms: u64) {
        if !matches!(self.registry.phase(), Phase::Active { .. }) {
            return;
        }
        let hunted = self.registry.hunted().clone();
        let hunters = self.registry.hunters().clone();
        let report = run_reveal_cycle(&mut self.host, &hunted, &hunters, &self.config);

        let expires_at = now_ms.saturating_add(self.config.marker_lifetime_ms());
        self.live_markers
            .extend(report.markers.iter().map(|marker| (*marker, expires_at)));
        self.schedule_marker_sweep(now_ms);
    }

    fn sweep_markers(&mut self, now_ms: u64) {
        let (expired, live): (Vec<_>, Vec<_>) = self
            .live_markers
            .drain(..)
            .partition(|(_, expires_at)| *expires_at <= now_ms);
        self.live_markers = live;
        for (marker, _) in expired {
            self.host.remove_marker(marker);
        }
        self.schedule_marker_sweep(now_ms);
    }

    fn schedule_marker_sweep(&mut self, now_ms: u64) {
        if let Some(next) = self.live_markers.iter().map(|(_, at)| *at).min() {
            self.timers.schedule(
                EventTimer::MarkerSweep,
                now_ms,
                next.saturating_sub(now_ms),
                Deferred::SweepMarkers,
            );
        }
    }

    fn announce_winner(&mut self, id: &str, name: &str) {
        self.host.clear_banners(&Audience::All);
        self.host.show_banner(
            &Audience::All,
            Banner::winner(
                Message::with_args(MessageKey::NotifyWinner, [name]),
                self.config.banner_ms(),
            ),
        );
        self.host.emit(
            &Audience::All,
            &Message::with_args(MessageKey::ChatWinner, [name]),
        );

        let prize = self.config.prize;
        if prize <= 0 {
            return;
        }
        let credited = match self.host.rewards() {
            Some(rewards) => rewards.add_points(id, prize),
            None => Err(HuntError::CollaboratorUnavailable("reward")),
        };
        match credited {
            Ok(()) => {
                info!(participant = %id, prize, "prize credited");
                self.host.emit(
                    &Audience::All,
                    &Message::with_args(MessageKey::ChatAwarded, [name.to_string(), prize.to_string()]),
                );
            }
            Err(HuntError::CollaboratorUnavailable(service)) => {
                debug!(participant = %id, service, "no reward service, prize skipped");
            }
            Err(error) => warn!(participant = %id, %error, "prize credit failed"),
        }
    }

    fn banner(&mut self, audience: &Audience, message: Message) {
        let banner = Banner::warning(message, self.config.banner_ms());
        self.host.show_banner(audience, banner);
    }

    /// Latest moment the event in `phase` may still legitimately run.
    fn running_deadline(&self, phase: Phase) -> Option<u64> {
        match phase {
            Phase::Idle => None,
            Phase::Starting { started_at_ms } => {
                Some(self.config.starting_deadline_ms(started_at_ms))
            }
            Phase::Active { end_time_ms } => Some(end_time_ms),
        }
    }

    fn same_team(&self, a: &str, b: &str) -> bool {
        let team_of = |id: &str| self.host.find(id).and_then(|participant| participant.team);
        if let (Some(left), Some(right)) = (team_of(a), team_of(b)) {
            if left == right {
                return true;
            }
        }
        self.same_clan(a, b)
    }

    fn same_clan(&self, a: &str, b: &str) -> bool {
        let Some(clans) = self.host.clans() else {
            return false;
        };
        match (clans.clan_of(a), clans.clan_of(b)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    /// Join only screens clans. Engine teammates of the hunted may still join,
    /// and the friendly-kill veto then blocks their kills.
    fn shares_clan_with_hunted(&self, id: &str) -> bool {
        let hunted: &NameMap = self.registry.hunted();
        hunted.keys().any(|target| self.same_clan(id, target))
    }
}
