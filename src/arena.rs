//! In-memory game host.
//!
//! `Arena` implements every collaborator trait over plain maps and records
//! what the event asked of it as [`HostEvent`]s. The WebSocket server and
//! the simulator drive it; tests use it to observe the event core.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::HuntError;
use crate::host::{
    ClanService, CombatService, GameHost, Messenger, ParticipantDirectory, PrivilegeElevation,
    RewardService, Visualization, ZoneService,
};
use crate::lang::{Message, MessageKey};
use crate::overlay::{is_visible, BannerView, MarkerView, Overlay, OverlayOptions};
use crate::types::{Audience, Banner, MarkerId, Participant, ParticipantId, Vec3};

pub const FULL_HEALTH: f32 = 100.0;
pub const MIN_HEALTH: f32 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct ArenaPlayer {
    pub participant: Participant,
    pub language: &'static str,
    pub health: f32,
    pub hostile_ms: u64,
    pub elevated: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    Banner { audience: Audience, banner: Banner },
    ClearBanners { audience: Audience },
    Chat { audience: Audience, message: Message },
    Teleported { id: ParticipantId, to: Vec3 },
    MarkerPlaced { marker: MarkerId, position: Vec3 },
    MarkerRemoved { marker: MarkerId },
    Beacon {
        viewer: ParticipantId,
        position: Vec3,
        duration_ms: u64,
    },
    Hostile { id: ParticipantId, duration_ms: u64 },
    KillVetoed { id: ParticipantId },
    Credited { id: ParticipantId, amount: i64 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SafeZone {
    pub center: Vec3,
    pub radius: f32,
}

pub struct Arena {
    players: BTreeMap<ParticipantId, ArenaPlayer>,
    zones: Vec<SafeZone>,
    landmark: Option<Vec3>,
    highest_point: f32,
    terrain_height: f32,
    water_height: f32,
    surface_hit: Option<f32>,
    overlay: Overlay,
    clans: Option<BTreeMap<ParticipantId, String>>,
    ledger: Option<BTreeMap<ParticipantId, i64>>,
    reject_rewards: bool,
    events: Vec<HostEvent>,
    now_ms: u64,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        Self {
            players: BTreeMap::new(),
            zones: Vec::new(),
            landmark: None,
            highest_point: 50.0,
            terrain_height: 0.0,
            water_height: 0.0,
            surface_hit: None,
            overlay: Overlay::new(OverlayOptions::default()),
            clans: None,
            ledger: None,
            reject_rewards: false,
            events: Vec::new(),
            now_ms: 0,
        }
    }

    pub fn set_clock(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    /// Adds (or replaces) a connected participant at full health.
    pub fn connect(&mut self, id: &str, name: &str, position: Vec3) -> &mut ArenaPlayer {
        let player = ArenaPlayer {
            participant: Participant {
                id: id.to_string(),
                name: name.to_string(),
                position,
                team: None,
                admin: false,
                flying: false,
            },
            language: "en",
            health: FULL_HEALTH,
            hostile_ms: 0,
            elevated: false,
        };
        match self.players.entry(id.to_string()) {
            Entry::Vacant(slot) => slot.insert(player),
            Entry::Occupied(slot) => {
                let existing = slot.into_mut();
                *existing = player;
                existing
            }
        }
    }

    pub fn disconnect(&mut self, id: &str) -> Option<ArenaPlayer> {
        self.overlay.clear_banners(&Audience::One(id.to_string()));
        self.players.remove(id)
    }

    pub fn player(&self, id: &str) -> Option<&ArenaPlayer> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.players.get_mut(id).map(|player| &mut player.participant)
    }

    pub fn players(&self) -> impl Iterator<Item = &ArenaPlayer> {
        self.players.values()
    }

    pub fn set_position(&mut self, id: &str, position: Vec3) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.participant.position = position;
                true
            }
            None => false,
        }
    }

    pub fn set_language(&mut self, id: &str, language: &'static str) {
        if let Some(player) = self.players.get_mut(id) {
            player.language = language;
        }
    }

    /// Puts a dead participant back at full health.
    pub fn respawn(&mut self, id: &str, position: Vec3) {
        if let Some(player) = self.players.get_mut(id) {
            player.health = FULL_HEALTH;
            player.participant.position = position;
        }
    }

    pub fn set_landmark(&mut self, landmark: Option<Vec3>) {
        self.landmark = landmark;
    }

    pub fn add_safe_zone(&mut self, center: Vec3, radius: f32) {
        self.zones.push(SafeZone { center, radius });
    }

    pub fn set_ground(&mut self, terrain_height: f32, water_height: f32, surface_hit: Option<f32>) {
        self.terrain_height = terrain_height;
        self.water_height = water_height;
        self.surface_hit = surface_hit;
    }

    pub fn enable_clans(&mut self) {
        self.clans.get_or_insert_with(BTreeMap::new);
    }

    pub fn set_clan(&mut self, id: &str, clan: &str) {
        if let Some(clans) = self.clans.as_mut() {
            clans.insert(id.to_string(), clan.to_string());
        }
    }

    pub fn enable_rewards(&mut self) {
        self.ledger.get_or_insert_with(BTreeMap::new);
    }

    pub fn reject_rewards(&mut self) {
        self.reject_rewards = true;
    }

    pub fn points(&self, id: &str) -> i64 {
        self.ledger
            .as_ref()
            .and_then(|ledger| ledger.get(id).copied())
            .unwrap_or(0)
    }

    pub fn total_points(&self) -> i64 {
        self.ledger
            .as_ref()
            .map(|ledger| ledger.values().sum())
            .unwrap_or(0)
    }

    pub fn hostile_ms(&self, id: &str) -> Option<u64> {
        self.players.get(id).map(|player| player.hostile_ms)
    }

    pub fn health(&self, id: &str) -> Option<f32> {
        self.players.get(id).map(|player| player.health)
    }

    pub fn is_elevated(&self, id: &str) -> bool {
        self.players.get(id).is_some_and(|player| player.elevated)
    }

    /// Banners still on screen for `viewer`, for clients that connect late.
    pub fn live_banners_for(&mut self, viewer: &str) -> Vec<BannerView> {
        let admin = self
            .players
            .get(viewer)
            .is_some_and(|player| player.participant.admin);
        self.overlay.banners_for(viewer, admin, self.now_ms)
    }

    pub fn live_markers(&self) -> &[MarkerView] {
        self.overlay.markers()
    }

    pub fn events(&self) -> &[HostEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events)
    }

    /// Connected participants an audience reaches.
    pub fn recipients(&self, audience: &Audience) -> Vec<ParticipantId> {
        self.players
            .values()
            .filter(|player| is_visible(audience, &player.participant.id, player.participant.admin))
            .map(|player| player.participant.id.clone())
            .collect()
    }

    pub fn chat_count(&self, key: MessageKey) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, HostEvent::Chat { message, .. } if message.key == key))
            .count()
    }

    pub fn banner_count(&self, key: MessageKey) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, HostEvent::Banner { banner, .. } if banner.message.key == key))
            .count()
    }

    pub fn beacons_for(&self, viewer: &str) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, HostEvent::Beacon { viewer: id, .. } if id == viewer))
            .count()
    }

    fn player_or_err(&mut self, id: &str) -> Result<&mut ArenaPlayer, HuntError> {
        self.players
            .get_mut(id)
            .ok_or_else(|| HuntError::UnknownParticipant(id.to_string()))
    }
}

impl ParticipantDirectory for Arena {
    fn connected(&self) -> Vec<Participant> {
        self.players
            .values()
            .map(|player| player.participant.clone())
            .collect()
    }

    fn find(&self, id: &str) -> Option<Participant> {
        self.players.get(id).map(|player| player.participant.clone())
    }

    fn teleport(&mut self, id: &str, destination: Vec3) -> Result<(), HuntError> {
        self.player_or_err(id)?.participant.position = destination;
        self.events.push(HostEvent::Teleported {
            id: id.to_string(),
            to: destination,
        });
        Ok(())
    }
}

impl CombatService for Arena {
    fn set_hostile_for(&mut self, id: &str, duration_ms: u64) -> Result<(), HuntError> {
        self.player_or_err(id)?.hostile_ms = duration_ms;
        self.events.push(HostEvent::Hostile {
            id: id.to_string(),
            duration_ms,
        });
        Ok(())
    }

    fn veto_kill(&mut self, id: &str) -> Result<(), HuntError> {
        self.player_or_err(id)?.health = MIN_HEALTH;
        self.events.push(HostEvent::KillVetoed { id: id.to_string() });
        Ok(())
    }
}

impl ZoneService for Arena {
    fn in_protected_zone(&self, position: Vec3) -> bool {
        self.zones
            .iter()
            .any(|zone| zone.center.flat_distance(position) < zone.radius)
    }

    fn landmark(&self) -> Option<Vec3> {
        self.landmark
    }

    fn highest_point(&self) -> f32 {
        self.highest_point
    }

    fn raycast_down(&self, _origin: Vec3) -> Option<f32> {
        self.surface_hit
    }

    fn terrain_height(&self, _x: f32, _z: f32) -> f32 {
        self.terrain_height
    }

    fn water_height(&self, _x: f32, _z: f32) -> f32 {
        self.water_height
    }
}

impl Visualization for Arena {
    fn show_banner(&mut self, audience: &Audience, banner: Banner) {
        self.overlay.show_banner(audience, banner.clone(), self.now_ms);
        self.events.push(HostEvent::Banner {
            audience: audience.clone(),
            banner,
        });
    }

    fn clear_banners(&mut self, audience: &Audience) {
        self.overlay.clear_banners(audience);
        self.events.push(HostEvent::ClearBanners {
            audience: audience.clone(),
        });
    }

    fn place_marker(&mut self, position: Vec3) -> MarkerId {
        let marker = self.overlay.place_marker(position, self.now_ms);
        self.events.push(HostEvent::MarkerPlaced { marker, position });
        marker
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        if self.overlay.remove_marker(marker) {
            self.events.push(HostEvent::MarkerRemoved { marker });
        }
    }

    fn draw_beacon(&mut self, viewer: &str, position: Vec3, duration_ms: u64) -> Result<(), HuntError> {
        let player = self.player_or_err(viewer)?;
        if !(player.participant.admin || player.elevated) {
            return Err(HuntError::host("draw_beacon", "viewer lacks elevation"));
        }
        self.events.push(HostEvent::Beacon {
            viewer: viewer.to_string(),
            position,
            duration_ms,
        });
        Ok(())
    }
}

impl PrivilegeElevation for Arena {
    fn grant_elevation(&mut self, id: &str) -> Result<(), HuntError> {
        self.player_or_err(id)?.elevated = true;
        Ok(())
    }

    fn revoke_elevation(&mut self, id: &str) {
        if let Some(player) = self.players.get_mut(id) {
            player.elevated = false;
        }
    }

    fn is_temporarily_elevated(&self, id: &str) -> bool {
        self.is_elevated(id)
    }
}

impl Messenger for Arena {
    fn emit(&mut self, audience: &Audience, message: &Message) {
        self.events.push(HostEvent::Chat {
            audience: audience.clone(),
            message: message.clone(),
        });
    }
}

impl ClanService for Arena {
    fn clan_of(&self, id: &str) -> Option<String> {
        self.clans.as_ref()?.get(id).cloned()
    }
}

impl RewardService for Arena {
    fn add_points(&mut self, id: &str, amount: i64) -> Result<(), HuntError> {
        if self.reject_rewards {
            return Err(HuntError::host("add_points", "ledger is read-only"));
        }
        let ledger = self
            .ledger
            .as_mut()
            .ok_or(HuntError::CollaboratorUnavailable("reward"))?;
        *ledger.entry(id.to_string()).or_insert(0) += amount;
        self.events.push(HostEvent::Credited {
            id: id.to_string(),
            amount,
        });
        Ok(())
    }
}

impl GameHost for Arena {
    fn clans(&self) -> Option<&dyn ClanService> {
        self.clans.as_ref().map(|_| self as &dyn ClanService)
    }

    fn rewards(&mut self) -> Option<&mut dyn RewardService> {
        if self.ledger.is_some() {
            Some(self as &mut dyn RewardService)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eject::{safe_eject, EjectOutcome};
    use crate::host::with_elevation;

    fn zoned_arena() -> Arena {
        let mut arena = Arena::new();
        arena.set_landmark(Some(Vec3::new(0.0, 0.0, 0.0)));
        arena.add_safe_zone(Vec3::new(0.0, 0.0, 0.0), 100.0);
        arena.set_ground(4.0, 2.0, None);
        arena
    }

    #[test]
    fn safe_eject_outside_zone_is_a_no_op() {
        let mut arena = zoned_arena();
        let outside = Vec3::new(500.0, 3.0, 500.0);
        arena.connect("p1", "Alice", outside);

        for _ in 0..2 {
            assert_eq!(safe_eject(&mut arena, "p1").expect("eject"), EjectOutcome::Outside);
        }
        assert_eq!(arena.find("p1").expect("connected").position, outside);
        assert!(arena.events().is_empty());
    }

    #[test]
    fn safe_eject_moves_out_and_is_then_idempotent() {
        let mut arena = zoned_arena();
        arena.connect("p1", "Alice", Vec3::new(0.0, 1.0, 10.0));

        let outcome = safe_eject(&mut arena, "p1").expect("eject");
        let EjectOutcome::Moved { to, .. } = outcome else {
            panic!("expected a move, got {outcome:?}");
        };
        assert!((to.z - 300.0).abs() < 1e-3);
        assert_eq!(to.y, 4.75);
        assert!(!arena.in_protected_zone(to));

        assert_eq!(safe_eject(&mut arena, "p1").expect("eject"), EjectOutcome::Outside);
        assert_eq!(arena.find("p1").expect("connected").position, to);
    }

    #[test]
    fn safe_eject_without_landmark_stays_put() {
        let mut arena = zoned_arena();
        arena.set_landmark(None);
        arena.connect("p1", "Alice", Vec3::new(5.0, 0.0, 5.0));
        assert_eq!(safe_eject(&mut arena, "p1").expect("eject"), EjectOutcome::NoLandmark);
    }

    #[test]
    fn beacon_needs_elevation() {
        let mut arena = Arena::new();
        let hunter = arena.connect("p1", "Alice", Vec3::default()).participant.clone();
        assert!(arena.draw_beacon("p1", Vec3::default(), 1_000).is_err());

        with_elevation(&mut arena, &hunter, |arena| {
            arena.draw_beacon("p1", Vec3::default(), 1_000)
        })
        .expect("elevated draw");
        assert_eq!(arena.beacons_for("p1"), 1);
        assert!(!arena.is_elevated("p1"));
    }

    #[test]
    fn optional_services_follow_configuration() {
        let mut arena = Arena::new();
        assert!(arena.clans().is_none());
        assert!(arena.rewards().is_none());

        arena.enable_rewards();
        arena
            .rewards()
            .expect("ledger enabled")
            .add_points("p1", 50)
            .expect("credit");
        assert_eq!(arena.points("p1"), 50);

        arena.reject_rewards();
        assert!(arena.add_points("p1", 50).is_err());
        assert_eq!(arena.total_points(), 50);
    }

    #[test]
    fn recipients_respect_audience() {
        let mut arena = Arena::new();
        arena.connect("p1", "Alice", Vec3::default());
        arena.connect("p2", "Bob", Vec3::default()).participant.admin = true;
        assert_eq!(arena.recipients(&Audience::Admins), vec!["p2".to_string()]);
        assert_eq!(
            arena.recipients(&Audience::AllExcept("p2".into())),
            vec!["p1".to_string()]
        );
        assert_eq!(arena.recipients(&Audience::All).len(), 2);
    }

    #[test]
    fn late_joiner_sees_live_banners_and_markers() {
        let mut arena = Arena::new();
        arena.set_clock(1_000);
        arena.show_banner(&Audience::All, Banner::warning(Message::new(MessageKey::NotifyStarted), 5_000));
        arena.show_banner(&Audience::Admins, Banner::winner(Message::new(MessageKey::NotifyStarted), 5_000));
        let marker = arena.place_marker(Vec3::new(10.0, 0.0, 10.0));

        arena.set_clock(2_000);
        arena.connect("p1", "Alice", Vec3::default());
        arena.connect("p2", "Bob", Vec3::default()).participant.admin = true;
        assert_eq!(arena.live_banners_for("p1").len(), 1);
        assert_eq!(arena.live_banners_for("p2").len(), 2);
        assert_eq!(arena.live_markers().len(), 1);
        assert_eq!(arena.live_markers()[0].id, marker);

        arena.set_clock(6_000);
        assert!(arena.live_banners_for("p2").is_empty());
    }
}
