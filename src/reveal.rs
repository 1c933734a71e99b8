//! One reveal cycle: hunted positions are exposed to every hunter.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::HuntConfig;
use crate::eject::safe_eject;
use crate::host::{with_elevation, GameHost};
use crate::lang::{Message, MessageKey};
use crate::types::{Audience, Banner, MarkerId, NameMap, ParticipantId, Vec3};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RevealReport {
    pub positions: Vec<(ParticipantId, Vec3)>,
    pub markers: Vec<MarkerId>,
    pub beacons: usize,
}

/// Runs a single cycle. Markers it places are returned so the caller can
/// remove them once their lifetime is over. Individual failures (a hunter
/// who left mid-cycle, a refused elevation) are logged and skipped.
pub fn run_reveal_cycle<H: GameHost + ?Sized>(
    host: &mut H,
    hunted: &NameMap,
    hunters: &NameMap,
    config: &HuntConfig,
) -> RevealReport {
    let mut report = RevealReport::default();
    let next_in_seconds = config.reveal_interval_ms() / 1_000;
    let next_reveal = Message::with_args(MessageKey::ChatNextReveal, [next_in_seconds]);

    for id in hunted.keys() {
        if let Err(error) = safe_eject(host, id) {
            warn!(participant = %id, %error, "safe-eject failed during reveal");
        }
        let Some(target) = host.find(id) else {
            debug!(participant = %id, "hunted not connected, nothing to reveal");
            continue;
        };

        report.positions.push((target.id.clone(), target.position));
        report.markers.push(host.place_marker(target.position));

        let audience = Audience::One(target.id.clone());
        host.show_banner(
            &audience,
            Banner::warning(Message::new(MessageKey::NotifyHuntedReveal), config.banner_ms()),
        );
        host.emit(&audience, &next_reveal);
    }

    for id in hunters.keys() {
        let Some(hunter) = host.find(id) else {
            continue;
        };

        for (_, position) in &report.positions {
            let drawn = with_elevation(host, &hunter, |host| {
                host.draw_beacon(&hunter.id, *position, config.marker_lifetime_ms())
            });
            match drawn {
                Ok(()) => report.beacons += 1,
                Err(error) => warn!(hunter = %hunter.id, %error, "reveal beacon not drawn"),
            }
        }

        let audience = Audience::One(hunter.id.clone());
        host.show_banner(
            &audience,
            Banner::warning(Message::new(MessageKey::NotifyHunterReveal), config.banner_ms()),
        );
        host.emit(&audience, &next_reveal);
    }

    debug!(
        targets = report.positions.len(),
        beacons = report.beacons,
        "reveal cycle complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Arena, HostEvent};

    fn names(ids: &[&str]) -> NameMap {
        ids.iter()
            .map(|id| (id.to_string(), id.to_uppercase()))
            .collect()
    }

    fn arena() -> Arena {
        let mut arena = Arena::new();
        arena.connect("h1", "H1", Vec3::new(10.0, 0.0, 20.0));
        arena.connect("k1", "K1", Vec3::new(400.0, 0.0, 0.0));
        arena.connect("k2", "K2", Vec3::new(-400.0, 0.0, 0.0));
        arena
    }

    #[test]
    fn every_hunter_sees_every_hunted_position() {
        let mut arena = arena();
        let report = run_reveal_cycle(
            &mut arena,
            &names(&["h1"]),
            &names(&["k1", "k2"]),
            &HuntConfig::default(),
        );
        assert_eq!(report.positions, vec![("h1".to_string(), Vec3::new(10.0, 0.0, 20.0))]);
        assert_eq!(report.markers.len(), 1);
        assert_eq!(report.beacons, 2);
        assert_eq!(arena.beacons_for("k1"), 1);
        assert!(!arena.is_elevated("k1"));
        assert_eq!(arena.banner_count(MessageKey::NotifyHuntedReveal), 1);
        assert_eq!(arena.banner_count(MessageKey::NotifyHunterReveal), 2);
        assert_eq!(arena.chat_count(MessageKey::ChatNextReveal), 3);
    }

    #[test]
    fn next_reveal_message_carries_interval() {
        let mut arena = arena();
        let config = HuntConfig {
            reveal_interval_seconds: 45.0,
            ..HuntConfig::default()
        };
        run_reveal_cycle(&mut arena, &names(&["h1"]), &NameMap::new(), &config);
        let announced = arena.events().iter().find_map(|event| match event {
            HostEvent::Chat { message, .. } if message.key == MessageKey::ChatNextReveal => {
                Some(message.args.clone())
            }
            _ => None,
        });
        assert_eq!(announced, Some(vec!["45".to_string()]));
    }

    #[test]
    fn flying_hunter_is_skipped_but_still_notified() {
        let mut arena = arena();
        arena.player_mut("k1").expect("connected").flying = true;
        let report = run_reveal_cycle(
            &mut arena,
            &names(&["h1"]),
            &names(&["k1"]),
            &HuntConfig::default(),
        );
        assert_eq!(report.beacons, 0);
        assert_eq!(arena.banner_count(MessageKey::NotifyHunterReveal), 1);
    }

    #[test]
    fn disconnected_participants_are_skipped() {
        let mut arena = arena();
        let report = run_reveal_cycle(
            &mut arena,
            &names(&["gone"]),
            &names(&["k1", "also_gone"]),
            &HuntConfig::default(),
        );
        assert!(report.positions.is_empty());
        assert_eq!(report.beacons, 0);
        assert_eq!(arena.banner_count(MessageKey::NotifyHunterReveal), 1);
    }

    #[test]
    fn hunted_in_safe_zone_is_ejected_before_reveal() {
        let mut arena = arena();
        arena.set_landmark(Some(Vec3::default()));
        arena.add_safe_zone(Vec3::default(), 100.0);
        let report = run_reveal_cycle(
            &mut arena,
            &names(&["h1"]),
            &NameMap::new(),
            &HuntConfig::default(),
        );
        let (_, revealed) = report.positions[0];
        assert!(revealed.flat_distance(Vec3::default()) > 299.0);
    }
}
