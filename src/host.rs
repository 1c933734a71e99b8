//! Capabilities the event core needs from the game server hosting it.
//!
//! Each concern is its own trait so hosts and test doubles can be composed;
//! [`GameHost`] bundles the required ones. Team/clan lookup and reward
//! crediting are optional: a host that lacks them returns `None` and the
//! dependent behavior is skipped.

use tracing::warn;

use crate::error::HuntError;
use crate::lang::Message;
use crate::types::{Audience, Banner, MarkerId, Participant, Vec3};

pub trait ParticipantDirectory {
    fn connected(&self) -> Vec<Participant>;
    fn find(&self, id: &str) -> Option<Participant>;
    /// Moves the participant and pushes the new position to every client.
    fn teleport(&mut self, id: &str, destination: Vec3) -> Result<(), HuntError>;

    fn has_permission(&self, id: &str, _permission: &str) -> bool {
        self.find(id).is_some_and(|participant| participant.admin)
    }
}

pub trait CombatService {
    /// Forces the participant hostile for `duration_ms`; zero clears it.
    fn set_hostile_for(&mut self, id: &str, duration_ms: u64) -> Result<(), HuntError>;
    /// Cancels a pending kill, leaving the participant alive at minimal health.
    fn veto_kill(&mut self, id: &str) -> Result<(), HuntError>;
}

pub trait ZoneService {
    fn in_protected_zone(&self, position: Vec3) -> bool;
    /// Reference point eject vectors are measured from. `None` when the map
    /// has no such landmark.
    fn landmark(&self) -> Option<Vec3>;
    fn highest_point(&self) -> f32;
    /// Height of the first surface hit straight below `origin`.
    fn raycast_down(&self, origin: Vec3) -> Option<f32>;
    fn terrain_height(&self, x: f32, z: f32) -> f32;
    fn water_height(&self, x: f32, z: f32) -> f32;
}

pub trait Visualization {
    fn show_banner(&mut self, audience: &Audience, banner: Banner);
    fn clear_banners(&mut self, audience: &Audience);
    fn place_marker(&mut self, position: Vec3) -> MarkerId;
    fn remove_marker(&mut self, marker: MarkerId);
    /// Draws a reveal glyph visible only to `viewer`. Needs elevation.
    fn draw_beacon(&mut self, viewer: &str, position: Vec3, duration_ms: u64)
        -> Result<(), HuntError>;
}

pub trait PrivilegeElevation {
    fn grant_elevation(&mut self, id: &str) -> Result<(), HuntError>;
    fn revoke_elevation(&mut self, id: &str);
    fn is_temporarily_elevated(&self, id: &str) -> bool;
}

pub trait Messenger {
    fn emit(&mut self, audience: &Audience, message: &Message);
}

pub trait ClanService {
    fn clan_of(&self, id: &str) -> Option<String>;
}

pub trait RewardService {
    fn add_points(&mut self, id: &str, amount: i64) -> Result<(), HuntError>;
}

pub trait GameHost:
    ParticipantDirectory + CombatService + ZoneService + Visualization + PrivilegeElevation + Messenger
{
    fn clans(&self) -> Option<&dyn ClanService> {
        None
    }

    fn rewards(&mut self) -> Option<&mut dyn RewardService> {
        None
    }
}

/// Temporary elevation held for one action. Revoked on drop, so an early
/// return or a failed action cannot leak it. Admins already hold the rights
/// and are never granted or revoked.
pub struct ElevatedScope<'a, H: PrivilegeElevation + ?Sized> {
    host: &'a mut H,
    participant: String,
    granted: bool,
}

impl<'a, H: PrivilegeElevation + ?Sized> ElevatedScope<'a, H> {
    pub fn acquire(host: &'a mut H, participant: &Participant) -> Result<Self, HuntError> {
        if participant.flying && !participant.admin {
            warn!(participant = %participant.id, "refusing elevation while flying");
            return Err(HuntError::ElevationRefused(participant.id.clone()));
        }

        let granted = !participant.admin;
        if granted {
            host.grant_elevation(&participant.id)?;
        }
        Ok(Self {
            host,
            participant: participant.id.clone(),
            granted,
        })
    }

    pub fn host(&mut self) -> &mut H {
        self.host
    }
}

impl<H: PrivilegeElevation + ?Sized> Drop for ElevatedScope<'_, H> {
    fn drop(&mut self) {
        if self.granted {
            self.host.revoke_elevation(&self.participant);
        }
    }
}

pub fn with_elevation<H, T, F>(host: &mut H, participant: &Participant, action: F) -> Result<T, HuntError>
where
    H: PrivilegeElevation + ?Sized,
    F: FnOnce(&mut H) -> Result<T, HuntError>,
{
    let mut scope = ElevatedScope::acquire(host, participant)?;
    action(scope.host())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Grants {
        elevated: Vec<String>,
        grants: usize,
        revokes: usize,
    }

    impl PrivilegeElevation for Grants {
        fn grant_elevation(&mut self, id: &str) -> Result<(), HuntError> {
            self.grants += 1;
            self.elevated.push(id.to_string());
            Ok(())
        }

        fn revoke_elevation(&mut self, id: &str) {
            self.revokes += 1;
            self.elevated.retain(|held| held != id);
        }

        fn is_temporarily_elevated(&self, id: &str) -> bool {
            self.elevated.iter().any(|held| held == id)
        }
    }

    fn participant(admin: bool, flying: bool) -> Participant {
        Participant {
            id: "p1".into(),
            name: "Alice".into(),
            position: Vec3::default(),
            team: None,
            admin,
            flying,
        }
    }

    #[test]
    fn elevation_is_released_when_action_fails() {
        let mut grants = Grants::default();
        let result: Result<(), HuntError> = with_elevation(&mut grants, &participant(false, false), |host| {
            assert!(host.is_temporarily_elevated("p1"));
            Err(HuntError::host("draw", "viewer left"))
        });
        assert!(result.is_err());
        assert!(!grants.is_temporarily_elevated("p1"));
        assert_eq!((grants.grants, grants.revokes), (1, 1));
    }

    #[test]
    fn admins_are_never_granted_or_revoked() {
        let mut grants = Grants::default();
        let value = with_elevation(&mut grants, &participant(true, true), |_| Ok(7))
            .expect("admin may act while flying");
        assert_eq!(value, 7);
        assert_eq!((grants.grants, grants.revokes), (0, 0));
    }

    #[test]
    fn flying_non_admin_is_refused() {
        let mut grants = Grants::default();
        let refused = matches!(
            ElevatedScope::acquire(&mut grants, &participant(false, true)),
            Err(HuntError::ElevationRefused(_))
        );
        assert!(refused);
        assert_eq!(grants.grants, 0);
    }
}
