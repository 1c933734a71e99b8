use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::lang::Message;

pub type ParticipantId = String;

/// id -> display name, ordered so persisted files and broadcasts are stable.
pub type NameMap = BTreeMap<ParticipantId, String>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn flat_distance(self, other: Vec3) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    pub fn parse_csv(raw: &str) -> Option<Self> {
        let mut parts = raw.split(',').map(|part| part.trim().parse::<f32>());
        let x = parts.next()?.ok()?;
        let y = parts.next()?.ok()?;
        let z = parts.next()?.ok()?;
        if parts.next().is_some() || !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return None;
        }
        Some(Self { x, y, z })
    }
}

/// A live participant as reported by the host's directory.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub position: Vec3,
    pub team: Option<String>,
    pub admin: bool,
    pub flying: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Starting {
        #[serde(rename = "startedAtMs")]
        started_at_ms: u64,
    },
    Active {
        #[serde(rename = "endTimeMs")]
        end_time_ms: u64,
    },
}

impl Phase {
    pub fn is_idle(self) -> bool {
        matches!(self, Phase::Idle)
    }

    pub fn is_running(self) -> bool {
        !self.is_idle()
    }

    pub fn end_time_ms(self) -> Option<u64> {
        match self {
            Phase::Active { end_time_ms } => Some(end_time_ms),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Starting { .. } => "starting",
            Phase::Active { .. } => "active",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    HuntedKilledByHunter,
    InterferedDeath,
    HuntedDisconnected,
    TimerExpired,
    AdminCommand,
    StaleRestart,
}

impl EndReason {
    pub fn label(self) -> &'static str {
        match self {
            EndReason::HuntedKilledByHunter => "hunted_killed_by_hunter",
            EndReason::InterferedDeath => "interfered_death",
            EndReason::HuntedDisconnected => "hunted_disconnected",
            EndReason::TimerExpired => "timer_expired",
            EndReason::AdminCommand => "admin_command",
            EndReason::StaleRestart => "stale_restart",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Audience {
    All,
    Admins,
    One(ParticipantId),
    AllExcept(ParticipantId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerStyle {
    Warning,
    Winner,
}

impl BannerStyle {
    pub fn rgba(self) -> &'static str {
        match self {
            BannerStyle::Warning => "0.65 0.18 0.20 0.80",
            BannerStyle::Winner => "0.86 0.71 0.22 0.90",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Banner {
    pub name: &'static str,
    pub message: Message,
    pub style: BannerStyle,
    #[serde(rename = "ttlMs")]
    pub ttl_ms: u64,
}

impl Banner {
    pub const NOTICE: &'static str = "manhunt.notice";
    pub const WINNER: &'static str = "manhunt.winner";

    pub fn warning(message: Message, ttl_ms: u64) -> Self {
        Self {
            name: Self::NOTICE,
            message,
            style: BannerStyle::Warning,
            ttl_ms,
        }
    }

    pub fn winner(message: Message, ttl_ms: u64) -> Self {
        Self {
            name: Self::WINNER,
            message,
            style: BannerStyle::Winner,
            ttl_ms,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MarkerId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountCategory {
    Air,
    Water,
    Car,
    Animal,
}

impl MountCategory {
    pub const ALL: [MountCategory; 4] = [
        MountCategory::Air,
        MountCategory::Water,
        MountCategory::Car,
        MountCategory::Animal,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "air" => Some(Self::Air),
            "water" => Some(Self::Water),
            "car" => Some(Self::Car),
            "animal" => Some(Self::Animal),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            MountCategory::Air => "air",
            MountCategory::Water => "water",
            MountCategory::Car => "car",
            MountCategory::Animal => "animal",
        }
    }

    /// Seat prefab short names that belong to this category.
    pub fn seats(self) -> &'static [&'static str] {
        match self {
            MountCategory::Air => &[
                "attackhelidriver",
                "attackheligunner",
                "transporthelicopilot",
                "transporthelipilot",
                "minihelipassenger",
                "miniheliseat",
            ],
            MountCategory::Water => &[
                "rhibdriver",
                "smallboatpassenger",
                "smallboatdriver",
                "tugboatdriver",
            ],
            MountCategory::Car => &["modularcardriverseat", "modularcarpassengerseatright"],
            MountCategory::Animal => &["saddletest"],
        }
    }

    pub fn of_seat(seat: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.seats().contains(&seat))
    }
}

/// Who was in the event at the moment it was finalized.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Roster {
    pub hunted: NameMap,
    pub hunters: NameMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_with_kind_tag() {
        let text = serde_json::to_string(&Phase::Active { end_time_ms: 42 })
            .expect("phase should serialize");
        assert_eq!(text, r#"{"kind":"active","endTimeMs":42}"#);
        let idle: Phase = serde_json::from_str(r#"{"kind":"idle"}"#).expect("idle should parse");
        assert_eq!(idle, Phase::Idle);
    }

    #[test]
    fn only_active_phase_has_end_time() {
        assert_eq!(Phase::Idle.end_time_ms(), None);
        assert_eq!(Phase::Starting { started_at_ms: 5 }.end_time_ms(), None);
        assert_eq!(Phase::Active { end_time_ms: 9 }.end_time_ms(), Some(9));
    }

    #[test]
    fn seat_lookup_maps_to_category() {
        assert_eq!(MountCategory::of_seat("rhibdriver"), Some(MountCategory::Water));
        assert_eq!(MountCategory::of_seat("saddletest"), Some(MountCategory::Animal));
        assert_eq!(MountCategory::of_seat("office_chair"), None);
    }

    #[test]
    fn vec3_csv_requires_three_finite_values() {
        assert_eq!(
            Vec3::parse_csv("1, 2.5,-3"),
            Some(Vec3::new(1.0, 2.5, -3.0))
        );
        assert_eq!(Vec3::parse_csv("1,2"), None);
        assert_eq!(Vec3::parse_csv("1,2,3,4"), None);
        assert_eq!(Vec3::parse_csv("1,NaN,3"), None);
    }
}
