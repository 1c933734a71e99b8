//! Event configuration, read once at startup and immutable afterwards.
//!
//! The on-disk format keeps the long human-readable keys operators already
//! edit (`"Event Run Time (Minutes)"` and friends). Loading never fails: a
//! malformed file is logged and replaced by defaults, and the normalized
//! result is written back so every key is visible.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{
    minutes_to_ms, seconds_to_ms, DEFAULT_ARM_DELAY_SECONDS, DEFAULT_BANNER_SECONDS,
    DEFAULT_EVENT_MINUTES, DEFAULT_HUNTED_NOTICE_SECONDS, DEFAULT_MARKER_LIFETIME_SECONDS,
    DEFAULT_REVEAL_INTERVAL_SECONDS, DEFAULT_WARMUP_SECONDS, MAX_DURATION_SECONDS,
};
use crate::error::HuntError;
use crate::types::MountCategory;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionPolicy {
    Random,
}

impl SelectionPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "random" => Some(Self::Random),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            SelectionPolicy::Random => "random",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuntConfig {
    #[serde(rename = "Enabled")]
    pub enabled: bool,
    #[serde(rename = "Event Run Time (Minutes)")]
    pub event_minutes: u32,
    #[serde(rename = "Player Selection")]
    pub player_selection: String,
    #[serde(rename = "Hunted Warmup Time (Seconds)")]
    pub warmup_seconds: f32,
    #[serde(rename = "No Duplicates")]
    pub no_duplicates: bool,
    #[serde(rename = "No Friendly Kills")]
    pub no_friendly_kills: bool,
    #[serde(rename = "No Animals")]
    pub no_animals: bool,
    #[serde(rename = "Disable Vehicles")]
    pub disable_vehicles: Vec<String>,
    #[serde(rename = "Prize Amount (Server Rewards)")]
    pub prize: i64,
    #[serde(rename = "Arm Delay (Seconds)")]
    pub arm_delay_seconds: f32,
    #[serde(rename = "Hunted Notice Delay (Seconds)")]
    pub hunted_notice_seconds: f32,
    #[serde(rename = "Reveal Interval (Seconds)")]
    pub reveal_interval_seconds: f32,
    #[serde(rename = "Reveal Marker Lifetime (Seconds)")]
    pub marker_lifetime_seconds: f32,
    #[serde(rename = "Banner Duration (Seconds)")]
    pub banner_seconds: f32,
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_minutes: DEFAULT_EVENT_MINUTES,
            player_selection: SelectionPolicy::Random.key().to_string(),
            warmup_seconds: DEFAULT_WARMUP_SECONDS,
            no_duplicates: true,
            no_friendly_kills: true,
            no_animals: true,
            disable_vehicles: MountCategory::ALL
                .iter()
                .map(|category| category.key().to_string())
                .collect(),
            prize: 0,
            arm_delay_seconds: DEFAULT_ARM_DELAY_SECONDS,
            hunted_notice_seconds: DEFAULT_HUNTED_NOTICE_SECONDS,
            reveal_interval_seconds: DEFAULT_REVEAL_INTERVAL_SECONDS,
            marker_lifetime_seconds: DEFAULT_MARKER_LIFETIME_SECONDS,
            banner_seconds: DEFAULT_BANNER_SECONDS,
        }
    }
}

impl HuntConfig {
    /// Reads the file at `path`, falling back to defaults when it is missing
    /// or malformed, then writes the normalized configuration back.
    pub fn load_or_default(path: &Path) -> Self {
        let config = match fs::read_to_string(path) {
            Ok(text) => match Self::from_json(&text) {
                Ok(config) => config,
                Err(error) => {
                    warn!(path = %path.display(), %error, "falling back to default config");
                    Self::default()
                }
            },
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), %error, "failed to read config");
                }
                Self::default()
            }
        };

        if let Err(error) = config.save(path) {
            warn!(path = %path.display(), %error, "failed to write config");
        }
        info!(
            enabled = config.enabled,
            event_minutes = config.event_minutes,
            selection = config.selection_policy().key(),
            warmup_seconds = config.warmup_seconds,
            "manhunt config loaded"
        );
        config
    }

    pub fn from_json(text: &str) -> Result<Self, HuntError> {
        let mut config: Self =
            serde_json::from_str(text).map_err(|error| HuntError::ConfigInvalid(error.to_string()))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, text)
    }

    fn normalize(&mut self) {
        if SelectionPolicy::parse(&self.player_selection).is_none() {
            warn!(
                policy = %self.player_selection,
                "unknown player selection policy, using random"
            );
            self.player_selection = SelectionPolicy::Random.key().to_string();
        }

        self.disable_vehicles.retain(|raw| {
            let known = MountCategory::parse(raw).is_some();
            if !known {
                warn!(category = %raw, "ignoring unknown vehicle category");
            }
            known
        });

        for (key, seconds) in [
            ("warmup", &mut self.warmup_seconds),
            ("arm_delay", &mut self.arm_delay_seconds),
            ("hunted_notice", &mut self.hunted_notice_seconds),
            ("reveal_interval", &mut self.reveal_interval_seconds),
            ("marker_lifetime", &mut self.marker_lifetime_seconds),
            ("banner", &mut self.banner_seconds),
        ] {
            if *seconds > MAX_DURATION_SECONDS {
                warn!(key, seconds = *seconds, max = MAX_DURATION_SECONDS, "clamping duration");
                *seconds = MAX_DURATION_SECONDS;
            }
        }
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy::parse(&self.player_selection).unwrap_or(SelectionPolicy::Random)
    }

    pub fn disabled_mounts(&self) -> Vec<MountCategory> {
        let mut categories: Vec<MountCategory> = self
            .disable_vehicles
            .iter()
            .filter_map(|raw| MountCategory::parse(raw))
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    pub fn event_duration_ms(&self) -> u64 {
        minutes_to_ms(self.event_minutes)
    }

    pub fn warmup_ms(&self) -> u64 {
        seconds_to_ms(self.warmup_seconds)
    }

    pub fn arm_delay_ms(&self) -> u64 {
        seconds_to_ms(self.arm_delay_seconds)
    }

    pub fn hunted_notice_ms(&self) -> u64 {
        seconds_to_ms(self.hunted_notice_seconds)
    }

    /// Never zero: a repeating timer with no interval would spin.
    pub fn reveal_interval_ms(&self) -> u64 {
        seconds_to_ms(self.reveal_interval_seconds).max(1_000)
    }

    pub fn marker_lifetime_ms(&self) -> u64 {
        seconds_to_ms(self.marker_lifetime_seconds)
    }

    pub fn banner_ms(&self) -> u64 {
        seconds_to_ms(self.banner_seconds)
    }

    /// Latest moment an event that entered warmup at `started_at_ms` could
    /// still legitimately be running.
    pub fn starting_deadline_ms(&self, started_at_ms: u64) -> u64 {
        started_at_ms
            .saturating_add(self.warmup_ms())
            .saturating_add(self.arm_delay_ms())
            .saturating_add(self.event_duration_ms())
    }
}
