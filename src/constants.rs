pub const TICK_RATE: u32 = 4;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const ADMIN_PERMISSION: &str = "manhunt.admin";
pub const MIN_PARTICIPANTS: usize = 2;

pub const DEFAULT_EVENT_MINUTES: u32 = 15;
pub const DEFAULT_WARMUP_SECONDS: f32 = 90.0;
pub const DEFAULT_ARM_DELAY_SECONDS: f32 = 15.0;
pub const DEFAULT_HUNTED_NOTICE_SECONDS: f32 = 10.0;
pub const DEFAULT_REVEAL_INTERVAL_SECONDS: f32 = 90.0;
pub const DEFAULT_MARKER_LIFETIME_SECONDS: f32 = 30.0;
pub const DEFAULT_BANNER_SECONDS: f32 = 5.0;

/// Upper bound for any configured delay, interval or lifetime.
pub const MAX_DURATION_SECONDS: f32 = 86_400.0;

pub const UI_TEARDOWN_MS: u64 = 5_000;

pub const EJECT_DISTANCE: f32 = 300.0;
pub const EJECT_PROBE_LIFT: f32 = 250.0;
pub const EJECT_SURFACE_OFFSET: f32 = 0.75;

pub const REVEAL_GLYPH: &str = "⊕";
pub const REVEAL_GLYPH_COLOR: &str = "#229954";

pub fn seconds_to_ms(seconds: f32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds as f64 * 1000.0).round() as u64
}

pub fn minutes_to_ms(minutes: u32) -> u64 {
    u64::from(minutes) * 60_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_to_ms_clamps_invalid_values() {
        assert_eq!(seconds_to_ms(1.5), 1_500);
        assert_eq!(seconds_to_ms(0.0), 0);
        assert_eq!(seconds_to_ms(-3.0), 0);
        assert_eq!(seconds_to_ms(f32::NAN), 0);
    }

    #[test]
    fn minutes_to_ms_scales() {
        assert_eq!(minutes_to_ms(15), 900_000);
    }
}
