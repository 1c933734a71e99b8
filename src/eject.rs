//! Safe-eject: moving a participant out of a protected zone.
//!
//! The destination lies on the ray from the landmark through the
//! participant's position, a fixed distance from the landmark, dropped onto
//! whatever surface is below it.

use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{EJECT_DISTANCE, EJECT_PROBE_LIFT, EJECT_SURFACE_OFFSET};
use crate::error::HuntError;
use crate::host::{ParticipantDirectory, ZoneService};
use crate::types::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EjectOutcome {
    Outside,
    NoLandmark,
    Moved { from: Vec3, to: Vec3 },
}

/// Horizontal placement only; `y` is resolved by [`surface_height`].
pub fn eject_heading(position: Vec3, landmark: Vec3) -> (f32, f32) {
    let dx = position.x - landmark.x;
    let dz = position.z - landmark.z;
    let length = (dx * dx + dz * dz).sqrt();
    let (ux, uz) = if length > f32::EPSILON {
        (dx / length, dz / length)
    } else {
        (1.0, 0.0)
    };
    (
        landmark.x + ux * EJECT_DISTANCE,
        landmark.z + uz * EJECT_DISTANCE,
    )
}

/// Probes down from above the tallest point of the map; without a hit, the
/// higher of terrain and water wins so nobody lands under the sea.
pub fn surface_height<Z: ZoneService + ?Sized>(zones: &Z, x: f32, z: f32) -> f32 {
    let origin = Vec3::new(x, zones.highest_point() + EJECT_PROBE_LIFT, z);
    let ground = match zones.raycast_down(origin) {
        Some(hit) => hit,
        None => zones.terrain_height(x, z).max(zones.water_height(x, z)),
    };
    ground + EJECT_SURFACE_OFFSET
}

pub fn eject_destination<Z: ZoneService + ?Sized>(zones: &Z, position: Vec3, landmark: Vec3) -> Vec3 {
    let (x, z) = eject_heading(position, landmark);
    Vec3::new(x, surface_height(zones, x, z), z)
}

/// Relocates `id` if, and only if, they stand in a protected zone.
pub fn safe_eject<H>(host: &mut H, id: &str) -> Result<EjectOutcome, HuntError>
where
    H: ParticipantDirectory + ZoneService + ?Sized,
{
    let participant = host
        .find(id)
        .ok_or_else(|| HuntError::UnknownParticipant(id.to_string()))?;
    if !host.in_protected_zone(participant.position) {
        return Ok(EjectOutcome::Outside);
    }
    let Some(landmark) = host.landmark() else {
        warn!(participant = %id, "no eject landmark on this map");
        return Ok(EjectOutcome::NoLandmark);
    };

    let destination = eject_destination(host, participant.position, landmark);
    host.teleport(id, destination)?;
    debug!(
        participant = %id,
        x = destination.x,
        y = destination.y,
        z = destination.z,
        "ejected from protected zone"
    );
    Ok(EjectOutcome::Moved {
        from: participant.position,
        to: destination,
    })
}
