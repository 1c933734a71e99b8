use rand::seq::IndexedRandom;
use rand::Rng;

use crate::config::SelectionPolicy;
use crate::constants::MIN_PARTICIPANTS;
use crate::error::HuntError;
use crate::types::{NameMap, Participant};

/// Picks exactly one hunted target from `connected`.
///
/// With `no_duplicates`, everyone in `last_hunted` is excluded first; when
/// that leaves nobody, the unfiltered pool is used instead.
pub fn select_hunted<'a, R: Rng + ?Sized>(
    connected: &'a [Participant],
    last_hunted: &NameMap,
    no_duplicates: bool,
    policy: SelectionPolicy,
    rng: &mut R,
) -> Result<&'a Participant, HuntError> {
    if connected.len() < MIN_PARTICIPANTS {
        return Err(HuntError::InsufficientParticipants {
            found: connected.len(),
            required: MIN_PARTICIPANTS,
        });
    }

    let mut pool: Vec<&Participant> = connected
        .iter()
        .filter(|participant| !no_duplicates || !last_hunted.contains_key(&participant.id))
        .collect();
    if pool.is_empty() {
        pool = connected.iter().collect();
    }

    match policy {
        SelectionPolicy::Random => pool.choose(rng).copied().ok_or(
            HuntError::InsufficientParticipants {
                found: 0,
                required: MIN_PARTICIPANTS,
            },
        ),
    }
}
