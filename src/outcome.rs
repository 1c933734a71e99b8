use serde::Serialize;

use crate::lang::MessageKey;
use crate::types::{EndReason, ParticipantId, Roster};

/// Who gets credited for an event that just ended, and which public notice
/// (besides the usual "event ended") goes out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub recipients: Vec<(ParticipantId, String)>,
    pub notice: Option<MessageKey>,
}

impl Outcome {
    pub fn has_winner(&self) -> bool {
        !self.recipients.is_empty()
    }
}

/// `relevant` is the killer for [`EndReason::HuntedKilledByHunter`] and is
/// ignored otherwise. A killer missing from the hunters snapshot earns
/// nothing.
pub fn resolve_outcome(reason: EndReason, relevant: Option<&str>, roster: &Roster) -> Outcome {
    match reason {
        EndReason::HuntedKilledByHunter => Outcome {
            recipients: relevant
                .and_then(|killer| roster.hunters.get_key_value(killer))
                .map(|(id, name)| (id.clone(), name.clone()))
                .into_iter()
                .collect(),
            notice: None,
        },
        EndReason::TimerExpired => Outcome {
            recipients: roster
                .hunted
                .iter()
                .map(|(id, name)| (id.clone(), name.clone()))
                .collect(),
            notice: None,
        },
        EndReason::InterferedDeath => Outcome {
            recipients: Vec::new(),
            notice: Some(MessageKey::ChatOutsideForces),
        },
        EndReason::HuntedDisconnected => Outcome {
            recipients: Vec::new(),
            notice: Some(MessageKey::ChatHuntedDisconnected),
        },
        EndReason::AdminCommand | EndReason::StaleRestart => Outcome::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Roster {
        let mut roster = Roster::default();
        roster.hunted.insert("h1".into(), "Hana".into());
        roster.hunted.insert("h2".into(), "Hugo".into());
        roster.hunters.insert("k1".into(), "Kai".into());
        roster
    }

    #[test]
    fn hunter_kill_credits_exactly_the_killer() {
        let outcome = resolve_outcome(EndReason::HuntedKilledByHunter, Some("k1"), &roster());
        assert_eq!(outcome.recipients, vec![("k1".to_string(), "Kai".to_string())]);
    }

    #[test]
    fn unregistered_killer_earns_nothing() {
        let outcome = resolve_outcome(EndReason::HuntedKilledByHunter, Some("x9"), &roster());
        assert!(!outcome.has_winner());
    }

    #[test]
    fn expiry_credits_every_hunted() {
        let outcome = resolve_outcome(EndReason::TimerExpired, None, &roster());
        let ids: Vec<&str> = outcome.recipients.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["h1", "h2"]);
    }

    #[test]
    fn non_winning_reasons_credit_no_one() {
        for reason in [
            EndReason::AdminCommand,
            EndReason::StaleRestart,
            EndReason::InterferedDeath,
            EndReason::HuntedDisconnected,
        ] {
            assert!(!resolve_outcome(reason, Some("k1"), &roster()).has_winner());
        }
        assert_eq!(
            resolve_outcome(EndReason::InterferedDeath, None, &roster()).notice,
            Some(MessageKey::ChatOutsideForces)
        );
    }
}
