//! Named deferred actions driven by the host's tick.
//!
//! At most one entry exists per name: scheduling under a name that is
//! already pending replaces (cancels) the old entry. Entries never run on
//! their own; the owner pops due entries one at a time from its tick, so an
//! entry canceled by an earlier action in the same tick never fires.

use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
struct Scheduled<A> {
    due_ms: u64,
    repeat_ms: Option<u64>,
    action: A,
}

#[derive(Clone, Debug)]
pub struct TimerSet<K: Ord + Copy, A: Clone> {
    entries: BTreeMap<K, Scheduled<A>>,
}

impl<K: Ord + Copy, A: Clone> Default for TimerSet<K, A> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy, A: Clone> TimerSet<K, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot entry firing `delay_ms` after `now_ms`. Replaces any pending
    /// entry under `name`. Returns true when an older entry was canceled.
    pub fn schedule(&mut self, name: K, now_ms: u64, delay_ms: u64, action: A) -> bool {
        self.insert(name, now_ms.saturating_add(delay_ms), None, action)
    }

    /// Repeating entry: first fires after `first_delay_ms`, then every
    /// `interval_ms` until canceled.
    pub fn schedule_repeating(
        &mut self,
        name: K,
        now_ms: u64,
        first_delay_ms: u64,
        interval_ms: u64,
        action: A,
    ) -> bool {
        self.insert(
            name,
            now_ms.saturating_add(first_delay_ms),
            Some(interval_ms.max(1)),
            action,
        )
    }

    pub fn cancel(&mut self, name: K) -> bool {
        self.entries.remove(&name).is_some()
    }

    pub fn cancel_all(&mut self) -> usize {
        let canceled = self.entries.len();
        self.entries.clear();
        canceled
    }

    pub fn is_pending(&self, name: K) -> bool {
        self.entries.contains_key(&name)
    }

    pub fn due_at(&self, name: K) -> Option<u64> {
        self.entries.get(&name).map(|entry| entry.due_ms)
    }

    pub fn pending(&self) -> Vec<K> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns the earliest entry due at `now_ms`. Repeating
    /// entries are re-armed one interval later (skipping missed intervals
    /// rather than firing a burst).
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(K, A)> {
        let name = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.due_ms <= now_ms)
            .min_by_key(|(_, entry)| entry.due_ms)
            .map(|(name, _)| *name)?;

        let entry = self.entries.remove(&name)?;
        if let Some(interval) = entry.repeat_ms {
            let mut next = entry.due_ms.saturating_add(interval);
            if next <= now_ms {
                next = now_ms.saturating_add(interval);
            }
            self.entries.insert(
                name,
                Scheduled {
                    due_ms: next,
                    repeat_ms: Some(interval),
                    action: entry.action.clone(),
                },
            );
        }
        Some((name, entry.action))
    }

    fn insert(&mut self, name: K, due_ms: u64, repeat_ms: Option<u64>, action: A) -> bool {
        self.entries
            .insert(
                name,
                Scheduled {
                    due_ms,
                    repeat_ms,
                    action,
                },
            )
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
    enum Name {
        Warmup,
        Reveal,
        Expiry,
    }

    fn drain(timers: &mut TimerSet<Name, &'static str>, now_ms: u64) -> Vec<&'static str> {
        let mut fired = Vec::new();
        while let Some((_, action)) = timers.pop_due(now_ms) {
            fired.push(action);
        }
        fired
    }

    #[test]
    fn one_shot_fires_once() {
        let mut timers = TimerSet::new();
        timers.schedule(Name::Warmup, 0, 1_000, "warmup");
        assert!(drain(&mut timers, 999).is_empty());
        assert_eq!(drain(&mut timers, 1_000), vec!["warmup"]);
        assert!(drain(&mut timers, 5_000).is_empty());
        assert!(timers.is_empty());
    }

    #[test]
    fn scheduling_same_name_replaces_pending_entry() {
        let mut timers = TimerSet::new();
        assert!(!timers.schedule(Name::Warmup, 0, 1_000, "first"));
        assert!(timers.schedule(Name::Warmup, 500, 1_000, "second"));
        assert_eq!(timers.len(), 1);
        assert!(drain(&mut timers, 1_000).is_empty());
        assert_eq!(drain(&mut timers, 1_500), vec!["second"]);
    }

    #[test]
    fn repeating_entry_rearms_until_canceled() {
        let mut timers = TimerSet::new();
        timers.schedule_repeating(Name::Reveal, 0, 0, 90_000, "reveal");
        assert_eq!(drain(&mut timers, 0), vec!["reveal"]);
        assert_eq!(timers.due_at(Name::Reveal), Some(90_000));
        assert_eq!(drain(&mut timers, 90_000), vec!["reveal"]);
        assert!(timers.cancel(Name::Reveal));
        assert!(drain(&mut timers, 500_000).is_empty());
    }

    #[test]
    fn late_tick_does_not_burst_repeats() {
        let mut timers = TimerSet::new();
        timers.schedule_repeating(Name::Reveal, 0, 100, 100, "reveal");
        assert_eq!(drain(&mut timers, 1_000), vec!["reveal"]);
        assert_eq!(timers.due_at(Name::Reveal), Some(1_100));
    }

    #[test]
    fn due_entries_pop_in_time_order() {
        let mut timers = TimerSet::new();
        timers.schedule(Name::Expiry, 0, 300, "expiry");
        timers.schedule(Name::Warmup, 0, 100, "warmup");
        timers.schedule(Name::Reveal, 0, 200, "reveal");
        assert_eq!(drain(&mut timers, 1_000), vec!["warmup", "reveal", "expiry"]);
    }

    #[test]
    fn cancel_all_between_pops_stops_remaining() {
        let mut timers = TimerSet::new();
        timers.schedule(Name::Warmup, 0, 100, "warmup");
        timers.schedule(Name::Expiry, 0, 200, "expiry");
        let first = timers.pop_due(1_000).map(|(name, _)| name);
        assert_eq!(first, Some(Name::Warmup));
        assert_eq!(timers.cancel_all(), 1);
        assert!(timers.pop_due(1_000).is_none());
    }
}
