//! Participant registry: who is hunted, who hunts, who sat out last time.
//!
//! The registry owns the [`EventState`] and its [`StateStore`]. Every
//! mutation writes through before returning; a failed write is logged and
//! the in-memory state stays authoritative for the running process.

use tracing::{debug, warn};

use crate::error::HuntError;
use crate::state_store::{EventState, StateStore};
use crate::types::{NameMap, Phase, Roster};

pub struct ParticipantRegistry<S: StateStore> {
    state: EventState,
    store: S,
}

impl<S: StateStore> ParticipantRegistry<S> {
    /// Loads persisted state, defaulting when it is absent or unreadable.
    pub fn open(mut store: S) -> Self {
        let state = match store.load() {
            Ok(Some(state)) => state,
            Ok(None) => EventState::default(),
            Err(error) => {
                warn!(%error, "event state unreadable, starting from idle");
                EventState::default()
            }
        };
        Self { state, store }
    }

    pub fn state(&self) -> &EventState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn hunted(&self) -> &NameMap {
        &self.state.hunted
    }

    pub fn hunters(&self) -> &NameMap {
        &self.state.hunters
    }

    pub fn last_hunted(&self) -> &NameMap {
        &self.state.last_hunted
    }

    pub fn is_hunted(&self, id: &str) -> bool {
        self.state.hunted.contains_key(id)
    }

    pub fn is_hunter(&self, id: &str) -> bool {
        self.state.hunters.contains_key(id)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.is_hunted(id) || self.is_hunter(id)
    }

    pub fn add_hunted(&mut self, id: &str, name: &str) -> Result<(), HuntError> {
        self.ensure_joinable(id)?;
        self.state.hunted.insert(id.to_string(), name.to_string());
        self.persist();
        Ok(())
    }

    pub fn add_hunter(&mut self, id: &str, name: &str) -> Result<(), HuntError> {
        self.ensure_joinable(id)?;
        self.state.hunters.insert(id.to_string(), name.to_string());
        self.persist();
        Ok(())
    }

    /// Idle -> Starting with exactly one hunted target, as a single write.
    pub fn begin_starting(
        &mut self,
        started_at_ms: u64,
        hunted_id: &str,
        hunted_name: &str,
    ) -> Result<(), HuntError> {
        if self.state.phase.is_running() {
            return Err(HuntError::AlreadyInProgress);
        }
        self.state.hunted.clear();
        self.state.hunters.clear();
        self.state
            .hunted
            .insert(hunted_id.to_string(), hunted_name.to_string());
        self.state.phase = Phase::Starting { started_at_ms };
        self.persist();
        Ok(())
    }

    /// Starting -> Active. Also used to re-arm an Active event after restart.
    pub fn activate(&mut self, end_time_ms: u64) -> Result<(), HuntError> {
        if self.state.phase.is_idle() {
            return Err(HuntError::NoActiveEvent);
        }
        self.state.phase = Phase::Active { end_time_ms };
        self.persist();
        Ok(())
    }

    /// Back to Idle: the hunted set becomes the next exclusion list and both
    /// role sets are emptied, in one write. Returns who was registered.
    pub fn finish_event(&mut self) -> Roster {
        let roster = Roster {
            hunted: self.state.hunted.clone(),
            hunters: self.state.hunters.clone(),
        };
        self.state.phase = Phase::Idle;
        self.record_last_hunted(roster.hunted.clone());
        self.clear();
        self.persist();
        roster
    }

    fn record_last_hunted(&mut self, hunted: NameMap) {
        self.state.last_hunted = hunted;
    }

    fn clear(&mut self) {
        self.state.hunted.clear();
        self.state.hunters.clear();
    }

    fn ensure_joinable(&self, id: &str) -> Result<(), HuntError> {
        if self.state.phase.is_idle() {
            return Err(HuntError::NoActiveEvent);
        }
        if self.is_registered(id) {
            return Err(HuntError::DuplicateParticipant(id.to_string()));
        }
        Ok(())
    }

    fn persist(&mut self) {
        match self.store.save(&self.state) {
            Ok(()) => debug!(phase = self.state.phase.label(), "event state saved"),
            Err(error) => warn!(%error, "failed to persist event state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_store::MemoryStateStore;

    fn starting_registry() -> ParticipantRegistry<MemoryStateStore> {
        let mut registry = ParticipantRegistry::open(MemoryStateStore::new());
        registry
            .begin_starting(1_000, "p1", "Alice")
            .expect("idle registry should start");
        registry
    }

    #[test]
    fn open_restores_persisted_state() {
        let mut state = EventState {
            phase: Phase::Active { end_time_ms: 99 },
            ..EventState::default()
        };
        state.hunted.insert("p1".into(), "Alice".into());
        let registry = ParticipantRegistry::open(MemoryStateStore::with_state(state.clone()));
        assert_eq!(registry.state(), &state);
    }

    #[test]
    fn roles_are_mutually_exclusive() {
        let mut registry = starting_registry();
        assert!(matches!(
            registry.add_hunter("p1", "Alice"),
            Err(HuntError::DuplicateParticipant(_))
        ));
        registry.add_hunter("p2", "Bob").expect("new hunter");
        assert!(matches!(
            registry.add_hunted("p2", "Bob"),
            Err(HuntError::DuplicateParticipant(_))
        ));
        assert!(registry.is_hunted("p1"));
        assert!(registry.is_hunter("p2"));
        assert!(registry.state().is_consistent());
    }

    #[test]
    fn joining_requires_running_event() {
        let mut registry = ParticipantRegistry::open(MemoryStateStore::new());
        assert!(matches!(
            registry.add_hunter("p2", "Bob"),
            Err(HuntError::NoActiveEvent)
        ));
        assert!(registry.state().is_consistent());
    }

    #[test]
    fn every_mutation_writes_through() {
        let mut registry = starting_registry();
        assert_eq!(registry.store().writes, 1);
        registry.add_hunter("p2", "Bob").expect("hunter");
        registry.activate(5_000).expect("activate");
        registry.finish_event();
        assert_eq!(registry.store().writes, 4);
        assert_eq!(registry.store().saved.as_ref(), Some(registry.state()));
    }

    #[test]
    fn finish_replaces_last_hunted_wholesale() {
        let mut registry = starting_registry();
        registry.add_hunter("p2", "Bob").expect("hunter");
        let roster = registry.finish_event();

        assert_eq!(roster.hunted.len(), 1);
        assert_eq!(roster.hunters.len(), 1);
        assert_eq!(registry.phase(), Phase::Idle);
        assert!(registry.hunted().is_empty());
        assert!(registry.hunters().is_empty());
        assert_eq!(
            registry.last_hunted().keys().collect::<Vec<_>>(),
            vec!["p1"]
        );

        registry
            .begin_starting(2_000, "p3", "Carol")
            .expect("second event");
        registry.finish_event();
        assert_eq!(
            registry.last_hunted().keys().collect::<Vec<_>>(),
            vec!["p3"]
        );
    }

    #[test]
    fn failed_writes_keep_memory_authoritative() {
        let store = MemoryStateStore {
            fail_writes: true,
            ..MemoryStateStore::default()
        };
        let mut registry = ParticipantRegistry::open(store);
        registry
            .begin_starting(1_000, "p1", "Alice")
            .expect("start despite store failure");
        assert!(registry.is_hunted("p1"));
        assert!(registry.store().saved.is_none());
    }
}
