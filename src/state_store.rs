use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;
use crate::types::{NameMap, Phase};

const STATE_FILE_VERSION: u8 = 1;

/// The persisted singleton describing the current (or last) event.
///
/// `penalty` and `stats` are carried for file compatibility only; nothing in
/// the event lifecycle reads or writes them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventState {
    pub phase: Phase,
    pub hunted: NameMap,
    pub hunters: NameMap,
    #[serde(rename = "lastHunted")]
    pub last_hunted: NameMap,
    pub penalty: BTreeMap<String, i32>,
    pub stats: BTreeMap<String, BTreeMap<String, BTreeMap<String, i32>>>,
}

impl EventState {
    /// `Idle` exactly when nobody is registered and no end time is set.
    pub fn is_consistent(&self) -> bool {
        let empty = self.hunted.is_empty() && self.hunters.is_empty();
        let disjoint = self.hunted.keys().all(|id| !self.hunters.contains_key(id));
        disjoint && (self.phase.is_idle() == empty)
    }
}

pub trait StateStore {
    fn load(&mut self) -> Result<Option<EventState>, StoreError>;
    fn save(&mut self, state: &EventState) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StateFile {
    version: u8,
    state: EventState,
}

#[derive(Clone, Debug, Deserialize)]
struct StateFileHeader {
    version: u8,
}

pub struct FileStateStore {
    file_path: PathBuf,
}

impl FileStateStore {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.file_path.clone(),
            source,
        }
    }

    fn json_error(&self, source: serde_json::Error) -> StoreError {
        StoreError::Json {
            path: self.file_path.clone(),
            source,
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&mut self) -> Result<Option<EventState>, StoreError> {
        let text = match fs::read_to_string(&self.file_path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(error)),
        };

        let header: StateFileHeader =
            serde_json::from_str(&text).map_err(|error| self.json_error(error))?;
        if header.version != STATE_FILE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: self.file_path.clone(),
                version: header.version,
            });
        }

        let parsed: StateFile =
            serde_json::from_str(&text).map_err(|error| self.json_error(error))?;
        if !parsed.state.is_consistent() {
            warn!(
                path = %self.file_path.display(),
                phase = parsed.state.phase.label(),
                "persisted event state violates phase invariants"
            );
        }
        Ok(Some(parsed.state))
    }

    fn save(&mut self, state: &EventState) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|error| self.io_error(error))?;
        }

        let payload = StateFile {
            version: STATE_FILE_VERSION,
            state: state.clone(),
        };
        let text = serde_json::to_string_pretty(&payload).map_err(|error| self.json_error(error))?;
        fs::write(&self.file_path, text).map_err(|error| self.io_error(error))
    }
}

/// Keeps the last written state in memory. Used by the simulator and tests;
/// `fail_writes` makes every save fail so the non-fatal path can be exercised.
#[derive(Clone, Debug, Default)]
pub struct MemoryStateStore {
    pub saved: Option<EventState>,
    pub writes: usize,
    pub fail_writes: bool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: EventState) -> Self {
        Self {
            saved: Some(state),
            ..Self::default()
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load(&mut self) -> Result<Option<EventState>, StoreError> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, state: &EventState) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Rejected);
        }
        self.saved = Some(state.clone());
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("manhunt-store-{}-{name}", std::process::id()))
            .join("manhunt.json")
    }

    fn sample_state() -> EventState {
        let mut state = EventState {
            phase: Phase::Active {
                end_time_ms: 1_700_000_000_000,
            },
            ..EventState::default()
        };
        state.hunted.insert("76561198000000001".into(), "Alice".into());
        state.hunters.insert("76561198000000002".into(), "Bob".into());
        state.last_hunted.insert("76561198000000003".into(), "Carol".into());
        state
    }

    #[test]
    fn file_store_round_trips_state() {
        let path = temp_path("roundtrip");
        let mut store = FileStateStore::new(path.clone());
        let state = sample_state();

        store.save(&state).expect("save should succeed");
        let loaded = store.load().expect("load should succeed");
        assert_eq!(loaded, Some(state));

        let _ = fs::remove_dir_all(path.parent().expect("parent dir"));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let mut store = FileStateStore::new(temp_path("missing"));
        assert!(matches!(store.load(), Ok(None)));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let path = temp_path("version");
        fs::create_dir_all(path.parent().expect("parent dir")).expect("mkdir");
        fs::write(&path, r#"{"version":9,"state":{}}"#).expect("write");

        let mut store = FileStateStore::new(path.clone());
        assert!(matches!(
            store.load(),
            Err(StoreError::UnsupportedVersion { version: 9, .. })
        ));

        let _ = fs::remove_dir_all(path.parent().expect("parent dir"));
    }

    #[test]
    fn legacy_fields_survive_a_round_trip() {
        let path = temp_path("legacy");
        fs::create_dir_all(path.parent().expect("parent dir")).expect("mkdir");
        fs::write(
            &path,
            r#"{"version":1,"state":{"phase":{"kind":"idle"},"penalty":{"p1":2},"stats":{"p1":{"kills":{"p2":1}}}}}"#,
        )
        .expect("write");

        let mut store = FileStateStore::new(path.clone());
        let loaded = store.load().expect("load").expect("state present");
        assert_eq!(loaded.penalty.get("p1"), Some(&2));
        assert_eq!(loaded.stats["p1"]["kills"]["p2"], 1);
        assert!(loaded.is_consistent());

        let _ = fs::remove_dir_all(path.parent().expect("parent dir"));
    }

    #[test]
    fn consistency_check_flags_mixed_roles_and_orphan_phase() {
        let mut state = sample_state();
        assert!(state.is_consistent());

        state.hunters.insert("76561198000000001".into(), "Alice".into());
        assert!(!state.is_consistent());

        let orphan = EventState {
            phase: Phase::Starting { started_at_ms: 1 },
            ..EventState::default()
        };
        assert!(!orphan.is_consistent());
    }

    #[test]
    fn memory_store_can_fail_writes() {
        let mut store = MemoryStateStore {
            fail_writes: true,
            ..MemoryStateStore::default()
        };
        assert!(matches!(
            store.save(&EventState::default()),
            Err(StoreError::Rejected)
        ));
        assert_eq!(store.writes, 0);
    }
}
