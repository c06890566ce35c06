use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BridgeResult;
use crate::proposal::{BridgeParams, ProposalFields};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Setup,
    Submit,
}

/// What phase 1 hands to phase 2.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    pub bridge_workers: Vec<String>,
    pub contract_address: String,
    pub proposal: ProposalFields,
    pub ipfs_cid: String,
    pub created: bool,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    /// The setup -> submit transition.
    pub fn complete_setup(params: &BridgeParams, proposal: ProposalFields, ipfs_cid: String) -> Self {
        Self {
            phase: Phase::Submit,
            bridge_workers: params.bridge_workers.clone(),
            contract_address: params.bridge_contract_address.clone(),
            proposal,
            ipfs_cid,
            created: true,
            created_at: Utc::now(),
        }
    }

    pub fn bridge_params(&self) -> BridgeParams {
        BridgeParams {
            bridge_workers: self.bridge_workers.clone(),
            bridge_contract_address: self.contract_address.clone(),
        }
    }
}

/// Startup decision derived from the persisted state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Setup,
    Submit(Box<SessionState>),
}

impl Dispatch {
    pub fn from_state(state: Option<SessionState>) -> Self {
        match state {
            Some(state) if state.phase == Phase::Submit => Dispatch::Submit(Box::new(state)),
            _ => Dispatch::Setup,
        }
    }
}

/// `testing_state.json` in the working directory. One operator, one
/// sequential session; no locking.
#[derive(Clone, Debug)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable state means a fresh start.
    pub fn load(&self) -> Option<SessionState> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "could not read session state, starting fresh");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "corrupt session state, starting fresh");
                None
            }
        }
    }

    pub fn dispatch(&self) -> Dispatch {
        Dispatch::from_state(self.load())
    }

    pub fn save(&self, state: &SessionState) -> BridgeResult<()> {
        let data = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), phase = ?state.phase, "session state saved");
        Ok(())
    }

    /// Returns whether a file was actually removed.
    pub fn clear(&self) -> BridgeResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionState {
        SessionState::complete_setup(
            &BridgeParams {
                bridge_workers: vec!["air1a".into(), "air1b".into()],
                bridge_contract_address: "0xabc".into(),
            },
            ProposalFields {
                title: "Update".into(),
                summary: "Summary".into(),
                details: "Details".into(),
                forum_url: "https://forum.example/t/1".into(),
            },
            "QmCid".into(),
        )
    }

    #[test]
    fn save_then_load_in_fresh_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testing_state.json");
        let state = sample();
        StateFile::new(&path).save(&state).unwrap();

        let loaded = StateFile::new(&path).load().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(
            StateFile::new(&path).dispatch(),
            Dispatch::Submit(Box::new(state))
        );
    }

    #[test]
    fn missing_and_corrupt_files_mean_setup() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("testing_state.json"));
        assert_eq!(file.dispatch(), Dispatch::Setup);

        fs::write(file.path(), b"{\"phase\": \"submit\", \"bridge_").unwrap();
        assert_eq!(file.load(), None);
        assert_eq!(file.dispatch(), Dispatch::Setup);
    }

    #[test]
    fn setup_phase_state_still_dispatches_setup() {
        let mut state = sample();
        state.phase = Phase::Setup;
        assert_eq!(Dispatch::from_state(Some(state)), Dispatch::Setup);
    }

    #[test]
    fn phase_serializes_as_snake_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["phase"], "submit");
        assert_eq!(json["created"], true);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("testing_state.json"));
        file.save(&sample()).unwrap();
        assert!(file.clear().unwrap());
        assert!(!file.clear().unwrap());
        assert!(!file.path().exists());
    }
}
