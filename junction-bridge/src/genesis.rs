use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::Settings;
use crate::error::{BridgeError, BridgeResult};

/// Governance timings written into genesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GovTimings {
    pub max_deposit_period: String,
    pub voting_period: String,
    pub expedited_voting_period: String,
}

impl GovTimings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_deposit_period: settings.max_deposit_period.clone(),
            voting_period: settings.voting_period.clone(),
            expedited_voting_period: settings.expedited_voting_period.clone(),
        }
    }
}

// Only the path down to the gov params is typed; every sibling at each level
// rides along in `rest`.

#[derive(Debug, Serialize, Deserialize)]
pub struct GenesisDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_state: Option<AppState>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AppState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gov: Option<GovState>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GovState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<GovParams>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GovParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_deposit_period: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    voting_period: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expedited_voting_period: Option<Value>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl GenesisDocument {
    pub fn parse(raw: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_pretty_string(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Overwrites the three gov timing fields. Each must already exist.
    pub fn apply(&mut self, timings: &GovTimings) -> BridgeResult<()> {
        let app_state = self
            .app_state
            .as_mut()
            .ok_or_else(|| missing("app_state"))?;
        let gov = app_state
            .gov
            .as_mut()
            .ok_or_else(|| missing("app_state.gov"))?;
        let params = gov
            .params
            .as_mut()
            .ok_or_else(|| missing("app_state.gov.params"))?;

        let fields = [
            (
                &mut params.max_deposit_period,
                "max_deposit_period",
                &timings.max_deposit_period,
            ),
            (
                &mut params.voting_period,
                "voting_period",
                &timings.voting_period,
            ),
            (
                &mut params.expedited_voting_period,
                "expedited_voting_period",
                &timings.expedited_voting_period,
            ),
        ];
        for (slot, name, _) in &fields {
            if slot.is_none() {
                return Err(missing(&format!("app_state.gov.params.{name}")));
            }
        }
        for (slot, _, value) in fields {
            *slot = Some(Value::String(value.to_string()));
        }
        Ok(())
    }
}

fn missing(path: &str) -> BridgeError {
    BridgeError::MissingGenesisKey(path.to_string())
}

/// Reads, rewrites and saves the genesis file in place.
pub fn update_genesis_file(path: &Path, timings: &GovTimings) -> BridgeResult<()> {
    let raw = fs::read_to_string(path)?;
    let mut document = GenesisDocument::parse(&raw)?;
    document.apply(timings)?;
    fs::write(path, document.to_pretty_string()?)?;
    info!(
        path = %path.display(),
        voting_period = %timings.voting_period,
        "genesis governance timings updated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timings() -> GovTimings {
        GovTimings {
            max_deposit_period: "600s".into(),
            voting_period: "660s".into(),
            expedited_voting_period: "300s".into(),
        }
    }

    const GENESIS: &str = r#"{
      "genesis_time": "2024-01-01T00:00:00Z",
      "chain_id": "junction",
      "initial_height": 1,
      "app_hash": null,
      "consensus": {"params": {"block": {"max_bytes": "22020096"}}},
      "app_state": {
        "bank": {"balances": [{"address": "air1xyz", "coins": [{"denom": "uamf", "amount": "100000000000"}]}]},
        "gov": {
          "starting_proposal_id": "1",
          "deposits": [],
          "params": {
            "min_deposit": [{"denom": "uamf", "amount": "10000000"}],
            "max_deposit_period": "172800s",
            "voting_period": "172800s",
            "expedited_voting_period": "86400s",
            "quorum": "0.334000000000000000",
            "burn_vote_veto": true
          }
        }
      }
    }"#;

    #[test]
    fn rewrites_timings_and_preserves_everything_else() {
        let original: Value = serde_json::from_str(GENESIS).unwrap();
        let mut document = GenesisDocument::parse(GENESIS).unwrap();
        document.apply(&timings()).unwrap();
        let updated: Value = serde_json::from_str(&document.to_pretty_string().unwrap()).unwrap();

        let params = &updated["app_state"]["gov"]["params"];
        assert_eq!(params["max_deposit_period"], "600s");
        assert_eq!(params["voting_period"], "660s");
        assert_eq!(params["expedited_voting_period"], "300s");

        let mut expected = original.clone();
        let expected_params = &mut expected["app_state"]["gov"]["params"];
        expected_params["max_deposit_period"] = "600s".into();
        expected_params["voting_period"] = "660s".into();
        expected_params["expedited_voting_period"] = "300s".into();
        assert_eq!(updated, expected);
    }

    #[test]
    fn missing_param_is_reported_by_path() {
        let raw = r#"{"app_state":{"gov":{"params":{"max_deposit_period":"1s","voting_period":"1s"}}}}"#;
        let mut document = GenesisDocument::parse(raw).unwrap();
        let err = document.apply(&timings()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "app_state.gov.params.expedited_voting_period not found in genesis file"
        );
    }

    #[test]
    fn missing_gov_section_is_reported() {
        let mut document = GenesisDocument::parse(r#"{"app_state":{"bank":{}}}"#).unwrap();
        assert!(matches!(
            document.apply(&timings()),
            Err(BridgeError::MissingGenesisKey(path)) if path == "app_state.gov"
        ));
    }

    #[test]
    fn failed_update_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");
        let raw = r#"{"app_state":{}}"#;
        fs::write(&path, raw).unwrap();
        assert!(update_genesis_file(&path, &timings()).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), raw);
    }
}
