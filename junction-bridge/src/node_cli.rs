//! Argument vectors for the `junctiond` subcommands this tool drives.
//!
//! Flags follow the Cosmos SDK v0.50 CLI: the proposal deposit travels inside
//! `proposal.json`, transactions pay `--fees`, and every command receives an
//! explicit `--home` so the configured home directory is the only one touched.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{BridgeError, BridgeResult};
use crate::runner::{CommandRunner, Invocation, Mode, RunError};

pub const VOTE_OPTIONS: [&str; 4] = ["yes", "no", "abstain", "no_with_veto"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOption {
    Yes,
    No,
    Abstain,
    NoWithVeto,
}

impl VoteOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteOption::Yes => "yes",
            VoteOption::No => "no",
            VoteOption::Abstain => "abstain",
            VoteOption::NoWithVeto => "no_with_veto",
        }
    }
}

impl FromStr for VoteOption {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "yes" => Ok(VoteOption::Yes),
            "no" => Ok(VoteOption::No),
            "abstain" => Ok(VoteOption::Abstain),
            "no_with_veto" => Ok(VoteOption::NoWithVeto),
            _ => Err(BridgeError::InvalidVoteOption(value.to_string())),
        }
    }
}

impl fmt::Display for VoteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast result printed by `tx ... --output json`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct TxResponse {
    #[serde(default)]
    pub txhash: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
}

impl TxResponse {
    /// `None` when stdout is not a JSON broadcast response; the exit status
    /// already told us the command succeeded, so that is not an error.
    pub fn parse(stdout: &str) -> BridgeResult<Option<Self>> {
        let start = match stdout.find('{') {
            Some(start) => start,
            None => return Ok(None),
        };
        let response: TxResponse = match serde_json::from_str(stdout[start..].trim()) {
            Ok(response) => response,
            Err(_) => return Ok(None),
        };
        if response.code != 0 {
            return Err(BridgeError::TxRejected {
                code: response.code,
                log: response.raw_log,
            });
        }
        Ok(Some(response))
    }
}

pub struct NodeCli<'a, R: CommandRunner + ?Sized> {
    settings: &'a Settings,
    runner: &'a R,
}

impl<'a, R: CommandRunner + ?Sized> NodeCli<'a, R> {
    pub fn new(settings: &'a Settings, runner: &'a R) -> Self {
        Self { settings, runner }
    }

    fn node(&self, mode: Mode) -> Invocation {
        Invocation::new(self.settings.binary(), mode)
    }

    fn home_args(&self) -> [String; 2] {
        ["--home".to_string(), self.settings.home().display().to_string()]
    }

    fn keyring_args(&self) -> [String; 2] {
        [
            "--keyring-backend".to_string(),
            self.settings.keyring_backend.clone(),
        ]
    }

    pub fn remove_home(&self) -> Result<(), RunError> {
        let home = self.settings.home();
        info!(home = %home.display(), "removing existing node home");
        self.runner
            .run(&Invocation::new("rm", Mode::Stream).args(["-rf".to_string(), home.display().to_string()]))
            .map(drop)
    }

    pub fn init(&self) -> Result<(), RunError> {
        let settings = self.settings;
        self.runner
            .run(
                &self
                    .node(Mode::Stream)
                    .args(["init", settings.moniker.as_str()])
                    .args(["--default-denom", settings.denom.as_str()])
                    .args(["--chain-id", settings.chain_id.as_str()])
                    .args(self.home_args()),
            )
            .map(drop)
    }

    /// `keys show` failing for any reason is read as "key absent".
    pub fn key_exists(&self) -> bool {
        let invocation = self
            .node(Mode::Capture)
            .args(["keys", "show", self.settings.key_name.as_str()])
            .args(self.keyring_args())
            .args(self.home_args());
        self.runner.run(&invocation).is_ok()
    }

    pub fn add_key(&self) -> Result<(), RunError> {
        self.runner
            .run(
                &self
                    .node(Mode::Stream)
                    .args(["keys", "add", self.settings.key_name.as_str()])
                    .args(self.keyring_args())
                    .args(self.home_args()),
            )
            .map(drop)
    }

    pub fn add_genesis_account(&self) -> Result<(), RunError> {
        let settings = self.settings;
        self.runner
            .run(
                &self
                    .node(Mode::Stream)
                    .args(["genesis", "add-genesis-account"])
                    .args([settings.key_name.as_str(), settings.amount.as_str()])
                    .args(self.keyring_args())
                    .args(self.home_args()),
            )
            .map(drop)
    }

    pub fn gentx(&self) -> Result<(), RunError> {
        let settings = self.settings;
        self.runner
            .run(
                &self
                    .node(Mode::Stream)
                    .args(["genesis", "gentx"])
                    .args([settings.key_name.as_str(), settings.validator_stake.as_str()])
                    .args(self.keyring_args())
                    .args(["--gas-prices", settings.gas_prices.as_str()])
                    .args(["--chain-id", settings.chain_id.as_str()])
                    .args(self.home_args()),
            )
            .map(drop)
    }

    pub fn collect_gentxs(&self) -> Result<(), RunError> {
        self.runner
            .run(
                &self
                    .node(Mode::Stream)
                    .args(["genesis", "collect-gentxs"])
                    .args(self.home_args()),
            )
            .map(drop)
    }

    pub fn submit_proposal(&self, proposal: &Path) -> BridgeResult<Option<TxResponse>> {
        let settings = self.settings;
        let invocation = self
            .node(Mode::CaptureStdout)
            .args(["tx", "gov", "submit-proposal"])
            .arg(proposal.display().to_string())
            .args(["--from", settings.proposer()])
            .args(["--chain-id", settings.chain_id.as_str()])
            .args(["--fees", settings.proposal_fees.as_str()])
            .args(["--gas", "auto", "--gas-adjustment", "1.5"])
            .args(self.keyring_args())
            .args(self.home_args())
            .args(["--output", "json", "-y"]);
        let output = self.runner.run(&invocation)?;
        broadcast_result(&output.stdout)
    }

    pub fn vote(&self, proposal_id: u64, option: VoteOption) -> BridgeResult<Option<TxResponse>> {
        let settings = self.settings;
        let invocation = self
            .node(Mode::CaptureStdout)
            .args(["tx", "gov", "vote"])
            .args([proposal_id.to_string(), option.to_string()])
            .args(["--from", settings.proposer()])
            .args(["--chain-id", settings.chain_id.as_str()])
            .args(["--fees", settings.proposal_fees.as_str()])
            .args(self.keyring_args())
            .args(self.home_args())
            .args(["--output", "json", "-y"]);
        let output = self.runner.run(&invocation)?;
        broadcast_result(&output.stdout)
    }

    /// Highest proposal id known to the node, if any.
    pub fn latest_proposal_id(&self) -> BridgeResult<Option<u64>> {
        let invocation = self
            .node(Mode::Capture)
            .args(["query", "gov", "proposals", "--output", "json"])
            .args(self.home_args());
        let output = self.runner.run(&invocation)?;
        latest_proposal_id(&output.stdout)
    }

    pub fn start_invocation(&self) -> Invocation {
        self.node(Mode::Stream)
            .arg("start")
            .args(["--minimum-gas-prices", self.settings.minimum_gas_prices.as_str()])
            .args(self.home_args())
    }
}

fn broadcast_result(stdout: &str) -> BridgeResult<Option<TxResponse>> {
    let response = TxResponse::parse(stdout)?;
    if response.is_none() {
        warn!(output = stdout.trim(), "could not parse broadcast response");
    }
    Ok(response)
}

/// Ids come back as strings in gov v1 JSON, but older nodes print numbers.
pub fn latest_proposal_id(stdout: &str) -> BridgeResult<Option<u64>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(trimmed)?;
    let ids = value
        .get("proposals")
        .and_then(Value::as_array)
        .map(|proposals| {
            proposals
                .iter()
                .filter_map(|proposal| match proposal.get("id")? {
                    Value::String(id) => id.parse::<u64>().ok(),
                    Value::Number(id) => id.as_u64(),
                    _ => None,
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Ok(ids.into_iter().max())
}
