use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BridgeResult;
use crate::proposal::parse_worker_list;

pub const STATE_FILE: &str = "testing_state.json";
pub const PROPOSAL_FILE: &str = "proposal.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const DRAFT_METADATA_FILE: &str = "draft_metadata.json";
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Flat operator settings. Every field has a default so partial YAML files
/// and sparse environments are both fine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub moniker: String,
    pub chain_id: String,
    pub denom: String,
    pub key_name: String,
    pub amount: String,
    pub validator_stake: String,
    pub gas_prices: String,
    pub minimum_gas_prices: String,
    pub junctiond_path: PathBuf,
    pub home_dir: PathBuf,
    pub keyring_backend: String,
    pub rest_endpoint: String,
    pub workdir: PathBuf,
    pub max_deposit_period: String,
    pub voting_period: String,
    pub expedited_voting_period: String,
    pub proposer_key: Option<String>,
    pub proposal_deposit: String,
    pub proposal_fees: String,
    pub proposal_authority: String,
    pub proposal_msg_type: String,
    pub expedited: bool,
    pub bridge_workers: Option<Vec<String>>,
    pub bridge_contract_address: Option<String>,
    pub proposal_title: Option<String>,
    pub proposal_summary: Option<String>,
    pub proposal_details: Option<String>,
    pub proposal_forum_url: Option<String>,
    pub ipfs_cid: Option<String>,
    pub vote_option: Option<String>,
    pub monitor_interval_secs: u64,
    pub block_wait_secs: u64,
    pub animations: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            moniker: "junction-testing".to_string(),
            chain_id: "junction".to_string(),
            denom: "uamf".to_string(),
            key_name: "test1".to_string(),
            amount: "100000000000uamf".to_string(),
            validator_stake: "10000000000uamf".to_string(),
            gas_prices: "0.0025uamf".to_string(),
            minimum_gas_prices: "0.00025uamf".to_string(),
            junctiond_path: PathBuf::from("./build/junctiond"),
            home_dir: PathBuf::from("$HOME/.junction"),
            keyring_backend: "os".to_string(),
            rest_endpoint: "http://localhost:1317".to_string(),
            workdir: PathBuf::from("."),
            max_deposit_period: "600s".to_string(),
            voting_period: "660s".to_string(),
            expedited_voting_period: "300s".to_string(),
            proposer_key: None,
            proposal_deposit: "51000000uamf".to_string(),
            proposal_fees: "50uamf".to_string(),
            proposal_authority: "air10d07y265gmmuvt4z0w9aw880jnsr700jszsute".to_string(),
            proposal_msg_type: "/junction.evmbridge.MsgUpdateParams".to_string(),
            expedited: true,
            bridge_workers: None,
            bridge_contract_address: None,
            proposal_title: None,
            proposal_summary: None,
            proposal_details: None,
            proposal_forum_url: None,
            ipfs_cid: None,
            vote_option: None,
            monitor_interval_secs: 2,
            block_wait_secs: 6,
            animations: true,
        }
    }
}

/// Optional configuration files. `None` means "look in the usual places".
#[derive(Clone, Debug, Default)]
pub struct ConfigSources {
    pub yaml: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Working directory searched for `config.yaml` and `.env`. Also
    /// overrides `Settings::workdir` once every layer is applied.
    pub workdir: Option<PathBuf>,
}

impl ConfigSources {
    fn search_dir(&self) -> &Path {
        self.workdir.as_deref().unwrap_or(Path::new("."))
    }
}

impl Settings {
    /// Defaults, then YAML, then the key=value file, then `vars` (normally
    /// `std::env::vars()`). Unreadable files are logged and skipped.
    pub fn load<I>(sources: &ConfigSources, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut settings = match locate_yaml(sources.yaml.as_deref(), sources.search_dir()) {
            Some(path) => match Self::from_yaml_file(&path) {
                Ok(settings) => {
                    debug!(path = %path.display(), "loaded yaml config");
                    settings
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "error reading config file, using defaults");
                    Self::default()
                }
            },
            None => Self::default(),
        };

        let env_file = sources.env_file.clone().or_else(|| {
            Some(sources.search_dir().join(DEFAULT_ENV_FILE)).filter(|path| path.is_file())
        });
        if let Some(path) = env_file {
            match fs::read_to_string(&path) {
                Ok(contents) => settings.apply_vars(parse_env_file(&contents)),
                Err(err) => {
                    warn!(path = %path.display(), %err, "could not read env file, skipping");
                }
            }
        }

        settings.apply_vars(vars);
        if let Some(workdir) = &sources.workdir {
            settings.workdir = workdir.clone();
        }
        settings
    }

    pub fn from_yaml_file(path: &Path) -> BridgeResult<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn apply_vars<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            self.apply_var(&key, value);
        }
    }

    /// Applies one upper-case variable. Returns false for names this tool
    /// does not know about.
    pub fn apply_var(&mut self, key: &str, value: String) -> bool {
        match key {
            "MONIKER" => self.moniker = value,
            "CHAIN_ID" => self.chain_id = value,
            "DENOM" => self.denom = value,
            "KEY_NAME" => self.key_name = value,
            "AMOUNT" => self.amount = value,
            "VALIDATOR_STAKE" => self.validator_stake = value,
            "GAS_PRICES" => self.gas_prices = value,
            "MINIMUM_GAS_PRICES" => self.minimum_gas_prices = value,
            "JUNCTIOND_PATH" => self.junctiond_path = PathBuf::from(value),
            "HOME_DIR" => self.home_dir = PathBuf::from(value),
            "KEYRING_BACKEND" => self.keyring_backend = value,
            "REST_ENDPOINT" => self.rest_endpoint = value,
            "MAX_DEPOSIT_PERIOD" => self.max_deposit_period = normalize_duration(&value),
            "VOTING_PERIOD" => self.voting_period = normalize_duration(&value),
            "EXPEDITED_VOTING_PERIOD" => {
                self.expedited_voting_period = normalize_duration(&value)
            }
            "PROPOSER_KEY" => self.proposer_key = non_empty(value),
            "PROPOSAL_DEPOSIT" => self.proposal_deposit = value,
            "PROPOSAL_FEES" => self.proposal_fees = value,
            "BRIDGE_WORKERS" => {
                let workers = parse_worker_list(&value);
                self.bridge_workers = (!workers.is_empty()).then_some(workers);
            }
            "BRIDGE_CONTRACT_ADDRESS" => self.bridge_contract_address = non_empty(value),
            "PROPOSAL_TITLE" => self.proposal_title = non_empty(value),
            "PROPOSAL_SUMMARY" => self.proposal_summary = non_empty(value),
            "PROPOSAL_DETAILS" => self.proposal_details = non_empty(value),
            "PROPOSAL_FORUM_URL" => self.proposal_forum_url = non_empty(value),
            "IPFS_CID" => self.ipfs_cid = non_empty(value),
            "VOTE_OPTION" => self.vote_option = non_empty(value),
            "MONITOR_INTERVAL" => set_secs(&mut self.monitor_interval_secs, key, &value),
            "BLOCK_WAIT" => set_secs(&mut self.block_wait_secs, key, &value),
            _ => return false,
        }
        true
    }

    pub fn proposer(&self) -> &str {
        self.proposer_key.as_deref().unwrap_or(&self.key_name)
    }

    pub fn home(&self) -> PathBuf {
        expand_home(&self.home_dir)
    }

    pub fn binary(&self) -> PathBuf {
        expand_home(&self.junctiond_path)
    }

    /// File name of the node binary, used for the best-effort `pkill`.
    pub fn binary_name(&self) -> String {
        self.junctiond_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "junctiond".to_string())
    }

    pub fn genesis_path(&self) -> PathBuf {
        self.home().join("config").join("genesis.json")
    }

    pub fn app_toml_path(&self) -> PathBuf {
        self.home().join("config").join("app.toml")
    }

    pub fn state_path(&self) -> PathBuf {
        self.workdir.join(STATE_FILE)
    }

    pub fn proposal_path(&self) -> PathBuf {
        self.workdir.join(PROPOSAL_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.workdir.join(METADATA_FILE)
    }

    pub fn draft_metadata_path(&self) -> PathBuf {
        self.workdir.join(DRAFT_METADATA_FILE)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

fn locate_yaml(explicit: Option<&Path>, dir: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = dir.join(DEFAULT_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    let user = expand_home(Path::new("~/.junction-bridge")).join(DEFAULT_CONFIG_FILE);
    user.is_file().then_some(user)
}

/// Parses `KEY=value` lines. Blank lines and `#` comments are skipped, an
/// `export ` prefix is allowed and one layer of matching quotes is removed.
pub fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Replaces a leading `~` or `$HOME` component with the user's home
/// directory. Anything else, including `~user`, is returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let rest = ["$HOME", "${HOME}", "~"]
        .iter()
        .find_map(|prefix| raw.strip_prefix(prefix))
        .filter(|rest| rest.is_empty() || rest.starts_with('/'));
    match (rest.map(|rest| rest.trim_start_matches('/')), dirs::home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Bare integers are taken as seconds so `VOTING_PERIOD=120` works.
pub fn normalize_duration(value: &str) -> String {
    let value = value.trim();
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        format!("{value}s")
    } else {
        value.to_string()
    }
}

/// Parses Go-style duration strings (`90s`, `10m`, `1h30m`) into whole seconds.
pub fn duration_secs(value: &str) -> Option<u64> {
    let mut total = 0u64;
    let mut digits = String::new();
    for c in value.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let amount: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return None,
        };
        total = total.checked_add(amount.checked_mul(unit)?)?;
    }
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn set_secs(slot: &mut u64, key: &str, value: &str) {
    match value.trim().parse() {
        Ok(secs) => *slot = secs,
        Err(_) => warn!(key, value, "expected whole seconds, keeping previous value"),
    }
}
