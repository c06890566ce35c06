use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use junction_bridge::monitor::RestClient;
use junction_bridge::runner::Output;
use junction_bridge::workflow::{Operator, WalkthroughStep};
use junction_bridge::{
    BridgeError, CommandRunner, Console, Dispatch, Invocation, Phase, RunError, Settings, StateFile,
};
use serde_json::Value;

const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

const GENESIS: &str = r#"{
  "genesis_time": "2024-05-01T10:00:00Z",
  "chain_id": "junction",
  "initial_height": "1",
  "app_state": {
    "bank": {"balances": []},
    "gov": {
      "starting_proposal_id": "1",
      "params": {
        "min_deposit": [{"denom": "uamf", "amount": "10000000"}],
        "max_deposit_period": "172800s",
        "voting_period": "172800s",
        "quorum": "0.334000000000000000",
        "expedited_voting_period": "86400s"
      }
    }
  }
}"#;

const APP_TOML: &str = r#"minimum-gas-prices = ""

[api]
enable = false
swagger = false
address = "tcp://localhost:1317"
"#;

/// Records every invocation and fakes just enough of `junctiond` for the
/// setup sequence: `init` lays down genesis.json and app.toml, `keys show`
/// reports a missing key.
struct RecordingRunner {
    home: PathBuf,
    genesis: String,
    calls: Mutex<Vec<Invocation>>,
}

impl RecordingRunner {
    fn new(home: &Path) -> Self {
        Self::with_genesis(home, GENESIS)
    }

    fn with_genesis(home: &Path, genesis: &str) -> Self {
        Self {
            home: home.to_path_buf(),
            genesis: genesis.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|invocation| {
                let program = invocation
                    .program
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut words = vec![program];
                words.extend(
                    invocation
                        .args
                        .iter()
                        .take_while(|arg| !arg.starts_with('-'))
                        .take(2)
                        .cloned(),
                );
                words.join(" ")
            })
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<Output, RunError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let args: Vec<&str> = invocation.args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["init", ..] => {
                let config = self.home.join("config");
                fs::create_dir_all(&config).unwrap();
                fs::write(config.join("genesis.json"), &self.genesis).unwrap();
                fs::write(config.join("app.toml"), APP_TOML).unwrap();
            }
            ["keys", "show", ..] => {
                return Err(RunError::Failed {
                    command: invocation.to_string(),
                    code: Some(1),
                    stderr: "Error: test1 is not a valid name or address".into(),
                });
            }
            _ => {}
        }
        Ok(Output::default())
    }

    fn spawn(&self, invocation: &Invocation) -> Result<Child, RunError> {
        Err(RunError::Spawn {
            program: invocation.program.display().to_string(),
            source: std::io::Error::other("no node in tests"),
        })
    }
}

fn settings(dir: &Path) -> Settings {
    let mut settings = Settings {
        workdir: dir.to_path_buf(),
        home_dir: dir.join("node-home"),
        junctiond_path: "/opt/junction/junctiond".into(),
        animations: false,
        block_wait_secs: 0,
        ..Settings::default()
    };
    for (key, value) in [
        ("IPFS_CID", CID),
        ("BRIDGE_WORKERS", "air1alpha, air1beta ,air1gamma"),
        ("BRIDGE_CONTRACT_ADDRESS", "0x1111111111111111111111111111111111111111"),
    ] {
        assert!(settings.apply_var(key, value.to_string()));
    }
    settings
}

/// The setup phase never polls.
fn unused_rest() -> RestClient {
    RestClient::new("http://127.0.0.1:9").unwrap()
}

fn silent_console() -> Console<Cursor<Vec<u8>>, Vec<u8>> {
    Console::new(Cursor::new(Vec::new()), Vec::new())
}

#[test]
fn setup_without_input_writes_proposal_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let runner = RecordingRunner::new(&settings.home());
    let interrupted = AtomicBool::new(false);
    let mut operator = Operator::new(&settings, &runner, silent_console(), &interrupted);

    let step = operator.walkthrough(&unused_rest()).unwrap();
    let WalkthroughStep::SetupComplete(state) = step else {
        panic!("expected setup, got {step:?}");
    };

    let proposal: Value =
        serde_json::from_slice(&fs::read(dir.path().join("proposal.json")).unwrap()).unwrap();
    assert_eq!(proposal["metadata"], format!("ipfs://{CID}"));
    let params = &proposal["messages"][0]["params"];
    assert_eq!(
        params["bridge_workers"],
        serde_json::json!(["air1alpha", "air1beta", "air1gamma"])
    );
    assert_eq!(
        params["bridge_contract_address"],
        "0x1111111111111111111111111111111111111111"
    );
    assert_eq!(proposal["messages"][0]["@type"], "/junction.evmbridge.MsgUpdateParams");
    assert_eq!(proposal["deposit"], "51000000uamf");
    assert_eq!(proposal["expedited"], true);

    let metadata: Value =
        serde_json::from_slice(&fs::read(dir.path().join("metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata["title"], proposal["title"]);

    assert_eq!(state.phase, Phase::Submit);
    assert_eq!(state.ipfs_cid, CID);
    let saved = StateFile::new(settings.state_path());
    assert_eq!(saved.dispatch(), Dispatch::Submit(state));

    assert_eq!(
        runner.commands(),
        vec![
            "rm",
            "junctiond init junction-testing",
            "junctiond keys show",
            "junctiond keys add",
            "junctiond genesis add-genesis-account",
            "junctiond genesis gentx",
            "junctiond genesis collect-gentxs",
        ]
    );
}

#[test]
fn setup_shortens_governance_and_enables_api() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let runner = RecordingRunner::new(&settings.home());
    let interrupted = AtomicBool::new(false);
    let mut operator = Operator::new(&settings, &runner, silent_console(), &interrupted);
    operator.init_node().unwrap();

    let genesis: Value =
        serde_json::from_slice(&fs::read(settings.genesis_path()).unwrap()).unwrap();
    let params = &genesis["app_state"]["gov"]["params"];
    assert_eq!(params["max_deposit_period"], "600s");
    assert_eq!(params["voting_period"], "660s");
    assert_eq!(params["expedited_voting_period"], "300s");
    assert_eq!(params["quorum"], "0.334000000000000000");
    assert_eq!(genesis["app_state"]["gov"]["starting_proposal_id"], "1");
    assert_eq!(genesis["chain_id"], "junction");

    let app = fs::read_to_string(settings.app_toml_path()).unwrap();
    assert!(app.contains("minimum-gas-prices = \"0.00025uamf\""));
    assert!(app.contains("enable = true"));
    assert!(app.contains("swagger = true"));
}

#[test]
fn genesis_without_gov_periods_aborts_setup() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let broken = GENESIS.replace("\"voting_period\": \"172800s\",", "");
    let runner = RecordingRunner::with_genesis(&settings.home(), &broken);
    let interrupted = AtomicBool::new(false);
    let mut operator = Operator::new(&settings, &runner, silent_console(), &interrupted);

    let err = operator.walkthrough(&unused_rest()).unwrap_err();
    assert!(
        matches!(err, BridgeError::MissingGenesisKey(ref key) if key == "app_state.gov.params.voting_period"),
        "{err}"
    );
    let genesis = fs::read_to_string(settings.genesis_path()).unwrap();
    assert_eq!(genesis, broken);
    assert!(!settings.state_path().exists());
    assert!(!dir.path().join("proposal.json").exists());
}

#[test]
fn invalid_vote_is_rejected_before_any_command() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let runner = RecordingRunner::new(&settings.home());
    let interrupted = AtomicBool::new(false);
    let mut operator = Operator::new(&settings, &runner, silent_console(), &interrupted);

    for bad in ["maybe", "", "veto", "YES!", "YES", "No_With_Veto", " no"] {
        let err = operator.vote_command("4", bad).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidVoteOption(_)), "{bad}: {err}");
    }
    assert!(runner.calls.lock().unwrap().is_empty());

    let err = operator.vote_command("four", "no_with_veto").unwrap_err();
    assert!(matches!(err, BridgeError::InvalidInput(_)), "{err}");
    assert!(runner.calls.lock().unwrap().is_empty());

    operator.vote_command("4", "no_with_veto").unwrap();
    let calls = runner.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(&calls[0].args[..5], ["tx", "gov", "vote", "4", "no_with_veto"]);
}
