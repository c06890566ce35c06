//! Operator workflows: the four single-purpose subcommands and the two-phase
//! walkthrough that strings them together.

use std::io::{BufRead, Write};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tracing::{info, warn};

use crate::animation::{countdown, format_mm_ss, Spinner, COUNTDOWN_TICK};
use crate::app_config::update_app_toml;
use crate::config::{duration_secs, Settings};
use crate::error::{BridgeError, BridgeResult};
use crate::genesis::{update_genesis_file, GovTimings};
use crate::monitor::{Monitor, MonitorOutcome, ProposalSource};
use crate::node_cli::{NodeCli, TxResponse, VoteOption, VOTE_OPTIONS};
use crate::prompt::Console;
use crate::proposal::{
    collect_bridge_params, collect_fields, obtain_cid, write_json, write_metadata, MetadataSource,
    ProposalDocument,
};
use crate::runner::CommandRunner;
use crate::session::{Dispatch, SessionState, StateFile};

/// How a submission run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The operator declined to submit; the saved session was discarded.
    Skipped,
    Completed { proposal_id: u64 },
    /// `proposal_id` is `None` when the interrupt came before submission.
    Interrupted { proposal_id: Option<u64> },
}

/// What one walkthrough invocation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalkthroughStep {
    /// Phase 1 finished; the caller should now run the node in the foreground.
    SetupComplete(Box<SessionState>),
    Submitted(SubmitOutcome),
}

/// Validates a vote option without touching the node.
pub fn parse_vote_option(raw: &str) -> BridgeResult<VoteOption> {
    raw.parse()
}

pub struct Operator<'a, R: CommandRunner + ?Sized, I, O> {
    settings: &'a Settings,
    runner: &'a R,
    console: Console<I, O>,
    interrupted: &'a AtomicBool,
}

impl<'a, R, I, O> Operator<'a, R, I, O>
where
    R: CommandRunner + ?Sized,
    I: BufRead,
    O: Write,
{
    pub fn new(
        settings: &'a Settings,
        runner: &'a R,
        console: Console<I, O>,
        interrupted: &'a AtomicBool,
    ) -> Self {
        Self {
            settings,
            runner,
            console,
            interrupted,
        }
    }

    pub fn into_console(self) -> Console<I, O> {
        self.console
    }

    fn node(&self) -> NodeCli<'a, R> {
        NodeCli::new(self.settings, self.runner)
    }

    fn state_file(&self) -> StateFile {
        StateFile::new(self.settings.state_path())
    }

    fn spinner(&self, label: &str) -> Spinner {
        if self.settings.animations {
            Spinner::start(label)
        } else {
            Spinner::disabled()
        }
    }

    /// Keyrings other than `test` and `memory` may prompt on stderr, which
    /// a spinner would draw over. Those get a plain line instead.
    fn tx_spinner(&mut self, label: &str) -> BridgeResult<Spinner> {
        if matches!(self.settings.keyring_backend.as_str(), "test" | "memory") {
            return Ok(self.spinner(label));
        }
        self.console.say(label)?;
        Ok(Spinner::disabled())
    }

    fn step(&mut self, label: &str) -> BridgeResult<()> {
        info!(step = label, "starting");
        self.console.say(format!("\n▶ {label}"))
    }

    /// Wipes the node home and rebuilds a single-validator chain with short
    /// governance periods. Does not start the node.
    pub fn init_node(&mut self) -> BridgeResult<()> {
        let node = self.node();

        self.step("Resetting node home")?;
        node.remove_home()?;

        self.step("Initialising node")?;
        node.init()?;

        self.step("Checking validator key")?;
        if node.key_exists() {
            self.console
                .say(format!("Key {} already exists", self.settings.key_name))?;
        } else {
            node.add_key()?;
        }

        self.step("Funding genesis account")?;
        node.add_genesis_account()?;

        self.step("Creating validator gentx")?;
        node.gentx()?;
        node.collect_gentxs()?;

        self.step("Shortening governance periods")?;
        let timings = GovTimings::from_settings(self.settings);
        update_genesis_file(&self.settings.genesis_path(), &timings)?;
        self.console.say(format!(
            "max_deposit_period={} voting_period={} expedited_voting_period={}",
            timings.max_deposit_period, timings.voting_period, timings.expedited_voting_period
        ))?;

        self.step("Enabling API and setting minimum gas prices")?;
        update_app_toml(
            &self.settings.app_toml_path(),
            &self.settings.minimum_gas_prices,
        )?;
        Ok(())
    }

    /// Collects proposal inputs and writes `metadata.json` and
    /// `proposal.json`. The returned state is ready for the submit phase.
    pub fn prepare_proposal(&mut self) -> BridgeResult<SessionState> {
        self.step("Collecting bridge parameters")?;
        let params = collect_bridge_params(&mut self.console, self.settings)?;
        let fields = collect_fields(&mut self.console, self.settings)?;

        let metadata_path = self.settings.metadata_path();
        match write_metadata(self.settings, &fields)? {
            MetadataSource::Draft => self.console.say(format!(
                "Copied draft metadata to {}",
                metadata_path.display()
            ))?,
            MetadataSource::Generated => self
                .console
                .say(format!("Wrote {}", metadata_path.display()))?,
        }

        let cid = obtain_cid(&mut self.console, self.settings)?;
        let document = ProposalDocument::build(self.settings, params.clone(), &fields, &cid);
        let proposal_path = self.settings.proposal_path();
        write_json(&proposal_path, &document)?;
        info!(path = %proposal_path.display(), metadata = %document.metadata, "proposal written");
        self.console
            .say(format!("Wrote {}", proposal_path.display()))?;

        Ok(SessionState::complete_setup(&params, fields, cid))
    }

    /// Phase 1. Persists the submit-phase record; starting the node is left
    /// to the caller, which owns the child through `NodeSession`.
    pub fn setup_phase(&mut self) -> BridgeResult<SessionState> {
        self.console.say("🔧 Phase 1: node setup and proposal preparation")?;
        self.init_node()?;
        let state = self.prepare_proposal()?;
        let state_file = self.state_file();
        state_file.save(&state)?;
        self.console.say(format!(
            "\n✅ Setup complete. State saved to {}.",
            state_file.path().display()
        ))?;
        self.console.say(
            "The node starts now. Run this tool again in a second terminal to submit the proposal.",
        )?;
        Ok(state)
    }

    /// Submits `proposal.json` and works out the id it was given.
    pub fn submit(&mut self) -> BridgeResult<u64> {
        let proposal_path = self.settings.proposal_path();
        let spinner = self.tx_spinner("Submitting proposal...")?;
        let result = self.node().submit_proposal(&proposal_path);
        spinner.finish();
        self.report_tx("Proposal submitted", result?)?;
        self.discover_proposal_id()
    }

    fn report_tx(&mut self, what: &str, response: Option<TxResponse>) -> BridgeResult<()> {
        match response {
            Some(tx) => self.console.say(format!("✅ {what} (tx {})", tx.txhash)),
            None => self.console.say(format!("✅ {what}")),
        }
    }

    fn discover_proposal_id(&mut self) -> BridgeResult<u64> {
        match self.node().latest_proposal_id() {
            Ok(Some(id)) => {
                self.console.say(format!("Proposal id: {id}"))?;
                return Ok(id);
            }
            Ok(None) => warn!("node reported no proposals"),
            Err(err) => warn!(%err, "could not query proposals"),
        }
        loop {
            let answer = self.console.ask_required("Enter proposal ID")?;
            match answer.parse::<u64>() {
                Ok(id) => return Ok(id),
                Err(_) => self
                    .console
                    .say(format!("{answer} is not a proposal id"))?,
            }
        }
    }

    /// `VOTE_OPTION` when set (and then it must be valid), otherwise asks
    /// until a valid option is given.
    fn choose_vote(&mut self) -> BridgeResult<VoteOption> {
        if let Some(raw) = self.settings.vote_option.as_deref() {
            let option = parse_vote_option(raw)?;
            self.console
                .say(format!("Vote option: {option} (from environment)"))?;
            return Ok(option);
        }
        let question = format!("Vote option ({})", VOTE_OPTIONS.join("/"));
        loop {
            let answer = self.console.ask(&question, "yes")?;
            match parse_vote_option(&answer) {
                Ok(option) => return Ok(option),
                Err(err) => self.console.say(err)?,
            }
        }
    }

    pub fn vote(&mut self, proposal_id: u64, option: VoteOption) -> BridgeResult<()> {
        let spinner = self.tx_spinner("Voting...")?;
        let result = self.node().vote(proposal_id, option);
        spinner.finish();
        self.report_tx(&format!("Voted {option} on proposal {proposal_id}"), result?)
    }

    pub fn monitor<S: ProposalSource + ?Sized>(&mut self, source: &S) -> MonitorOutcome {
        let mut monitor = Monitor::with_interval(self.settings.monitor_interval());
        if !self.settings.animations {
            monitor.clear_screen = false;
            monitor.blink = Duration::ZERO;
        }
        monitor.run(source, self.console.output(), self.interrupted)
    }

    fn wait_for_blocks(&mut self, label: &str) -> bool {
        countdown(
            self.console.output(),
            label,
            self.settings.block_wait_secs,
            COUNTDOWN_TICK,
            self.interrupted,
        )
    }

    /// Phase 2, run while the node from phase 1 is producing blocks.
    pub fn submit_phase<S: ProposalSource + ?Sized>(
        &mut self,
        state: &SessionState,
        source: &S,
    ) -> BridgeResult<SubmitOutcome> {
        let state_file = self.state_file();
        self.console.say("📨 Phase 2: submit, vote and monitor")?;
        self.show_summary(state)?;
        if !self.console.confirm("Submit this proposal now?", true)? {
            state_file.clear()?;
            self.console.say("Skipped. Session state cleared.")?;
            return Ok(SubmitOutcome::Skipped);
        }

        if !self.wait_for_blocks("Waiting for blocks") {
            return Ok(SubmitOutcome::Interrupted { proposal_id: None });
        }
        let proposal_id = self.submit()?;
        let option = self.choose_vote()?;
        if !self.wait_for_blocks("Waiting for the proposal to enter voting") {
            return Ok(SubmitOutcome::Interrupted {
                proposal_id: Some(proposal_id),
            });
        }
        self.vote(proposal_id, option)?;

        let outcome = match self.monitor(source) {
            MonitorOutcome::VotingEnded { .. } => SubmitOutcome::Completed { proposal_id },
            MonitorOutcome::Interrupted => SubmitOutcome::Interrupted {
                proposal_id: Some(proposal_id),
            },
        };
        if state_file.clear()? {
            info!(path = %state_file.path().display(), "session state removed");
        }
        Ok(outcome)
    }

    fn show_summary(&mut self, state: &SessionState) -> BridgeResult<()> {
        let lines = [
            format!("Title:            {}", state.proposal.title),
            format!("Bridge workers:   {}", state.bridge_workers.join(", ")),
            format!("Contract address: {}", state.contract_address),
            format!("Metadata:         ipfs://{}", state.ipfs_cid),
            format!(
                "Prepared at:      {}",
                state.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        ];
        for line in lines {
            self.console.say(line)?;
        }
        if let Some(secs) = duration_secs(&self.settings.voting_period) {
            self.console
                .say(format!("Voting period:    {}", format_mm_ss(secs)))?;
        }
        Ok(())
    }

    /// Dispatches on the persisted phase.
    pub fn walkthrough<S: ProposalSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> BridgeResult<WalkthroughStep> {
        match self.state_file().dispatch() {
            Dispatch::Setup => self
                .setup_phase()
                .map(|state| WalkthroughStep::SetupComplete(Box::new(state))),
            Dispatch::Submit(state) => self
                .submit_phase(&state, source)
                .map(WalkthroughStep::Submitted),
        }
    }

    /// The standalone `submit-proposal` subcommand: prepare then submit.
    pub fn submit_proposal(&mut self) -> BridgeResult<u64> {
        self.prepare_proposal()?;
        self.submit()
    }

    /// The standalone `vote` subcommand. The option and then the id are
    /// checked before anything is run.
    pub fn vote_command(&mut self, proposal_id: &str, raw_option: &str) -> BridgeResult<()> {
        let option = parse_vote_option(raw_option)?;
        let proposal_id = proposal_id
            .parse::<u64>()
            .map_err(|_| BridgeError::InvalidInput(format!("invalid proposal id: {proposal_id}")))?;
        self.vote(proposal_id, option)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;
    use std::path::Path;
    use std::process::Child;
    use std::sync::Mutex;

    use super::*;
    use crate::monitor::ProposalList;
    use crate::runner::{Invocation, Output, RunError};

    #[derive(Default)]
    struct Scripted {
        calls: Mutex<Vec<Vec<String>>>,
        query_output: String,
    }

    impl Scripted {
        fn subcommands(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|args| args.iter().take(3).cloned().collect::<Vec<_>>().join(" "))
                .collect()
        }
    }

    impl CommandRunner for Scripted {
        fn run(&self, invocation: &Invocation) -> Result<Output, RunError> {
            self.calls.lock().unwrap().push(invocation.args.clone());
            let stdout = match invocation.args.first().map(String::as_str) {
                Some("query") => self.query_output.clone(),
                Some("tx") => r#"{"txhash":"ABC","code":0,"raw_log":""}"#.to_string(),
                _ => String::new(),
            };
            Ok(Output {
                stdout,
                stderr: String::new(),
            })
        }

        fn spawn(&self, invocation: &Invocation) -> Result<Child, RunError> {
            Err(RunError::Spawn {
                program: invocation.program.display().to_string(),
                source: std::io::Error::other("not in tests"),
            })
        }
    }

    struct Ended;

    impl ProposalSource for Ended {
        fn fetch(&self) -> BridgeResult<ProposalList> {
            Ok(serde_json::from_str(
                r#"{"proposals":[{"id":"3","status":"PROPOSAL_STATUS_VOTING_PERIOD",
                    "voting_start_time":"2020-01-01T00:00:00Z",
                    "voting_end_time":"2020-01-01T00:11:00Z"}]}"#,
            )?)
        }
    }

    fn settings(dir: &Path) -> Settings {
        Settings {
            workdir: dir.to_path_buf(),
            home_dir: dir.join("home"),
            block_wait_secs: 0,
            monitor_interval_secs: 0,
            animations: false,
            ..Settings::default()
        }
    }

    fn console(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn saved_state(settings: &Settings) -> SessionState {
        let state = SessionState::complete_setup(
            &crate::proposal::BridgeParams {
                bridge_workers: vec!["air1w".into()],
                bridge_contract_address: "0xc0".into(),
            },
            Default::default(),
            "QmCid".into(),
        );
        StateFile::new(settings.state_path()).save(&state).unwrap();
        state
    }

    #[test]
    fn invalid_vote_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let runner = Scripted::default();
        let flag = AtomicBool::new(false);
        let mut operator = Operator::new(&settings, &runner, console(""), &flag);
        let err = operator.vote_command("1", "maybe").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidVoteOption(_)));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn prompting_keyring_gets_a_plain_line_instead_of_a_spinner() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        let runner = Scripted::default();
        let flag = AtomicBool::new(false);
        for (backend, announced) in [("os", true), ("file", true), ("test", false)] {
            settings.keyring_backend = backend.into();
            let mut operator = Operator::new(&settings, &runner, console(""), &flag);
            operator.vote_command("3", "yes").unwrap();
            let output = String::from_utf8(operator.into_console().into_output()).unwrap();
            assert_eq!(output.contains("Voting..."), announced, "{backend}: {output}");
            assert!(output.contains("Voted yes on proposal 3 (tx ABC)"), "{output}");
        }
    }

    #[test]
    fn non_numeric_proposal_id_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let runner = Scripted::default();
        let flag = AtomicBool::new(false);
        let mut operator = Operator::new(&settings, &runner, console(""), &flag);
        for bad in ["first", "", "-1", "1.5", " 2"] {
            let err = operator.vote_command(bad, "yes").unwrap_err();
            assert!(
                matches!(err, BridgeError::InvalidInput(ref msg) if msg == &format!("invalid proposal id: {bad}")),
                "{bad}: {err}"
            );
        }
        let err = operator.vote_command("first", "maybe").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidVoteOption(_)));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_vote_option_from_environment_stops_before_voting() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.vote_option = Some("perhaps".into());
        let state = saved_state(&settings);
        let runner = Scripted {
            query_output: r#"{"proposals":[{"id":"3"}]}"#.into(),
            ..Default::default()
        };
        let flag = AtomicBool::new(false);
        let mut operator = Operator::new(&settings, &runner, console("y\n"), &flag);
        let err = operator.submit_phase(&state, &Ended).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidVoteOption(_)));
        assert!(!runner.subcommands().iter().any(|c| c == "tx gov vote"));
    }

    #[test]
    fn declining_submission_clears_state() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let state = saved_state(&settings);
        let runner = Scripted::default();
        let flag = AtomicBool::new(false);
        let mut operator = Operator::new(&settings, &runner, console("n\n"), &flag);
        assert_eq!(
            operator.submit_phase(&state, &Ended).unwrap(),
            SubmitOutcome::Skipped
        );
        assert!(runner.calls.lock().unwrap().is_empty());
        assert!(!settings.state_path().exists());
    }

    #[test]
    fn submit_phase_submits_votes_and_monitors() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        fs::write(settings.proposal_path(), "{}").unwrap();
        let state = saved_state(&settings);
        let runner = Scripted {
            query_output: r#"{"proposals":[{"id":"2"},{"id":"3"}]}"#.into(),
            ..Default::default()
        };
        let flag = AtomicBool::new(false);
        let mut operator = Operator::new(&settings, &runner, console("y\nno\n"), &flag);

        let outcome = operator.submit_phase(&state, &Ended).unwrap();
        assert_eq!(outcome, SubmitOutcome::Completed { proposal_id: 3 });
        assert_eq!(
            runner.subcommands(),
            vec!["tx gov submit-proposal", "query gov proposals", "tx gov vote"]
        );
        let vote = runner.calls.lock().unwrap()[2].clone();
        assert_eq!(&vote[3..5], ["3", "no"]);
        assert!(!settings.state_path().exists());
        let shown = String::from_utf8(operator.into_console().into_output()).unwrap();
        assert!(shown.contains("VOTING PERIOD COMPLETED"));
    }

    #[test]
    fn missing_proposal_id_is_asked_for() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let runner = Scripted::default();
        let flag = AtomicBool::new(false);
        let mut operator = Operator::new(&settings, &runner, console("abc\n7\n"), &flag);
        assert_eq!(operator.submit().unwrap(), 7);
        let shown = String::from_utf8(operator.into_console().into_output()).unwrap();
        assert!(shown.contains("abc is not a proposal id"));
    }

    #[test]
    fn walkthrough_dispatches_on_saved_phase() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let state = saved_state(&settings);
        let runner = Scripted::default();
        let flag = AtomicBool::new(false);
        let mut operator = Operator::new(&settings, &runner, console("n\n"), &flag);
        assert_eq!(
            operator.walkthrough(&Ended).unwrap(),
            WalkthroughStep::Submitted(SubmitOutcome::Skipped)
        );
        let shown = String::from_utf8(operator.into_console().into_output()).unwrap();
        assert!(shown.contains(&state.contract_address));
    }
}
