use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use junction_bridge::config::ConfigSources;
use junction_bridge::monitor::{MonitorOutcome, RestClient};
use junction_bridge::prompt::stdio;
use junction_bridge::shutdown::install_signal_handler;
use junction_bridge::workflow::{Operator, SubmitOutcome, WalkthroughStep};
use junction_bridge::{CommandRunner, NodeCli, NodeSession, Settings, StateFile, SystemRunner};
use tokio::runtime::Builder as RuntimeBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "junction-bridge",
    version,
    about = "Governance test driver for the junction EVM bridge parameters"
)]
struct Cli {
    /// YAML settings file (default: <workdir>/config.yaml, then ~/.junction-bridge/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// KEY=value file applied before the process environment (default: <workdir>/.env)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    /// Directory holding config.yaml, .env, proposal.json and testing_state.json (default: .)
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,
    #[arg(long, global = true)]
    junctiond_path: Option<PathBuf>,
    #[arg(long, global = true)]
    home_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    rest_endpoint: Option<String>,
    #[arg(long, global = true)]
    keyring_backend: Option<String>,
    #[arg(long, global = true)]
    no_animation: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reset the node home, build genesis and run the node in the foreground
    InitNode {
        #[command(flatten)]
        node: NodeArgs,
    },
    /// Write metadata.json and proposal.json, then submit the proposal
    SubmitProposal {
        #[command(flatten)]
        proposal: ProposalArgs,
    },
    /// Vote on a proposal (yes, no, abstain, no_with_veto)
    Vote {
        /// Numeric proposal id
        proposal_id: String,
        vote_option: String,
        #[arg(long)]
        proposer_key: Option<String>,
        #[arg(long)]
        fees: Option<String>,
    },
    /// Poll proposal status until a voting period ends
    MonitorProposals {
        /// Seconds between polls
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Two-phase run: setup and node start, then submit, vote and monitor
    Walkthrough {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        proposal: ProposalArgs,
    },
}

#[derive(Args, Debug, Default)]
struct NodeArgs {
    #[arg(long)]
    moniker: Option<String>,
    #[arg(long)]
    chain_id: Option<String>,
    #[arg(long)]
    denom: Option<String>,
    #[arg(long)]
    key_name: Option<String>,
    #[arg(long)]
    amount: Option<String>,
    #[arg(long)]
    validator_stake: Option<String>,
    #[arg(long)]
    gas_prices: Option<String>,
    #[arg(long)]
    minimum_gas_prices: Option<String>,
    #[arg(long)]
    voting_period: Option<String>,
}

impl NodeArgs {
    fn overrides(self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("MONIKER", self.moniker),
            ("CHAIN_ID", self.chain_id),
            ("DENOM", self.denom),
            ("KEY_NAME", self.key_name),
            ("AMOUNT", self.amount),
            ("VALIDATOR_STAKE", self.validator_stake),
            ("GAS_PRICES", self.gas_prices),
            ("MINIMUM_GAS_PRICES", self.minimum_gas_prices),
            ("VOTING_PERIOD", self.voting_period),
        ]
    }
}

#[derive(Args, Debug, Default)]
struct ProposalArgs {
    /// Comma-separated bridge worker addresses
    #[arg(long)]
    bridge_workers: Option<String>,
    #[arg(long)]
    bridge_contract_address: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    summary: Option<String>,
    #[arg(long)]
    details: Option<String>,
    #[arg(long)]
    forum_url: Option<String>,
    #[arg(long)]
    ipfs_cid: Option<String>,
    #[arg(long)]
    proposer_key: Option<String>,
    #[arg(long)]
    deposit: Option<String>,
    #[arg(long)]
    fees: Option<String>,
    #[arg(long)]
    vote_option: Option<String>,
}

impl ProposalArgs {
    fn overrides(self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("BRIDGE_WORKERS", self.bridge_workers),
            ("BRIDGE_CONTRACT_ADDRESS", self.bridge_contract_address),
            ("PROPOSAL_TITLE", self.title),
            ("PROPOSAL_SUMMARY", self.summary),
            ("PROPOSAL_DETAILS", self.details),
            ("PROPOSAL_FORUM_URL", self.forum_url),
            ("IPFS_CID", self.ipfs_cid),
            ("PROPOSER_KEY", self.proposer_key),
            ("PROPOSAL_DEPOSIT", self.deposit),
            ("PROPOSAL_FEES", self.fees),
            ("VOTE_OPTION", self.vote_option),
        ]
    }
}

fn apply_overrides(settings: &mut Settings, overrides: Vec<(&'static str, Option<String>)>) {
    for (key, value) in overrides {
        if let Some(value) = value {
            settings.apply_var(key, value);
        }
    }
}

fn load_settings(cli: &Cli) -> Settings {
    let sources = ConfigSources {
        yaml: cli.config.clone(),
        env_file: cli.env_file.clone(),
        workdir: cli.workdir.clone(),
    };
    let mut settings = Settings::load(&sources, std::env::vars());
    apply_overrides(
        &mut settings,
        vec![
            (
                "JUNCTIOND_PATH",
                cli.junctiond_path.as_ref().map(|p| p.display().to_string()),
            ),
            (
                "HOME_DIR",
                cli.home_dir.as_ref().map(|p| p.display().to_string()),
            ),
            ("REST_ENDPOINT", cli.rest_endpoint.clone()),
            ("KEYRING_BACKEND", cli.keyring_backend.clone()),
        ],
    );
    if cli.no_animation {
        settings.animations = false;
    }
    settings
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("junction_bridge=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let mut cli = Cli::parse();
    let mut settings = load_settings(&cli);
    let command = cli.command.take().unwrap_or(Commands::Walkthrough {
        node: NodeArgs::default(),
        proposal: ProposalArgs::default(),
    });

    let runtime = RuntimeBuilder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let session = Arc::new(NodeSession::new(
        runner.clone(),
        StateFile::new(settings.state_path()),
        settings.binary_name(),
    ));
    install_signal_handler(&runtime, session.clone());

    match command {
        Commands::InitNode { node } => {
            apply_overrides(&mut settings, node.overrides());
            let mut operator =
                Operator::new(&settings, runner.as_ref(), stdio(), session.interrupted());
            operator.init_node().context("node setup failed")?;
            run_node(&settings, runner.as_ref(), &session)?;
        }
        Commands::SubmitProposal { proposal } => {
            apply_overrides(&mut settings, proposal.overrides());
            let mut operator =
                Operator::new(&settings, runner.as_ref(), stdio(), session.interrupted());
            let id = operator
                .submit_proposal()
                .context("proposal submission failed")?;
            info!(proposal_id = id, "proposal submitted");
        }
        Commands::Vote {
            proposal_id,
            vote_option,
            proposer_key,
            fees,
        } => {
            apply_overrides(
                &mut settings,
                vec![("PROPOSER_KEY", proposer_key), ("PROPOSAL_FEES", fees)],
            );
            let mut operator =
                Operator::new(&settings, runner.as_ref(), stdio(), session.interrupted());
            operator
                .vote_command(&proposal_id, &vote_option)
                .with_context(|| format!("vote on proposal {proposal_id} failed"))?;
        }
        Commands::MonitorProposals { interval } => {
            if let Some(secs) = interval {
                settings.monitor_interval_secs = secs;
            }
            let client = RestClient::new(&settings.rest_endpoint)
                .with_context(|| format!("invalid REST endpoint {}", settings.rest_endpoint))?;
            let mut operator =
                Operator::new(&settings, runner.as_ref(), stdio(), session.interrupted());
            if let MonitorOutcome::VotingEnded { proposal_id } = operator.monitor(&client) {
                info!(%proposal_id, "voting period ended");
            }
        }
        Commands::Walkthrough { node, proposal } => {
            apply_overrides(&mut settings, node.overrides());
            apply_overrides(&mut settings, proposal.overrides());
            let client = RestClient::new(&settings.rest_endpoint)
                .with_context(|| format!("invalid REST endpoint {}", settings.rest_endpoint))?;
            let mut operator =
                Operator::new(&settings, runner.as_ref(), stdio(), session.interrupted());
            match operator.walkthrough(&client).context("walkthrough failed")? {
                WalkthroughStep::SetupComplete(_) => {
                    drop(operator);
                    run_node(&settings, runner.as_ref(), &session)?;
                }
                WalkthroughStep::Submitted(SubmitOutcome::Completed { proposal_id }) => {
                    println!("✅ Proposal {proposal_id} finished its voting period.");
                }
                WalkthroughStep::Submitted(outcome) => info!(?outcome, "submission ended early"),
            }
        }
    }
    Ok(())
}

fn run_node(settings: &Settings, runner: &dyn CommandRunner, session: &NodeSession) -> Result<()> {
    let start = NodeCli::new(settings, runner).start_invocation();
    println!("🚀 Starting node: {start}");
    session
        .run_node(&start)
        .context("node exited with an error")
}
