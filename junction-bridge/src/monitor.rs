use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::animation::{completion_flourish, BLINK, SPINNER_FRAMES};
use crate::error::{BridgeError, BridgeResult};

const PROPOSALS_PATH: &str = "cosmos/gov/v1/proposals";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ProposalStatus {
    Unspecified,
    DepositPeriod,
    VotingPeriod,
    Passed,
    Rejected,
    Failed,
    Other(String),
}

impl From<String> for ProposalStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "PROPOSAL_STATUS_UNSPECIFIED" => ProposalStatus::Unspecified,
            "PROPOSAL_STATUS_DEPOSIT_PERIOD" => ProposalStatus::DepositPeriod,
            "PROPOSAL_STATUS_VOTING_PERIOD" => ProposalStatus::VotingPeriod,
            "PROPOSAL_STATUS_PASSED" => ProposalStatus::Passed,
            "PROPOSAL_STATUS_REJECTED" => ProposalStatus::Rejected,
            "PROPOSAL_STATUS_FAILED" => ProposalStatus::Failed,
            _ => ProposalStatus::Other(raw),
        }
    }
}

impl ProposalStatus {
    pub fn display(&self) -> String {
        match self {
            ProposalStatus::DepositPeriod => "💰 Deposit Period".to_string(),
            ProposalStatus::VotingPeriod => "🗳️  Voting Period".to_string(),
            ProposalStatus::Passed => "✅ PASSED".to_string(),
            ProposalStatus::Rejected => "❌ REJECTED".to_string(),
            ProposalStatus::Failed => "💥 FAILED".to_string(),
            ProposalStatus::Unspecified => "❓ PROPOSAL_STATUS_UNSPECIFIED".to_string(),
            ProposalStatus::Other(raw) => format!("❓ {raw}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TallyResult {
    #[serde(default)]
    pub yes_count: String,
    #[serde(default)]
    pub no_count: String,
    #[serde(default)]
    pub abstain_count: String,
    #[serde(default)]
    pub no_with_veto_count: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ProposalSnapshot {
    pub id: String,
    pub status: ProposalStatus,
    #[serde(default)]
    pub voting_start_time: Option<String>,
    #[serde(default)]
    pub voting_end_time: Option<String>,
    #[serde(default)]
    pub final_tally_result: TallyResult,
}

impl ProposalSnapshot {
    pub fn voting_end(&self) -> Option<DateTime<Utc>> {
        parse_time(self.voting_end_time.as_deref()?)
    }

    /// Still reported as in voting, but the end time has already passed.
    pub fn voting_ended(&self, now: DateTime<Utc>) -> bool {
        self.status == ProposalStatus::VotingPeriod
            && self.voting_end().is_some_and(|end| end < now)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ProposalList {
    #[serde(default)]
    pub proposals: Vec<ProposalSnapshot>,
}

impl ProposalList {
    pub fn first_ended(&self, now: DateTime<Utc>) -> Option<&ProposalSnapshot> {
        self.proposals.iter().find(|proposal| proposal.voting_ended(now))
    }
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

pub fn format_time(raw: Option<&str>) -> String {
    match raw {
        Some(raw) => parse_time(raw)
            .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| raw.to_string()),
        None => "-".to_string(),
    }
}

pub trait ProposalSource {
    fn fetch(&self) -> BridgeResult<ProposalList>;
}

/// Gov v1 REST client for the node's API server.
#[derive(Clone, Debug)]
pub struct RestClient {
    client: Client,
    base: Url,
}

impl RestClient {
    /// `endpoint` may carry a path prefix (a node behind a reverse proxy).
    /// It is kept: REST paths are joined beneath it.
    pub fn new(endpoint: &str) -> BridgeResult<Self> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| BridgeError::Http(err.to_string()))?;
        Ok(Self { client, base })
    }

    fn proposals_url(&self) -> BridgeResult<Url> {
        let mut url = self.base.join(PROPOSALS_PATH)?;
        url.query_pairs_mut()
            .append_pair("proposal_status", "PROPOSAL_STATUS_UNSPECIFIED");
        Ok(url)
    }

    pub fn proposals(&self) -> BridgeResult<ProposalList> {
        let url = self.proposals_url()?;
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(BridgeError::Http(format!(
                "request failed: {}",
                response.status()
            )));
        }
        Ok(response.json()?)
    }
}

impl ProposalSource for RestClient {
    fn fetch(&self) -> BridgeResult<ProposalList> {
        self.proposals()
    }
}

pub fn render<W: Write>(
    out: &mut W,
    list: &ProposalList,
    now: DateTime<Utc>,
    frame: usize,
    clear: bool,
) -> std::io::Result<()> {
    if clear {
        write!(out, "{CLEAR_SCREEN}")?;
    }
    writeln!(out, "🔍 Governance Proposals Monitor")?;
    writeln!(out, "================================")?;
    if list.proposals.is_empty() {
        let glyph = SPINNER_FRAMES[frame % SPINNER_FRAMES.len()];
        writeln!(out, "{glyph} No proposals found")?;
    }
    for proposal in &list.proposals {
        writeln!(out, "📋 Proposal #{} - {}", proposal.id, proposal.status.display())?;
        if proposal.status == ProposalStatus::VotingPeriod {
            writeln!(
                out,
                "   ⏰ Voting Period: {} to {}",
                format_time(proposal.voting_start_time.as_deref()),
                format_time(proposal.voting_end_time.as_deref())
            )?;
            if let Some(end) = proposal.voting_end().filter(|end| *end > now) {
                let left = (end - now).num_seconds().max(0) as u64;
                writeln!(
                    out,
                    "   ⌛ Remaining: {}",
                    crate::animation::format_mm_ss(left)
                )?;
            }
        }
        let tally = &proposal.final_tally_result;
        writeln!(
            out,
            "   📊 Tally: Yes: {}, No: {}, Abstain: {}, No with Veto: {}",
            tally.yes_count, tally.no_count, tally.abstain_count, tally.no_with_veto_count
        )?;
        writeln!(out)?;
    }
    out.flush()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorOutcome {
    VotingEnded { proposal_id: String },
    Interrupted,
}

/// Fixed-interval poller. No backoff and no retry budget; fetch errors are
/// shown and the next tick tries again.
#[derive(Clone, Debug)]
pub struct Monitor {
    pub interval: Duration,
    pub blink: Duration,
    pub clear_screen: bool,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            blink: BLINK,
            clear_screen: true,
        }
    }
}

impl Monitor {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn run<S, W>(&self, source: &S, out: &mut W, interrupted: &AtomicBool) -> MonitorOutcome
    where
        S: ProposalSource + ?Sized,
        W: Write,
    {
        let mut frame = 0usize;
        loop {
            if interrupted.load(Ordering::SeqCst) {
                return MonitorOutcome::Interrupted;
            }
            match source.fetch() {
                Ok(list) => {
                    let now = Utc::now();
                    let _ = render(out, &list, now, frame, self.clear_screen);
                    if let Some(proposal) = list.first_ended(now) {
                        let _ = writeln!(out, "   🎉 VOTING PERIOD COMPLETED!");
                        completion_flourish(out, self.blink);
                        return MonitorOutcome::VotingEnded {
                            proposal_id: proposal.id.clone(),
                        };
                    }
                }
                Err(err) => {
                    warn!(%err, "failed to fetch proposals");
                    let _ = writeln!(out, "\r❌ Error fetching proposals: {err}");
                }
            }
            frame = frame.wrapping_add(1);
            thread::sleep(self.interval);
        }
    }
}
