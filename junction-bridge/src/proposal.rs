use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::BridgeResult;
use crate::prompt::Console;

pub const PLACEHOLDER_WORKER: &str = "air1h58eezgk5j4jwwpk3nxggx63gfuhnfcj78z5vj";
pub const PLACEHOLDER_CONTRACT: &str = "0xd47248E2f6C725Dd20C82893162aA545C345834e";
pub const DEFAULT_TITLE: &str = "Update EVM Bridge Authorized Unlockers";
pub const DEFAULT_SUMMARY: &str = "This proposal aims to update the EVM bridge authorized unlockers list and add new bridge contract addresses to enhance the bridge's security and functionality.";
pub const DEFAULT_DETAILS: &str =
    "Updates the evmbridge module parameters: authorized bridge workers and the bridge contract address.";

/// Splits a comma-separated address list, trimming each entry and keeping
/// order. Only an entirely blank input yields an empty list.
pub fn parse_worker_list(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|entry| entry.trim().to_string()).collect()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeParams {
    pub bridge_workers: Vec<String>,
    pub bridge_contract_address: String,
}

/// Human-facing proposal text collected from the operator.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalFields {
    pub title: String,
    pub summary: String,
    pub details: String,
    pub forum_url: String,
}

/// Off-chain metadata in the layout gov v1 clients expect.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalMetadata {
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub details: String,
    pub proposal_forum_url: String,
    pub vote_option_context: String,
}

impl ProposalMetadata {
    pub fn from_fields(fields: &ProposalFields, author: &str) -> Self {
        Self {
            title: fields.title.clone(),
            authors: vec![author.to_string()],
            summary: fields.summary.clone(),
            details: fields.details.clone(),
            proposal_forum_url: fields.forum_url.clone(),
            vote_option_context: "yes: apply the new bridge parameters; no: keep the current ones"
                .to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalMessage {
    #[serde(rename = "@type")]
    pub type_url: String,
    pub authority: String,
    pub params: BridgeParams,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalDocument {
    pub messages: Vec<ProposalMessage>,
    pub metadata: String,
    pub deposit: String,
    pub title: String,
    pub summary: String,
    pub expedited: bool,
}

impl ProposalDocument {
    pub fn build(settings: &Settings, params: BridgeParams, fields: &ProposalFields, cid: &str) -> Self {
        Self {
            messages: vec![ProposalMessage {
                type_url: settings.proposal_msg_type.clone(),
                authority: settings.proposal_authority.clone(),
                params,
            }],
            metadata: format!("ipfs://{cid}"),
            deposit: settings.proposal_deposit.clone(),
            title: fields.title.clone(),
            summary: fields.summary.clone(),
            expedited: settings.expedited,
        }
    }
}

/// Strips whitespace and a pasted `ipfs://` scheme.
pub fn normalize_cid(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("ipfs://")
        .unwrap_or(trimmed)
        .trim_matches('/')
        .to_string()
}

/// Cheap shape check: CIDv0 is `Qm` plus 44 base58 characters, CIDv1 is
/// multibase base32 starting with `b`. Never used to reject input.
pub fn looks_like_cid(cid: &str) -> bool {
    const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    if cid.starts_with("Qm") {
        return cid.len() == 46 && cid.chars().all(|c| BASE58.contains(c));
    }
    if let Some(body) = cid.strip_prefix('b') {
        return body.len() >= 50
            && body
                .chars()
                .all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c));
    }
    false
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> BridgeResult<()> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data)?;
    Ok(())
}

/// Where `metadata.json` came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataSource {
    Draft,
    Generated,
}

/// A `draft_metadata.json` in the working directory wins over the collected
/// fields and is copied verbatim.
pub fn write_metadata(settings: &Settings, fields: &ProposalFields) -> BridgeResult<MetadataSource> {
    let draft = settings.draft_metadata_path();
    let target = settings.metadata_path();
    if draft.is_file() {
        fs::copy(&draft, &target)?;
        info!(path = %target.display(), "metadata copied from draft template");
        return Ok(MetadataSource::Draft);
    }
    let metadata = ProposalMetadata::from_fields(fields, settings.proposer());
    write_json(&target, &metadata)?;
    info!(path = %target.display(), "metadata written");
    Ok(MetadataSource::Generated)
}

pub fn collect_bridge_params<I: BufRead, O: Write>(
    console: &mut Console<I, O>,
    settings: &Settings,
) -> BridgeResult<BridgeParams> {
    let bridge_workers = match &settings.bridge_workers {
        Some(workers) => {
            console.say(format!(
                "Bridge workers: {} (from environment)",
                workers.join(", ")
            ))?;
            workers.clone()
        }
        None => {
            let answer = console.ask("Bridge worker addresses (comma-separated)", "")?;
            let workers = parse_worker_list(&answer);
            if workers.is_empty() {
                console.say(format!("No workers given, using test worker {PLACEHOLDER_WORKER}"))?;
                vec![PLACEHOLDER_WORKER.to_string()]
            } else {
                workers
            }
        }
    };
    let bridge_contract_address = console.ask_or(
        settings.bridge_contract_address.as_deref(),
        "Bridge contract address",
        PLACEHOLDER_CONTRACT,
    )?;
    Ok(BridgeParams {
        bridge_workers,
        bridge_contract_address,
    })
}

pub fn collect_fields<I: BufRead, O: Write>(
    console: &mut Console<I, O>,
    settings: &Settings,
) -> BridgeResult<ProposalFields> {
    Ok(ProposalFields {
        title: console.ask_or(settings.proposal_title.as_deref(), "Proposal title", DEFAULT_TITLE)?,
        summary: console.ask_or(
            settings.proposal_summary.as_deref(),
            "Proposal summary",
            DEFAULT_SUMMARY,
        )?,
        details: console.ask_or(
            settings.proposal_details.as_deref(),
            "Proposal details",
            DEFAULT_DETAILS,
        )?,
        forum_url: console.ask_or(settings.proposal_forum_url.as_deref(), "Forum URL", "")?,
    })
}

/// Blocks until the operator has pinned `metadata.json` and supplied its CID.
pub fn obtain_cid<I: BufRead, O: Write>(
    console: &mut Console<I, O>,
    settings: &Settings,
) -> BridgeResult<String> {
    let cid = match settings.ipfs_cid.as_deref() {
        Some(cid) => {
            console.say(format!("IPFS CID: {cid} (from environment)"))?;
            normalize_cid(cid)
        }
        None => {
            console.say("Upload metadata.json to IPFS (e.g. `ipfs add metadata.json`) and paste the CID.")?;
            loop {
                let cid = normalize_cid(&console.ask_required("Enter IPFS CID")?);
                if !cid.is_empty() {
                    break cid;
                }
            }
        }
    };
    if !looks_like_cid(&cid) {
        warn!(%cid, "CID does not look like a standard v0 or v1 CID, continuing anyway");
        console.say(format!("Warning: {cid} does not look like a standard IPFS CID"))?;
    }
    Ok(cid)
}
