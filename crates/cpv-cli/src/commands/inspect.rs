//! Primitive-level subcommands: `hash-event`, `completeness`, `merkle` and
//! `inspect-token`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Args;
use cpv_core::cancel::CancellationToken;
use cpv_core::canonical::parse_strict;
use cpv_core::completeness::{CompletenessChecker, CompletenessInvariant};
use cpv_core::crypto;
use cpv_core::event::{Event, EventHasher};
use cpv_core::merkle::{LEAF_HASH_METHOD, MerkleTree};
use cpv_core::tsa::{DerTimestampTokenParser, TimestampTokenParser, token_der};
use serde::Serialize;
use tracing::info;

use super::{OutputFormat, exit_codes, print_json, read_text};

/// Arguments for `cpv hash-event`.
#[derive(Debug, Args)]
pub struct HashEventArgs {
    /// Event JSON file
    pub event: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for `cpv completeness`.
#[derive(Debug, Args)]
pub struct CompletenessArgs {
    /// JSON file holding an array of events
    pub events: PathBuf,

    /// Check the events against this recorded invariant instead of
    /// printing a new one
    #[arg(long)]
    pub check: Option<PathBuf>,
}

/// Arguments for `cpv merkle`.
#[derive(Debug, Args)]
pub struct MerkleArgs {
    /// Event hashes, `sha256:`-prefixed or bare hex, in batch order
    #[arg(required = true)]
    pub hashes: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for `cpv inspect-token`.
#[derive(Debug, Args)]
pub struct InspectTokenArgs {
    /// File with a DER token or response, raw or base64
    pub token: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct EventHashOutput {
    event_id: String,
    canonicalizer: &'static str,
    computed: String,
    stored: Option<String>,
    matches: Option<bool>,
}

/// Computes an event's hash; [`exit_codes::INVALID`] if it differs from the
/// stored `EventHash`.
pub fn hash_event(args: &HashEventArgs) -> Result<u8> {
    let event = Event::from_json_str(&read_text(&args.event)?)
        .with_context(|| format!("failed to parse event {}", args.event.display()))?;
    let hasher = EventHasher::default();
    let computed = hasher.compute(&event).context("failed to hash event")?;

    let matches = event
        .event_hash()
        .map(|stored| crypto::parse_lenient(stored).is_ok_and(|h| crypto::digests_equal(&h, &computed)));
    let output = EventHashOutput {
        event_id: event.event_id().to_string(),
        canonicalizer: hasher.canonicalizer_id(),
        computed: crypto::to_prefixed(&computed),
        stored: event.event_hash().map(str::to_string),
        matches,
    };

    match args.format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Text => {
            println!("{}", output.computed);
            match (&output.stored, output.matches) {
                (Some(stored), Some(false)) => println!("stored {stored} DIFFERS"),
                (Some(_), _) => println!("stored EventHash matches"),
                (None, _) => {},
            }
        },
    }

    Ok(if matches == Some(false) {
        exit_codes::INVALID
    } else {
        exit_codes::SUCCESS
    })
}

fn read_events(path: &std::path::Path) -> Result<Vec<Event>> {
    let value = parse_strict(&read_text(path)?)
        .with_context(|| format!("malformed JSON in {}", path.display()))?;
    let serde_json::Value::Array(items) = value else {
        bail!("{} must hold a JSON array of events", path.display());
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| Event::from_value(item).with_context(|| format!("event {i}")))
        .collect()
}

/// Prints the invariant for a set of events, or checks it against a
/// recorded one.
pub fn completeness(args: &CompletenessArgs) -> Result<u8> {
    let events = read_events(&args.events)?;
    let cancel = CancellationToken::none();

    let Some(recorded) = &args.check else {
        let invariant = CompletenessInvariant::compute(&events, &cancel)
            .context("failed to compute invariant")?;
        print_json(&invariant)?;
        return Ok(exit_codes::SUCCESS);
    };

    let invariant: CompletenessInvariant = serde_json::from_str(&read_text(recorded)?)
        .with_context(|| format!("malformed invariant {}", recorded.display()))?;
    match CompletenessChecker.check(&events, &invariant, &cancel) {
        Ok(()) => {
            info!(count = events.len(), "completeness invariant holds");
            println!("VALID: {} events match the recorded invariant", events.len());
            Ok(exit_codes::SUCCESS)
        },
        Err(e) => {
            println!("INVALID [{}]: {e}", e.code());
            Ok(exit_codes::INVALID)
        },
    }
}

#[derive(Debug, Serialize)]
struct MerkleLeafOutput {
    index: usize,
    event_hash: String,
    leaf_hash: String,
    proof: Vec<String>,
}

#[derive(Debug, Serialize)]
struct MerkleOutput {
    tree_size: usize,
    leaf_hash_method: &'static str,
    root: String,
    anchor_digest: String,
    leaves: Vec<MerkleLeafOutput>,
}

/// Builds a tree over the given hashes and prints the root and every proof.
pub fn merkle(args: &MerkleArgs) -> Result<u8> {
    let hashes = args
        .hashes
        .iter()
        .map(|h| crypto::parse_lenient(h).with_context(|| format!("invalid hash '{h}'")))
        .collect::<Result<Vec<_>>>()?;
    let tree = MerkleTree::build(&hashes, &CancellationToken::none())?;
    let root = tree.root();

    let leaves = hashes
        .iter()
        .enumerate()
        .map(|(index, hash)| {
            let proof = tree.proof(index)?;
            Ok(MerkleLeafOutput {
                index,
                event_hash: crypto::to_prefixed(hash),
                leaf_hash: crypto::to_prefixed(&cpv_core::merkle::leaf_hash(hash)),
                proof: proof.siblings_prefixed(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let output = MerkleOutput {
        tree_size: tree.tree_size(),
        leaf_hash_method: LEAF_HASH_METHOD,
        root: crypto::to_prefixed(&root),
        anchor_digest: crypto::to_bare_hex(&root),
        leaves,
    };

    match args.format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Text => {
            println!("root {}", output.root);
            for leaf in &output.leaves {
                println!("{} {} [{}]", leaf.index, leaf.event_hash, leaf.proof.join(", "));
            }
        },
    }
    Ok(exit_codes::SUCCESS)
}

/// Raw DER, or base64 text of it.
fn token_bytes(raw: Vec<u8>) -> Vec<u8> {
    if raw.first() == Some(&0x30) {
        return raw;
    }
    std::str::from_utf8(&raw)
        .ok()
        .and_then(|text| {
            let compact: String = text.split_whitespace().collect();
            BASE64.decode(compact).ok()
        })
        .unwrap_or(raw)
}

/// Decodes a time-stamp token and prints its imprint and time.
pub fn inspect_token(args: &InspectTokenArgs) -> Result<u8> {
    let raw = std::fs::read(&args.token)
        .with_context(|| format!("failed to read {}", args.token.display()))?;
    let bytes = token_bytes(raw);
    let parsed = token_der(&bytes)
        .and_then(|der| DerTimestampTokenParser.parse(der))
        .context("failed to parse time-stamp token")?;

    match args.format {
        OutputFormat::Json => print_json(&parsed)?,
        OutputFormat::Text => {
            println!("hash algorithm {}", parsed.hash_algorithm);
            println!("imprint        {}", parsed.hashed_message_hex());
            println!("gen time       {}", parsed.gen_time.to_rfc3339());
            println!("policy         {}", parsed.policy);
            println!("serial         {}", hex::encode(&parsed.serial_number));
            if let Some(nonce) = &parsed.nonce {
                println!("nonce          {}", hex::encode(nonce));
            }
        },
    }
    Ok(exit_codes::SUCCESS)
}
