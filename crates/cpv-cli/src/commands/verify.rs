//! `cpv verify`: verify proof bundles against the configured policy.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use cpv_core::bundle::ProofBundle;
use cpv_core::cancel::CancellationToken;
use cpv_core::config::VerifierConfig;
use cpv_core::tsa::TrustOutcome;
use cpv_core::verify::{CheckResult, VerificationReport, Verifier};
use serde::Serialize;

use super::{OutputFormat, exit_codes, print_json};

/// Arguments for `cpv verify`.
#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Proof bundle files
    #[arg(required = true)]
    pub bundles: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Serialize)]
struct BundleReport<'a> {
    bundle: String,
    #[serde(flatten)]
    report: &'a VerificationReport,
}

/// Verifies every bundle. Returns [`exit_codes::INVALID`] if any is invalid.
pub fn run(args: &VerifyArgs, config: &VerifierConfig) -> Result<u8> {
    let requests = args
        .bundles
        .iter()
        .map(|path| {
            ProofBundle::from_file(path)
                .map(ProofBundle::into_request)
                .with_context(|| format!("failed to load bundle {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let verifier = Verifier::new(config.verification_policy());
    let reports = verifier
        .verify_many(&requests, &CancellationToken::new())
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .context("verification aborted")?;

    let labelled: Vec<_> = args
        .bundles
        .iter()
        .zip(&reports)
        .map(|(path, report)| BundleReport {
            bundle: path.display().to_string(),
            report,
        })
        .collect();

    match args.format {
        OutputFormat::Json if labelled.len() == 1 => print_json(&labelled[0])?,
        OutputFormat::Json => print_json(&labelled)?,
        OutputFormat::Text => {
            for entry in &labelled {
                print!("{}", render_text(&entry.bundle, entry.report));
            }
        },
    }

    if reports.iter().all(VerificationReport::is_valid) {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::INVALID)
    }
}

fn render_check(out: &mut String, name: &str, check: &CheckResult) {
    let _ = write!(out, "  {name:<16} {}", check.status);
    if let Some(code) = &check.code {
        let _ = write!(out, " [{code}]");
    }
    if let Some(detail) = &check.detail {
        let _ = write!(out, " {detail}");
    }
    out.push('\n');
}

fn render_text(bundle: &str, report: &VerificationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{bundle}");
    let _ = writeln!(out, "  event            {}", report.event_id);
    if let Some(hash) = &report.event_hash {
        let _ = writeln!(out, "  event hash       {hash}");
    }
    render_check(&mut out, "event integrity", &report.event_integrity);
    render_check(&mut out, "chain integrity", &report.chain_integrity);
    render_check(&mut out, "completeness", &report.completeness);
    render_check(&mut out, "anchor", &report.anchor_result);
    if let Some(time) = &report.attested_time {
        let _ = writeln!(out, "  attested time    {}", time.to_rfc3339());
    }
    if let Some(trust) = &report.timestamp_trust {
        let trust = match trust {
            TrustOutcome::Trusted { signer } => format!("trusted ({signer})"),
            TrustOutcome::Untrusted { reason } => format!("untrusted ({reason})"),
            TrustOutcome::NotEvaluated => "not evaluated".to_string(),
        };
        let _ = writeln!(out, "  tsa trust        {trust}");
    }
    for warning in &report.warnings {
        let _ = writeln!(out, "  warning          [{}] {}", warning.check, warning.message);
    }
    let _ = writeln!(
        out,
        "  overall          {}{}",
        report.overall,
        if report.conclusive { " (conclusive)" } else { "" }
    );
    out
}
