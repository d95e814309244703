use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

use vat_verify::{
    clean_identifier, session_id_for, BatchReport, BatchValidator, Candidate, CheckpointStore,
    EngineConfig, Outcome, RequesterIdentity, SessionId,
};

const DEFAULT_CHECKPOINT_DB: &str = "vat-verify-checkpoint.db";

const USAGE: &str = "Usage:
  vat-verify validate <input.csv> [--requester DK12345678] [--config config.json]
                                  [--checkpoint-db path] [--output results.csv]
  vat-verify sessions [--checkpoint-db path]
  vat-verify discard <session-id> [--checkpoint-db path]";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = CliOptions::parse(&args)?;

    match options.command.as_str() {
        "validate" => run_validate(&options).await,
        "sessions" => run_sessions(&options),
        "discard" => run_discard(&options),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

// ============================================================================
// ARGUMENTS
// ============================================================================

#[derive(Debug, Default)]
struct CliOptions {
    command: String,
    positional: Option<String>,
    requester: Option<String>,
    config: Option<PathBuf>,
    checkpoint_db: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl CliOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = CliOptions::default();
        let mut iter = args.iter();

        options.command = iter.next().cloned().unwrap_or_default();

        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .cloned()
                    .with_context(|| format!("{} needs a value", flag))
            };

            match arg.as_str() {
                "--requester" => options.requester = Some(value(arg)?),
                "--config" => options.config = Some(PathBuf::from(value(arg)?)),
                "--checkpoint-db" => options.checkpoint_db = Some(PathBuf::from(value(arg)?)),
                "--output" => options.output = Some(PathBuf::from(value(arg)?)),
                flag if flag.starts_with("--") => bail!("Unknown option: {}\n\n{}", flag, USAGE),
                _ if options.positional.is_none() => options.positional = Some(arg.clone()),
                _ => bail!("Unexpected argument: {}\n\n{}", arg, USAGE),
            }
        }

        Ok(options)
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_db
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_DB))
    }
}

// ============================================================================
// VALIDATE
// ============================================================================

async fn run_validate(options: &CliOptions) -> Result<()> {
    let Some(input) = options.positional.as_deref() else {
        bail!("validate needs an input file\n\n{}", USAGE);
    };

    println!("🔎 VAT Verify {} - Bulk registration check", vat_verify::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Configuration
    let mut config = match &options.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env_overrides()?;

    let requester = match options.requester.as_deref() {
        Some(raw) => Some(
            RequesterIdentity::from_raw(raw)
                .with_context(|| format!("Not a VAT number: {}", raw))?,
        ),
        None => None,
    };

    // 2. Load candidates
    println!("\n📂 Loading candidates...");
    let candidates = load_candidates(Path::new(input))?;
    println!("✓ Loaded {} rows from {}", candidates.len(), input);

    // 3. Checkpoint
    let session = session_id_for(&candidates);
    let store = Arc::new(CheckpointStore::open(&options.checkpoint_path(), session.clone())?);
    println!("✓ Checkpoint session {}", session);

    // 4. Validate
    println!(
        "\n🚀 Validating with {} workers{}...",
        config.concurrency,
        if requester.is_some() { " (authenticated)" } else { "" }
    );
    let validator = BatchValidator::new(config)?.with_checkpoint(store);

    let report = validator
        .validate_batch_with_progress(candidates, requester, |progress| {
            eprint!(
                "\r⏳ {}/{} ({:.0}%) - est. {} remaining   ",
                progress.completed,
                progress.total,
                progress.percent(),
                progress.eta_label()
            );
            let _ = std::io::stderr().flush();
        })
        .await;
    eprintln!();

    print_report(&report);

    if let Some(path) = &options.output {
        write_results(path, &report)?;
        println!("\n💾 Results written to {}", path.display());
    }

    Ok(())
}

/// First column: raw VAT string; optional second column: declared name
fn load_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let mut candidates = Vec::new();
    for (index, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("Failed to read CSV row {}", index + 2))?;
        let raw = row.get(0).unwrap_or_default();
        let declared = row.get(1).map(|s| s.to_string());

        // Unparseable input still gets a row in the report (as a format error)
        let candidate = Candidate::from_raw(index, raw, declared.clone()).unwrap_or_else(|| {
            let mut candidate = Candidate::new(index, &clean_identifier(raw), "");
            candidate.declared_name = declared.filter(|n| !n.is_empty());
            candidate
        });
        candidates.push(candidate);
    }

    Ok(candidates)
}

fn print_report(report: &BatchReport) {
    println!("\n📋 Results");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for record in &report.records {
        let icon = match record.outcome {
            Outcome::Valid { .. } => "✅",
            Outcome::Invalid { .. } | Outcome::InvalidFormat { .. } => "❌",
            Outcome::ServiceUnavailable { .. } | Outcome::Error { .. } => "⚠️ ",
        };
        println!("{} {}", icon, record.summary());
    }

    for duplicate in &report.duplicates {
        println!(
            "↩️  #{} {} duplicate of #{}",
            duplicate.origin_index + 1,
            duplicate.identifier,
            duplicate.first_index + 1
        );
    }

    let summary = &report.summary;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ {}", summary.summary());
    if summary.resumed > 0 {
        println!("✓ {} restored from checkpoint", summary.resumed);
    }
    if summary.verified_names + summary.check_manually + summary.potential_fraud > 0 {
        println!(
            "✓ Name checks: {} verified, {} check manually, {} potential fraud",
            summary.verified_names, summary.check_manually, summary.potential_fraud
        );
    }
    if !report.tripped_countries.is_empty() {
        println!(
            "⚠️  Reduced retries for: {}",
            report.tripped_countries.join(", ")
        );
    }
    if summary.uncertain() > 0 {
        println!("⚠️  {} results are uncertain - run again later", summary.uncertain());
    }
    println!(
        "🎉 Done in {}",
        vat_verify::format_duration(report.elapsed)
    );
}

#[derive(Serialize)]
struct ResultRow<'a> {
    #[serde(rename = "No.")]
    number: usize,
    #[serde(rename = "Country")]
    country: &'a str,
    #[serde(rename = "VAT Registration No.")]
    vat: String,
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Name (VIES)")]
    registry_name: &'a str,
    #[serde(rename = "Declared Name")]
    declared_name: &'a str,
    #[serde(rename = "Name Match")]
    name_match: String,
    #[serde(rename = "Risk")]
    risk: &'static str,
    #[serde(rename = "Consultation ID")]
    consultation_id: &'a str,
    #[serde(rename = "Details")]
    details: String,
}

fn write_results(path: &Path, report: &BatchReport) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    for record in &report.records {
        let consultation_id = match &record.outcome {
            Outcome::Valid {
                consultation_id: Some(id),
                ..
            } => id.as_str(),
            _ => "",
        };

        wtr.serialize(ResultRow {
            number: record.origin_index + 1,
            country: &record.country_code,
            vat: format!("{}{}", record.country_code, record.number),
            status: record.outcome.label(),
            registry_name: record.outcome.registry_name().unwrap_or("---"),
            declared_name: record.declared_name.as_deref().unwrap_or(""),
            name_match: record
                .fraud
                .map(|f| f.score.to_string())
                .unwrap_or_default(),
            risk: record.fraud.map(|f| f.risk.as_str()).unwrap_or(""),
            consultation_id,
            details: record.outcome.detail(),
        })?;
    }

    wtr.flush()?;
    Ok(())
}

// ============================================================================
// CHECKPOINT SESSIONS
// ============================================================================

fn run_sessions(options: &CliOptions) -> Result<()> {
    let store = CheckpointStore::open(&options.checkpoint_path(), SessionId::fresh())?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("✓ No retained checkpoints");
        return Ok(());
    }

    println!("💾 Retained checkpoints");
    for session in sessions {
        println!(
            "  {} | {}/{} done | saved {}",
            session.session_id,
            session.completed,
            session.total_count,
            session.saved_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn run_discard(options: &CliOptions) -> Result<()> {
    let Some(id) = options.positional.as_deref() else {
        bail!("discard needs a session id\n\n{}", USAGE);
    };

    let store = CheckpointStore::open(&options.checkpoint_path(), SessionId::fresh())?;
    if store.discard(&SessionId::new(id))? {
        println!("✓ Discarded checkpoint {}", id);
    } else {
        println!("❌ No checkpoint named {}", id);
    }
    Ok(())
}
