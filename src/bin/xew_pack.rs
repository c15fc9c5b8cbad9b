//! Evidence Pack command line.
//!
//! Builds packs from a parsed filing model and verifies existing packs.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `XEW_CONFIG`: engine config JSON (overridden by `--config`)
//! - `XEW_P001_CONFLICT_MODE`: `strict` or `rounded`
//! - `RUST_LOG`: log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Exit codes
//!
//! 0 success, 1 config error, 2 invalid input or failed verification,
//! 3 processing error, 4 system error.
//!
//! ## Usage
//!
//! ```bash
//! xew_pack pack --pack-id acme-10k --out ./pack --cik 123456 \
//!     --accession 0000123456-24-000001 --form 10-K --filed-date 2024-08-01 \
//!     --primary acme-20240630.htm --primary-document-url https://www.sec.gov/... \
//!     --model model.json
//! xew_pack verify --pack ./pack --validate-findings
//! ```

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use xew_evidence_kernel::comparator::HistoryEntry;
use xew_evidence_kernel::{
    verify_pack, AssemblyError, ConfigError, EngineConfig, FilingModel, FilingSnapshot, HistoryFiling,
    PackAssembler, PackRequest, VerifyError, VerifyMode, VerifyOptions,
};

/// Build and verify XEW Evidence Packs.
#[derive(Parser)]
#[command(name = "xew_pack", version, about = "Build and verify XEW Evidence Packs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify a pack against its manifest.
    Verify {
        /// Pack directory.
        #[arg(long)]
        pack: PathBuf,
        /// Check presence and size only.
        #[arg(long)]
        structure_only: bool,
        /// Also check the findings document's schema.
        #[arg(long)]
        validate_findings: bool,
        /// Stop at the first error.
        #[arg(long)]
        fail_fast: bool,
    },
    /// Build a pack for one filing.
    Pack(PackArgs),
}

#[derive(clap::Args)]
struct PackArgs {
    /// Pack id recorded in the manifest.
    #[arg(long)]
    pack_id: String,
    /// Output directory; must be absent or empty.
    #[arg(long)]
    out: PathBuf,
    /// Filer CIK.
    #[arg(long)]
    cik: String,
    /// Accession number.
    #[arg(long)]
    accession: String,
    /// Form type.
    #[arg(long)]
    form: String,
    /// Filing date, YYYY-MM-DD.
    #[arg(long)]
    filed_date: String,
    /// Local primary document.
    #[arg(long)]
    primary: PathBuf,
    /// EDGAR URL of the primary document.
    #[arg(long)]
    primary_document_url: String,
    /// Parsed filing model JSON.
    #[arg(long)]
    model: PathBuf,
    /// Additional artifacts to include.
    #[arg(long = "artifact")]
    artifacts: Vec<PathBuf>,
    /// History JSON: a list of prior filings.
    #[arg(long)]
    history: Option<PathBuf>,
    /// Accession of an explicit comparator from the history.
    #[arg(long)]
    comparator: Option<String>,
    /// Rule-basis map JSON.
    #[arg(long)]
    rule_basis_map: Option<PathBuf>,
    /// Engine config JSON.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Registrant name.
    #[arg(long)]
    issuer_name: Option<String>,
    /// Document period end, YYYY-MM-DD.
    #[arg(long)]
    period_end: Option<String>,
    /// Pin the retrieval timestamp.
    #[arg(long)]
    retrieved_at: Option<String>,
}

/// One prior filing in the history file.
#[derive(Deserialize)]
struct HistoryRecord {
    #[serde(flatten)]
    entry: HistoryEntry,
    #[serde(default)]
    model: Option<PathBuf>,
    #[serde(default)]
    snapshot: Option<FilingSnapshot>,
    #[serde(default)]
    primary_path: Option<PathBuf>,
}

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "xew_pack=info,xew_evidence_kernel=info".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn load_config(explicit: Option<&Path>, rule_basis_map: Option<PathBuf>) -> Result<EngineConfig, ConfigError> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("XEW_CONFIG").map(PathBuf::from));
    let mut config = match path {
        Some(path) => {
            info!(path = %path.display(), "loading engine config");
            EngineConfig::load(&path)?
        }
        None => EngineConfig::default(),
    }
    .with_env_overrides()?;
    if rule_basis_map.is_some() {
        config.rule_basis_map = rule_basis_map;
    }
    Ok(config)
}

fn run_pack(args: PackArgs) -> Result<u8, Box<dyn Error>> {
    let config = load_config(args.config.as_deref(), args.rule_basis_map)?;
    let model: FilingModel = read_json(&args.model)?;

    let records: Vec<HistoryRecord> = match &args.history {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let mut history = Vec::with_capacity(records.len());
    for record in records {
        let mut filing = HistoryFiling::new(record.entry);
        filing.primary_path = record.primary_path;
        filing.snapshot = record.snapshot;
        if let Some(path) = record.model {
            filing.model = Some(read_json(&path)?);
        }
        history.push(filing);
    }
    let comparator = match &args.comparator {
        Some(accession) => Some(
            history
                .iter()
                .find(|h| h.entry.accession.trim() == accession.trim())
                .map(|h| h.entry.clone())
                .unwrap_or_else(|| HistoryEntry::new(accession.clone())),
        ),
        None => None,
    };

    let request = PackRequest {
        pack_id: args.pack_id,
        out_dir: args.out,
        cik: args.cik,
        accession: args.accession,
        form: args.form,
        filed_date: args.filed_date,
        primary_path: args.primary,
        primary_document_url: args.primary_document_url,
        artifacts: args.artifacts,
        model,
        history,
        comparator,
        issuer_name: args.issuer_name,
        period_end: args.period_end,
        retrieved_at: args.retrieved_at,
    };

    let assembler = PackAssembler::from_config(config)?;
    let summary = assembler.assemble(&request)?;
    let out = json!({
        "pack_dir": summary.pack_dir.display().to_string(),
        "pack_sha256": summary.pack_sha256,
        "file_count": summary.file_count,
        "finding_count": summary.finding_count,
        "marker_count": summary.marker_count,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(0)
}

fn run_verify(pack: &Path, options: VerifyOptions) -> Result<u8, Box<dyn Error>> {
    let report = verify_pack(pack, &options)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.passed() { 0 } else { 2 })
}

fn exit_code_for(err: &(dyn Error + 'static)) -> u8 {
    if err.is::<ConfigError>() {
        return 1;
    }
    if err.is::<VerifyError>() || err.is::<serde_json::Error>() {
        return 2;
    }
    if err.is::<std::io::Error>() {
        return 4;
    }
    match err.downcast_ref::<AssemblyError>() {
        Some(
            AssemblyError::Validation(_)
            | AssemblyError::Selection(_)
            | AssemblyError::OutputNotEmpty { .. }
            | AssemblyError::MissingInput { .. },
        ) => 2,
        Some(AssemblyError::Io { .. }) => 4,
        _ => 3,
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    info!(version = env!("CARGO_PKG_VERSION"), "xew_pack starting");

    let result = match cli.command {
        Command::Verify {
            pack,
            structure_only,
            validate_findings,
            fail_fast,
        } => {
            let options = VerifyOptions {
                mode: if structure_only {
                    VerifyMode::StructureOnly
                } else {
                    VerifyMode::Full
                },
                validate_findings,
                fail_fast,
            };
            run_verify(&pack, options)
        }
        Command::Pack(args) => run_pack(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let code = exit_code_for(e.as_ref());
            error!(error = %e, exit_code = code, "xew_pack failed");
            eprintln!("error: {e}");
            ExitCode::from(code)
        }
    }
}
