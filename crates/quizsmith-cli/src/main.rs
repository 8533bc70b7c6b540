use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use quizsmith_core::{
    find_open_date, reconcile_record, validate_record, validate_set, ApprovalSet, QuestionStore,
    QuizDate, RecordDraft, Repair, DEFAULT_PROBE_LIMIT, SET_SIZE,
};
use quizsmith_pipeline::{
    AccessGate, Generator, HttpClientConfig, HttpCompletionClient, StaticGate,
};
use quizsmith_store_sqlite::SqliteStore;
use serde_json::json;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "qz")]
#[command(about = "QuizSmith daily trivia pipeline CLI")]
struct Cli {
    #[arg(long, default_value = "./quizsmith.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Date-slot search against the shared store.
    Slot {
        #[command(subcommand)]
        command: SlotCommand,
    },
    /// Generate a themed batch through the completion endpoint and write
    /// it to a review file.
    Generate(GenerateArgs),
    /// Validate a reviewed batch file and commit it atomically.
    Upload(UploadArgs),
    /// Per-date and per-tag counts over every committed record.
    Stats,
}

#[derive(Debug, Subcommand)]
enum SlotCommand {
    /// Find the first day with no committed records.
    Find {
        /// Canonical YYYY-MM-DD start date; defaults to today (UTC).
        #[arg(long)]
        start: Option<String>,
        #[arg(long, default_value_t = DEFAULT_PROBE_LIMIT)]
        probe_limit: usize,
    },
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    theme: String,
    /// Text-completion endpoint accepting {"prompt": ...} and returning
    /// {"text": ...}.
    #[arg(long)]
    endpoint: String,
    #[arg(long, default_value_t = SET_SIZE)]
    count: usize,
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
    /// Target date; found via slot search when omitted.
    #[arg(long)]
    date: Option<String>,
    /// Where to write the reviewable batch JSON.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct UploadArgs {
    /// Reviewed batch file: a JSON array of record objects.
    #[arg(long)]
    file: PathBuf,
    /// Target date; found via slot search from --start when omitted.
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    start: Option<String>,
    /// Assert the externally resolved elevated-access verdict.
    #[arg(long)]
    elevated: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let mut store = SqliteStore::open(&cli.db)?;
    store.migrate()?;

    match cli.command {
        Command::Slot { command } => run_slot(&store, command),
        Command::Generate(args) => run_generate(&store, &args),
        Command::Upload(args) => run_upload(&mut store, &args),
        Command::Stats => run_stats(&store),
    }
}

fn run_slot(store: &SqliteStore, command: SlotCommand) -> Result<()> {
    match command {
        SlotCommand::Find { start, probe_limit } => {
            let start = parse_or_today(start.as_deref())?;
            let found = find_open_date(store, start, probe_limit)?;
            print_json(&json!({
                "contract": CLI_CONTRACT_VERSION,
                "command": "slot.find",
                "start": start.to_string(),
                "date": found.to_string(),
            }))
        }
    }
}

fn run_generate(store: &SqliteStore, args: &GenerateArgs) -> Result<()> {
    let date = match &args.date {
        Some(raw) => QuizDate::parse(raw)?,
        None => find_open_date(store, QuizDate::today(), DEFAULT_PROBE_LIMIT)?,
    };

    let client = HttpCompletionClient::new(HttpClientConfig {
        endpoint: args.endpoint.clone(),
        timeout_secs: args.timeout_secs,
    });
    let generator = Generator::new(client);
    let generated = generator.generate_set(&args.theme, date, args.count)?;

    let pretty = serde_json::to_string_pretty(generated.set.records())
        .context("failed to serialize generated batch")?;
    fs::write(&args.out, pretty)
        .with_context(|| format!("failed to write batch file {}", args.out.display()))?;

    print_json(&json!({
        "contract": CLI_CONTRACT_VERSION,
        "command": "generate",
        "run_id": generated.run_id.to_string(),
        "date": date.to_string(),
        "count": generated.set.len(),
        "repairs": repair_summaries(&generated.repairs),
        "out": args.out.display().to_string(),
    }))
}

fn run_upload(store: &mut SqliteStore, args: &UploadArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read batch file {}", args.file.display()))?;
    let payload: serde_json::Value =
        serde_json::from_str(&raw).context("batch file is not valid JSON")?;
    let values = payload
        .as_array()
        .ok_or_else(|| anyhow!("batch file must hold a JSON array of records"))?;

    let mut drafts: Vec<RecordDraft> = Vec::with_capacity(values.len());
    let mut repairs: Vec<Repair> = Vec::new();
    for (index, value) in values.iter().enumerate() {
        let position = index + 1;
        let mut draft = validate_record(value, position)?;
        if let Some(repair) = reconcile_record(&mut draft, position)? {
            repairs.push(repair);
        }
        drafts.push(draft);
    }

    // The review step is the operator editing the file; every record in
    // it counts as approved, and the gate below still insists the set is
    // complete before any commit is attempted.
    let mut approvals = ApprovalSet::new(drafts.len());
    for position in 0..drafts.len() {
        approvals.approve(position);
    }
    ensure!(
        approvals.is_complete(),
        "every record must be approved before upload"
    );

    let target = match (&args.date, &args.start) {
        (Some(raw), _) => QuizDate::parse(raw)?,
        (None, start) => find_open_date(store, parse_or_today(start.as_deref())?, DEFAULT_PROBE_LIMIT)?,
    };

    let set = validate_set(&drafts, target, SET_SIZE)?;
    let gate = StaticGate::new(args.elevated);
    let receipt = quizsmith_pipeline::upload_set(
        store,
        gate.has_elevated_access("cli-operator"),
        &set,
        &target.to_string(),
    )?;

    print_json(&json!({
        "contract": CLI_CONTRACT_VERSION,
        "command": "upload",
        "date": receipt.date,
        "committed": receipt.committed_questions,
        "tag_index_entries": receipt.tag_index_entries,
        "batch_digest": receipt.batch_digest,
        "repairs": repair_summaries(&repairs),
        "confirmation": receipt.confirmation,
    }))
}

fn run_stats(store: &SqliteStore) -> Result<()> {
    let records = store.list_all_records().map_err(|err| anyhow!("{err}"))?;

    let mut by_date = std::collections::BTreeMap::<String, usize>::new();
    let mut by_tag = std::collections::BTreeMap::<String, usize>::new();
    for record in &records {
        *by_date.entry(record.date.to_string()).or_default() += 1;
        for tag in &record.tags {
            *by_tag.entry(tag.clone()).or_default() += 1;
        }
    }

    print_json(&json!({
        "contract": CLI_CONTRACT_VERSION,
        "command": "stats",
        "total_records": records.len(),
        "days": by_date,
        "tags": by_tag,
    }))
}

fn parse_or_today(raw: Option<&str>) -> Result<QuizDate> {
    match raw {
        Some(raw) => Ok(QuizDate::parse(raw)?),
        None => Ok(QuizDate::today()),
    }
}

fn repair_summaries(repairs: &[Repair]) -> Vec<serde_json::Value> {
    repairs
        .iter()
        .map(|repair| {
            json!({
                "position": repair.position,
                "rule": repair.rule.as_str(),
                "reported": repair.reported,
                "resolved": repair.resolved,
            })
        })
        .collect()
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
