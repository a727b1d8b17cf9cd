//! Apiscope CLI

use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use apiscope::config::Config;
use apiscope::latency::{capture_baseline, compare_to_baseline, BaselineRepository, Profiler};
use apiscope::orchestrator::{AnalysisContext, Orchestrator, ProgressUpdate, TaskKind};
use apiscope::schema::SchemaDocument;
use apiscope::session::RecordingSession;
use apiscope::storage::FileStore;
use apiscope::wire;

fn usage() -> ! {
    eprintln!("Apiscope v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: apiscope <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  analyze <session.json> [config.toml]                   Run every enabled analyzer");
    eprintln!("  decode <hex>                                           Decode a protobuf wire payload");
    eprintln!("  baseline capture <session.json> <dir>                  Store a latency baseline");
    eprintln!("  baseline compare <session.json> <dir> <baseline-id>    Compare against a baseline");
    process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let outcome = match (args[1].as_str(), &args[2..]) {
        ("analyze", [session]) => analyze(Path::new(session), None).await,
        ("analyze", [session, config]) => analyze(Path::new(session), Some(Path::new(config))).await,
        ("decode", [hex]) => decode(hex),
        ("baseline", [action, rest @ ..]) => match (action.as_str(), rest) {
            ("capture", [session, dir]) => baseline_capture(Path::new(session), Path::new(dir)),
            ("compare", [session, dir, id]) => {
                baseline_compare(Path::new(session), Path::new(dir), id)
            }
            _ => usage(),
        },
        _ => usage(),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn load_session(path: &Path, config: &Config) -> anyhow::Result<RecordingSession> {
    RecordingSession::from_file(path, &config.limits)
        .with_context(|| format!("Failed to load session {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn analyze(session_path: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let session = Arc::new(load_session(session_path, &config)?);
    let mut context = AnalysisContext::new(Arc::clone(&session));

    if let Some(path) = &config.schema.reference_schema {
        let document = SchemaDocument::from_file(path)
            .with_context(|| format!("Failed to load reference schema {}", path.display()))?;
        context = context.with_reference_schema(document);
    }

    if let Some(dir) = &config.storage.baseline_dir {
        let repository = BaselineRepository::new(FileStore::open(dir)?);
        match repository.load(&session.id) {
            Ok(Some(baseline)) => context = context.with_baseline(baseline),
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable baseline for {}: {}", session.id, e),
        }
    }

    let enabled = &config.orchestrator.enabled_tasks;
    if enabled.contains(&TaskKind::AiTestGeneration) {
        warn!("ai-test-generation needs an external generator; skipping it");
    }
    let enabled: Vec<TaskKind> = enabled
        .iter()
        .copied()
        .filter(|kind| *kind != TaskKind::AiTestGeneration)
        .collect();

    let orchestrator = Orchestrator::with_defaults(&config);
    let on_progress = |update: &ProgressUpdate| {
        info!(
            "{} {:?} -> {:?} ({:.0}% overall)",
            update.transition.kind, update.transition.from, update.transition.to, update.overall
        );
    };

    let result = orchestrator
        .run_with_context(
            context,
            &enabled,
            config.orchestrator.concurrency_limit,
            Some(&on_progress),
        )
        .await
        .context("Analysis run failed")?;

    print_json(&result)
}

fn decode(input: &str) -> anyhow::Result<()> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&compact).context("Input is not valid hex")?;
    let result = wire::decode(&bytes);

    print_json(&result.fields)?;
    println!();
    println!("{}", result.hex_dump);

    if let Some(error) = &result.error {
        bail!("Decoding stopped early: {error}");
    }
    Ok(())
}

fn baseline_repository(dir: &Path) -> anyhow::Result<BaselineRepository<FileStore>> {
    let store = FileStore::open(dir)
        .with_context(|| format!("Failed to open baseline directory {}", dir.display()))?;
    Ok(BaselineRepository::new(store))
}

fn baseline_capture(session_path: &Path, dir: &Path) -> anyhow::Result<()> {
    let config = Config::default();
    let session = load_session(session_path, &config)?;
    let baseline = capture_baseline(&session);

    baseline_repository(dir)?
        .save(&baseline)
        .context("Failed to save baseline")?;
    println!(
        "Captured baseline '{}' ({} endpoints) in {}",
        baseline.session_id,
        baseline.metrics.len(),
        dir.display()
    );
    Ok(())
}

fn baseline_compare(session_path: &Path, dir: &Path, baseline_id: &str) -> anyhow::Result<()> {
    let config = Config::default();
    let session = load_session(session_path, &config)?;
    let Some(baseline) = baseline_repository(dir)?
        .load(baseline_id)
        .context("Failed to load baseline")?
    else {
        bail!("No baseline '{baseline_id}' in {}", dir.display());
    };

    let comparison = compare_to_baseline(&Profiler::new(config.profiler), &session, &baseline);
    print_json(&comparison)?;

    let regressions: Vec<String> = comparison
        .iter()
        .filter(|(_, c)| c.is_regression)
        .map(|(key, c)| format!("{key}: p95 {:.1}ms -> {:.1}ms", c.baseline.p95, c.current.p95))
        .collect();
    if regressions.is_empty() {
        eprintln!("No regressions against baseline '{baseline_id}'");
    } else {
        eprintln!("{} regressions against baseline '{baseline_id}':", regressions.len());
        for line in regressions {
            eprintln!("  {line}");
        }
    }
    Ok(())
}
