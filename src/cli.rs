use crate::{
    acquisition::{self, AcquisitionError, AcquisitionSettings, StratumRun},
    config::Config,
    enrich,
    report::{RunManifest, StratumReport, StratumStatus},
    scan::ObservatoryClient,
    source::RankedDomainSource,
    stats, store,
    stratum::{self, Stratum},
    util::{ensure_dir, hash_file, now_rfc3339, sha256_hex},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "observatory-sampler")]
#[command(about = "Sample ranked domains, scan them with the HTTP Observatory, and summarize")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./observatory-sampler.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the seeded sample of every stratum without scanning anything.
    Sample {
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Scan every stratum until its target count of complete results is reached.
    Collect {
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Summary statistics over stored result files.
    Report {
        /// Result files; defaults to the files of the configured analysis.
        #[arg(long = "input")]
        inputs: Vec<PathBuf>,
    },
    /// Dump score and test fields of every domain in a result file.
    Inspect {
        #[arg(long)]
        input: PathBuf,
    },
    /// Add missing `server` response headers by querying each domain directly.
    TagServers {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let mut cfg = if cfg_path.exists() {
        Config::load(&cfg_path)?
    } else {
        Config::default()
    };

    match &args.cmd {
        Command::Sample { seed } => {
            if let Some(seed) = seed {
                cfg.global.seed = *seed;
            }
            let _guard = init_logging(&args, &cfg, None)?;
            sample(&cfg)
        }
        Command::Collect { seed, out_dir } => {
            if let Some(seed) = seed {
                cfg.global.seed = *seed;
            }
            if let Some(dir) = out_dir {
                cfg.paths.results_dir = dir.display().to_string();
            }
            let log_path = resolve_log_path(&cfg);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            collect(&cfg)
        }
        Command::Report { inputs } => {
            let _guard = init_logging(&args, &cfg, None)?;
            report(&cfg, inputs)
        }
        Command::Inspect { input } => {
            let _guard = init_logging(&args, &cfg, None)?;
            inspect(input)
        }
        Command::TagServers { input, output } => {
            let log_path = resolve_log_path(&cfg);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            tag_servers(&cfg, input, output.as_deref())
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        if !p.exists() {
            return Err(anyhow!("config not found: {}", p.display()));
        }
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("observatory-sampler.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("observatory-sampler.example.toml"))
    }
}

/// Where a top-level failure ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSink {
    Log,
    Stderr,
}

/// Failures before logging is up (bad config, unreadable log path) have no
/// subscriber to go through.
pub fn failure_sink() -> FailureSink {
    if tracing::dispatcher::has_been_set() {
        FailureSink::Log
    } else {
        FailureSink::Stderr
    }
}

pub fn report_failure(err: &anyhow::Error) {
    match failure_sink() {
        FailureSink::Log => error!("{:#}", err),
        FailureSink::Stderr => eprintln!("error: {:#}", err),
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(cfg.results_path("observatory-sampler.log"))
}

fn load_source(cfg: &Config) -> Result<RankedDomainSource> {
    let zip = Path::new(&cfg.paths.dataset_zip);
    RankedDomainSource::load(zip, &cfg.paths.dataset_entry, cfg.dataset.expected_count)
        .with_context(|| format!("loading ranked domains from {}", zip.display()))
}

fn sample(cfg: &Config) -> Result<()> {
    let source = load_source(cfg)?;
    let none = HashSet::new();
    let groups: Vec<_> = stratum::plan(cfg)
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let mut rng = acquisition::stratum_rng(cfg.global.seed, i);
            let picked = source.sample(|r| s.filter.matches(r), s.target_count, &none, &mut rng);
            serde_json::json!({
                "stratum": s.name,
                "filter": s.filter,
                "eligible": source.eligible_count(|r| s.filter.matches(r), &none),
                "requested": s.target_count,
                "domains": picked,
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "seed": cfg.global.seed,
            "strata": groups,
        }))?
    );
    Ok(())
}

fn collect(cfg: &Config) -> Result<()> {
    let started = now_rfc3339();
    let results_dir = PathBuf::from(&cfg.paths.results_dir);
    ensure_dir(&results_dir)?;

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(results_dir.join("effective-config.toml"), raw)?;
    }

    let source = load_source(cfg)?;
    let dataset_sha256 = hash_file(Path::new(&cfg.paths.dataset_zip))?;
    let strata = stratum::plan(cfg);
    let client = ObservatoryClient::new(cfg);

    info!(
        "collecting {} strata with seed {} (parallel={})",
        strata.len(),
        cfg.global.seed,
        cfg.global.parallel_strata
    );
    let runs = acquisition::run_strata(
        &source,
        &client,
        &strata,
        AcquisitionSettings::from_config(cfg),
        cfg.global.seed,
        cfg.global.parallel_strata,
    );

    let mut reports = Vec::with_capacity(runs.len());
    let mut aborted = Vec::new();
    for StratumRun { stratum, outcome } in runs {
        match outcome {
            Ok(out) => {
                let path = cfg.results_path(&stratum.output_file);
                store::save(&out.results, &path)?;
                reports.push(stratum_report(
                    &stratum,
                    StratumStatus::Done,
                    out.results.len(),
                    out.stats,
                    Some(path.display().to_string()),
                ));
            }
            Err(err) => {
                error!("{err}");
                let AcquisitionError::SourcePoolExhausted {
                    collected, stats, ..
                } = &err;
                reports.push(stratum_report(
                    &stratum,
                    StratumStatus::Aborted,
                    *collected,
                    stats.clone(),
                    None,
                ));
                aborted.push(err.to_string());
            }
        }
    }

    let manifest = RunManifest {
        started,
        finished: now_rfc3339(),
        analysis: cfg.global.analysis,
        seed: cfg.global.seed,
        dataset_sha256,
        config_sha256: sha256_hex(cfg.normalized_for_hash().as_bytes()),
        strata: reports,
    };
    let manifest_path = results_dir.join(&cfg.paths.manifest_file);
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("write manifest: {}", manifest_path.display()))?;

    if cfg.global.print_summary {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    }

    if !aborted.is_empty() {
        return Err(anyhow!("{}", aborted.join("; ")));
    }
    Ok(())
}

fn stratum_report(
    stratum: &Stratum,
    status: StratumStatus,
    collected: usize,
    stats: acquisition::AcquisitionStats,
    output: Option<String>,
) -> StratumReport {
    StratumReport {
        name: stratum.name.clone(),
        filter: stratum.filter,
        status,
        target: stratum.target_count,
        collected,
        stats,
        output,
    }
}

fn report(cfg: &Config, inputs: &[PathBuf]) -> Result<()> {
    let inputs: Vec<PathBuf> = if inputs.is_empty() {
        stratum::plan(cfg)
            .iter()
            .map(|s| cfg.results_path(&s.output_file))
            .collect()
    } else {
        inputs.to_vec()
    };

    let mut merged = store::ResultMap::new();
    let mut summaries = Vec::new();
    for path in &inputs {
        let results = store::load(path)?;
        let group = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("results");
        summaries.push(stats::summarize(group, &results));
        merged = store::merge(&merged, &results);
    }
    if inputs.len() > 1 {
        summaries.push(stats::summarize("merged", &merged));
    }

    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

fn inspect(input: &Path) -> Result<()> {
    let results = store::load(input)?;
    for (domain, r) in &results {
        println!("Domain: {domain}");
        match r.assessment.score {
            Some(score) => println!("Score: {score}"),
            None => println!("Score: n/a"),
        }
        for (test, detail) in &r.tests {
            println!("Test: {test}");
            let fields = serde_json::to_value(detail)?;
            if let Some(obj) = fields.as_object() {
                for (k, v) in obj {
                    println!("\t{k}: {v}");
                }
            }
            println!();
        }
    }
    Ok(())
}

fn tag_servers(cfg: &Config, input: &Path, output: Option<&Path>) -> Result<()> {
    let results = store::load(input)?;
    let output = output.map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(format!("{}{}", input.display(), cfg.enrich.output_suffix))
    });

    let probe = enrich::http_server_probe(Duration::from_secs(cfg.enrich.request_timeout_seconds));
    let (tagged, stats) = enrich::tag_servers(results, cfg.enrich.workers, &probe);
    info!(
        "tagged {} of {} queried domains ({} already had a server header)",
        stats.tagged, stats.queried, stats.already_tagged
    );
    store::save(&tagged, &output)
}
