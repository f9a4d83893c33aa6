use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

use voice_health::audio::write_wav;
use voice_health::report::UNKNOWN_ENVIRONMENT;
use voice_health::{
    AudioAsset, ClassifierGateway, Config, FeatureVector, Pipeline, RecordingContext,
    FEATURE_NAMES, FEATURE_SCHEMA_VERSION,
};

/// Screen voice recordings for health risk with a pre-trained classifier
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Audio files to analyze (wav, mp3, ogg, webm)
    files: Vec<PathBuf>,

    /// Path to the classifier artifact (.json)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Path to the scaler artifact (.json)
    #[arg(short, long)]
    scaler: Option<PathBuf>,

    /// Path to a config file (defaults to ~/.voicehealth/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recording environment label stored with each result
    #[arg(short, long, default_value = UNKNOWN_ENVIRONMENT)]
    environment: String,

    /// User ID stored with each result
    #[arg(short, long)]
    user: Option<String>,

    /// Number of recordings analyzed concurrently
    #[arg(short, long, default_value = "2")]
    jobs: usize,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Extract features only; no model is loaded
    #[arg(long)]
    features_only: bool,

    /// Print the feature ordering and schema version, then exit
    #[arg(long)]
    feature_names: bool,

    /// Write each preprocessed recording as 16-bit WAV into this directory
    #[arg(long, value_name = "DIR")]
    dump_preprocessed: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// Per-file options shared by every job
#[derive(Debug, Clone)]
struct JobOptions {
    features_only: bool,
    pretty: bool,
    dump_dir: Option<PathBuf>,
    environment: String,
    user: Option<String>,
}

#[derive(Serialize)]
struct FeatureNamesOutput {
    feature_schema_version: u32,
    feature_names: Vec<&'static str>,
}

#[derive(Serialize)]
struct FeaturesOutput<'a> {
    file: &'a Path,
    feature_schema_version: u32,
    duration_secs: f64,
    features: &'a FeatureVector,
}

#[derive(Serialize)]
struct FailureOutput<'a> {
    file: &'a Path,
    error: String,
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    // Logs go to stderr; stdout carries results
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    config.apply_env_overrides()?;

    if let Some(ref model) = args.model {
        config.model_path = Some(model.clone());
    }
    if let Some(ref scaler) = args.scaler {
        config.scaler_path = Some(scaler.clone());
    }

    config.validate()?;
    Ok(config)
}

fn process_file(pipeline: &Pipeline, path: &Path, job: &JobOptions) -> Result<String> {
    let asset = AudioAsset::from_path(path);
    let output = pipeline.run_front_end(&asset)?;

    if let Some(ref dir) = job.dump_dir {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string());
        let dump_path = dir.join(format!("{}.preprocessed.wav", stem));
        write_wav(&dump_path, &output.audio.samples, output.audio.sample_rate)
            .with_context(|| format!("Failed to write {}", dump_path.display()))?;
        info!("Wrote preprocessed audio to {}", dump_path.display());
    }

    if job.features_only {
        return to_json(
            &FeaturesOutput {
                file: path,
                feature_schema_version: FEATURE_SCHEMA_VERSION,
                duration_secs: output.report.duration_secs,
                features: &output.features,
            },
            job.pretty,
        );
    }

    let mut context = RecordingContext::new().with_environment(job.environment.clone());
    if let Some(ref user) = job.user {
        context = context.with_user(user.clone());
    }
    let record = pipeline.score(&output, &context)?;
    to_json(&record, job.pretty)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs);

    if args.feature_names {
        let output = FeatureNamesOutput {
            feature_schema_version: FEATURE_SCHEMA_VERSION,
            feature_names: FEATURE_NAMES.to_vec(),
        };
        println!("{}", to_json(&output, args.pretty)?);
        return Ok(());
    }

    if args.files.is_empty() {
        bail!("No input files given (see --help)");
    }

    let config = load_config(&args)?;

    let pipeline = if args.features_only {
        info!("Feature extraction only; skipping model load");
        Pipeline::new(&config, Arc::new(ClassifierGateway::new()))
    } else {
        Pipeline::from_config(&config).context("Failed to load model artifacts")?
    };

    if let Some(ref dir) = args.dump_preprocessed {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let job = JobOptions {
        features_only: args.features_only,
        pretty: args.pretty,
        dump_dir: args.dump_preprocessed.clone(),
        environment: args.environment.clone(),
        user: args.user.clone(),
    };

    let jobs = args.jobs.max(1);
    info!("Analyzing {} file(s) with {} job(s)", args.files.len(), jobs);

    let semaphore = Arc::new(Semaphore::new(jobs));
    let mut tasks = Vec::with_capacity(args.files.len());
    for path in args.files.iter().cloned() {
        let permit = semaphore.clone().acquire_owned().await?;
        let pipeline = pipeline.clone();
        let job = job.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = process_file(&pipeline, &path, &job);
            (path, result)
        }));
    }

    let total = tasks.len();
    let mut failures = 0;
    for task in tasks {
        match task.await {
            Ok((_, Ok(line))) => println!("{}", line),
            Ok((path, Err(e))) => {
                failures += 1;
                error!("Failed to analyze {}: {:#}", path.display(), e);
                let failure = FailureOutput {
                    file: &path,
                    error: format!("{:#}", e),
                };
                println!("{}", to_json(&failure, args.pretty)?);
            }
            Err(e) => {
                failures += 1;
                error!("Analysis task panicked: {}", e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} file(s) failed", failures, total);
    }

    info!("Analyzed {} file(s)", total);
    Ok(())
}
