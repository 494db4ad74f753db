use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use facematch_core::detection::domain::face_encoder::FaceEncoder;
use facematch_core::detection::infrastructure::onnx_face_encoder::OnnxFaceEncoder;
use facematch_core::identity::infrastructure::json_identity_file::open_store;
use facematch_core::identity::infrastructure::shared_identity_store::SharedIdentityStore;
use facematch_core::liveness::liveness_verdict::Challenge;
use facematch_core::liveness::liveness_verifier::LivenessVerifier;
use facematch_core::pipeline::face_recognition_use_case::FaceRecognitionUseCase;
use facematch_core::shared::config::RecognitionConfig;
use facematch_core::shared::constants::IMAGE_EXTENSIONS;
use facematch_core::shared::frame::{load_frame, Frame};

/// Enroll, recognize and liveness-check faces from bursts of still images.
#[derive(Parser, Debug)]
#[command(name = "facematch")]
struct Cli {
    /// JSON configuration file; built-in defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Identity store file (overrides the config).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Maximum embedding distance for a match (overrides the config).
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Landmark detector ONNX model (overrides the config).
    #[arg(long, global = true)]
    detector_model: Option<PathBuf>,

    /// Face embedding ONNX model (overrides the config).
    #[arg(long, global = true)]
    encoder_model: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a burst to the matching identity, or create a new one.
    Enroll(BurstArgs),
    /// Identify a burst without changing the store.
    Recognize(BurstArgs),
    /// Run only the liveness check on a burst.
    Liveness {
        /// Image files or directories of images, in capture order.
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Prompt the subject was given: blink or turn-head.
        #[arg(long)]
        challenge: Option<Challenge>,
    },
    /// List stored identities and their sample counts.
    Inspect,
}

#[derive(Args, Debug)]
struct BurstArgs {
    /// Image files or directories of images, in capture order.
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Reject the burst unless it passes the liveness check.
    #[arg(long)]
    liveness: bool,
    /// Prompt the subject was given: blink or turn-head (implies --liveness).
    #[arg(long)]
    challenge: Option<Challenge>,
}

#[derive(Serialize)]
struct IdentityEntry {
    person_id: String,
    samples: usize,
}

#[derive(Serialize)]
struct Inventory {
    store: PathBuf,
    identities: Vec<IdentityEntry>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Inspect => {
            let store = SharedIdentityStore::new(open_store(config.store.clone()));
            let identities = store
                .summary()?
                .into_iter()
                .map(|(id, samples)| IdentityEntry {
                    person_id: id.to_string(),
                    samples,
                })
                .collect();
            print_json(&Inventory {
                store: config.store.path.clone(),
                identities,
            })
        }
        Command::Liveness { images, challenge } => {
            let frames = load_frames(&images)?;
            let encoder = build_encoder(&config)?;
            let verifier =
                LivenessVerifier::new(encoder, config.aligner.clone(), config.liveness.clone());
            print_json(&verifier.verify(&frames, challenge))
        }
        Command::Enroll(args) => {
            let frames = load_frames(&args.images)?;
            let use_case = build_use_case(&config, &args)?;
            let outcome = use_case.learn(&frames, args.challenge)?;
            if let Some(id) = &outcome.person_id {
                log::info!("Enrolled burst as {id}");
            }
            print_json(&outcome)
        }
        Command::Recognize(args) => {
            let frames = load_frames(&args.images)?;
            let use_case = build_use_case(&config, &args)?;
            print_json(&use_case.recognize(&frames, args.challenge)?)
        }
    }
}

fn load_config(cli: &Cli) -> Result<RecognitionConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => RecognitionConfig::from_file(path)?,
        None => RecognitionConfig::default(),
    };
    apply_overrides(cli, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(cli: &Cli, config: &mut RecognitionConfig) {
    if let Some(path) = &cli.store {
        config.store.path = path.clone();
    }
    if let Some(threshold) = cli.threshold {
        config.store.match_threshold = threshold;
    }
    if let Some(path) = &cli.detector_model {
        config.models.detector = Some(path.clone());
    }
    if let Some(path) = &cli.encoder_model {
        config.models.encoder = Some(path.clone());
    }
}

fn build_encoder(config: &RecognitionConfig) -> Result<Arc<dyn FaceEncoder>, Box<dyn std::error::Error>> {
    log::info!("Resolving face models");
    let encoder = OnnxFaceEncoder::from_config(&config.models, Some(Box::new(download_progress)))?;
    Ok(Arc::new(encoder))
}

fn build_use_case(
    config: &RecognitionConfig,
    args: &BurstArgs,
) -> Result<FaceRecognitionUseCase, Box<dyn std::error::Error>> {
    let encoder = build_encoder(config)?;
    let store = SharedIdentityStore::new(open_store(config.store.clone()));
    let use_case = FaceRecognitionUseCase::new(Arc::clone(&encoder), store, config);
    if args.liveness || args.challenge.is_some() {
        let verifier =
            LivenessVerifier::new(encoder, config.aligner.clone(), config.liveness.clone());
        Ok(use_case.with_liveness(verifier))
    } else {
        Ok(use_case)
    }
}

/// Decodes every image, expanding directories in file-name order.
fn load_frames(inputs: &[PathBuf]) -> Result<Vec<Frame>, Box<dyn std::error::Error>> {
    let paths = collect_images(inputs)?;
    if paths.is_empty() {
        return Err("No images found in the given inputs".into());
    }
    let frames = paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            load_frame(path, i).map_err(|e| format!("Failed to read {}: {e}", path.display()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    log::info!("Loaded {} frames", frames.len());
    Ok(frames)
}

fn collect_images(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| is_image(p))
                .collect();
            entries.sort();
            paths.extend(entries);
        } else if input.exists() {
            paths.push(input.clone());
        } else {
            return Err(format!("Input file not found: {}", input.display()).into());
        }
    }
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
