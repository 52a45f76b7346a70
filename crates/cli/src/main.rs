use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use faceindex_core::detection::domain::face_detector::FaceDetector;
use faceindex_core::detection::infrastructure::model_resolver;
use faceindex_core::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use faceindex_core::imaging::infrastructure::image_file_reader::ImageFileReader;
use faceindex_core::matching::identity_matcher::DEFAULT_MATCH_THRESHOLD;
use faceindex_core::pipeline::identity_context::IdentityContext;
use faceindex_core::pipeline::index_folder_use_case::IndexFolderUseCase;
use faceindex_core::pipeline::index_reporter::LogIndexReporter;
use faceindex_core::pipeline::query_by_image_use_case::{QueryByImageUseCase, QueryOutcome};
use faceindex_core::shared::constants::{
    DEFAULT_DETECTOR_CONFIDENCE, DETECTOR_MODEL_NAME, DETECTOR_MODEL_URL, EMBEDDING_MODEL_NAME,
    EMBEDDING_MODEL_URL,
};
use faceindex_core::store::infrastructure::sqlite_store::SqliteStore;

/// Index faces in photo folders and find who appears in an image.
#[derive(Parser)]
#[command(name = "faceindex")]
struct Cli {
    /// SQLite database file.
    #[arg(long, global = true, default_value = "faces.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect and index every face in a folder of images.
    Index {
        /// Folder containing .jpg/.jpeg/.png images.
        folder: PathBuf,

        /// Maximum embedding distance to treat two faces as the same person.
        #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD)]
        threshold: f64,

        /// Face detection confidence threshold (0.0-1.0).
        #[arg(long, default_value_t = DEFAULT_DETECTOR_CONFIDENCE)]
        confidence: f64,

        /// Directory with pre-downloaded ONNX models.
        #[arg(long)]
        models_dir: Option<PathBuf>,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Look up which indexed persons appear in an image.
    Query {
        /// Image to search for.
        image: PathBuf,

        /// Maximum embedding distance to accept a match.
        #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD)]
        threshold: f64,

        /// Face detection confidence threshold (0.0-1.0).
        #[arg(long, default_value_t = DEFAULT_DETECTOR_CONFIDENCE)]
        confidence: f64,

        /// Directory with pre-downloaded ONNX models.
        #[arg(long)]
        models_dir: Option<PathBuf>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete all indexed persons, images, and detections.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Show row counts for the database.
    Stats {
        /// Print the counts as JSON.
        #[arg(long)]
        json: bool,
    },
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

    match cli.command {
        Command::Index {
            folder,
            threshold,
            confidence,
            models_dir,
            json,
        } => run_index(&cli.db, &folder, threshold, confidence, models_dir, json),
        Command::Query {
            image,
            threshold,
            confidence,
            models_dir,
            json,
        } => run_query(&cli.db, &image, threshold, confidence, models_dir, json),
        Command::Reset { yes } => run_reset(&cli.db, yes),
        Command::Stats { json } => run_stats(&cli.db, json),
    }
}

fn run_index(
    db: &Path,
    folder: &Path,
    threshold: f64,
    confidence: f64,
    models_dir: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !folder.is_dir() {
        return Err(format!("Folder not found: {}", folder.display()).into());
    }
    validate_confidence(confidence)?;

    let mut context = open_context(db, threshold)?;
    let detector = build_detector(confidence, models_dir.as_deref())?;

    let mut use_case = IndexFolderUseCase::new(Box::new(ImageFileReader::new()), detector);
    let summary = use_case.execute(&mut context, folder, &mut LogIndexReporter)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "images_seen": summary.images_seen,
                "images_indexed": summary.images_indexed,
                "images_skipped": summary.images_skipped,
                "images_failed": summary.images_failed,
                "faces_found": summary.faces_found,
                "persons_created": summary.persons_created,
            })
        );
    } else {
        println!(
            "Indexed {} of {} images ({} skipped, {} failed): {} faces, {} new persons",
            summary.images_indexed,
            summary.images_seen,
            summary.images_skipped,
            summary.images_failed,
            summary.faces_found,
            summary.persons_created,
        );
    }
    Ok(())
}

fn run_query(
    db: &Path,
    image: &Path,
    threshold: f64,
    confidence: f64,
    models_dir: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !image.is_file() {
        return Err(format!("Image not found: {}", image.display()).into());
    }
    validate_confidence(confidence)?;

    let context = open_context(db, threshold)?;
    let detector = build_detector(confidence, models_dir.as_deref())?;

    let mut use_case = QueryByImageUseCase::new(Box::new(ImageFileReader::new()), detector);
    let outcome = use_case.execute(&context, image)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        QueryOutcome::NothingIndexed => {
            println!("No faces indexed yet. Please index a folder first.");
        }
        QueryOutcome::NoFaceFound => {
            println!("No face found in the provided image.");
        }
        QueryOutcome::NoConfidentMatch => {
            println!("No confident match found in the database.");
        }
        QueryOutcome::Matches { matches } => {
            for m in matches {
                println!(
                    "Found match for person {} (distance {:.3})",
                    m.person_id, m.distance
                );
                for appearance in m.appearances {
                    println!("  {}", appearance.image_path);
                }
            }
        }
    }
    Ok(())
}

fn run_reset(db: &Path, yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !yes && !confirm_reset(db)? {
        println!("Aborted.");
        return Ok(());
    }

    let mut context = open_context(db, DEFAULT_MATCH_THRESHOLD)?;
    context.reset()?;
    println!("Database reset: all persons, images, and detections deleted.");
    Ok(())
}

fn run_stats(db: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let context = open_context(db, DEFAULT_MATCH_THRESHOLD)?;
    let stats = context.stats()?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "persons": stats.persons,
                "images": stats.images,
                "detections": stats.detections,
            })
        );
    } else {
        println!(
            "{} persons, {} images, {} detections",
            stats.persons, stats.images, stats.detections
        );
    }
    Ok(())
}

fn open_context(db: &Path, threshold: f64) -> Result<IdentityContext, Box<dyn std::error::Error>> {
    if !(0.0..=2.0).contains(&threshold) {
        return Err(format!("Threshold must be between 0.0 and 2.0, got {threshold}").into());
    }
    let store = SqliteStore::open(db)?;
    Ok(IdentityContext::load(Box::new(store), threshold)?)
}

fn build_detector(
    confidence: f64,
    models_dir: Option<&Path>,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {DETECTOR_MODEL_NAME}");
    let detector_path = model_resolver::resolve(
        DETECTOR_MODEL_NAME,
        DETECTOR_MODEL_URL,
        models_dir,
        Some(Box::new(download_progress)),
    )?;
    eprintln!();

    log::info!("Resolving model: {EMBEDDING_MODEL_NAME}");
    let embedder_path = model_resolver::resolve(
        EMBEDDING_MODEL_NAME,
        EMBEDDING_MODEL_URL,
        models_dir,
        Some(Box::new(download_progress)),
    )?;
    eprintln!();

    Ok(Box::new(OnnxFaceDetector::new(
        &detector_path,
        &embedder_path,
        confidence,
    )?))
}

fn validate_confidence(confidence: f64) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(format!("Confidence must be between 0.0 and 1.0, got {confidence}").into());
    }
    Ok(())
}

fn confirm_reset(db: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    eprint!(
        "This permanently deletes everything in {}. Type 'yes' to continue: ",
        db.display()
    );
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
