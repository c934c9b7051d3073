use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::Level;
use visual_search::camera::{SyntheticCameraProvider, SyntheticScene};
use visual_search::common::RectF;
use visual_search::config::Configuration;
use visual_search::coordinator::CoordinatorBuilder;
use visual_search::error::AppError;
use visual_search::pipeline::LumaObjectDetector;
use visual_search::search::{ProductSearchClient, StaticImageSearch};
use visual_search::workflow::{SearchedObject, WorkflowState};

const RESULT_DISPLAY: Duration = Duration::from_secs(5);

fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

struct Args {
    config_path: Option<PathBuf>,
    photo: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args = Args {
        config_path: None,
        photo: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--photo" => args.photo = iter.next().map(PathBuf::from),
            _ => args.config_path = Some(PathBuf::from(arg)),
        }
    }
    args
}

fn log_result(searched: &SearchedObject) {
    tracing::info!(
        "Object {:?} at {:?}: {} products",
        searched.object().object_id(),
        searched.bounding_box(),
        searched.products().len()
    );
    for product in searched.products() {
        tracing::info!("  {} ({}) {}", product.title, product.subtitle, product.image_url);
    }
}

async fn search_photo(configuration: Configuration, path: PathBuf) -> Result<(), AppError> {
    let engine = Arc::new(ProductSearchClient::new(configuration.search.clone())?);
    let search = StaticImageSearch::new(
        Arc::new(LumaObjectDetector::new()),
        engine,
        configuration.detection.detector_timeout(),
    );
    let results = search.search_file(&path).await?;
    if results.is_empty() {
        tracing::info!("No objects found in {}", path.display());
    }
    for searched in &results {
        log_result(searched);
    }
    Ok(())
}

async fn run_live(configuration: Configuration) -> Result<(), AppError> {
    // The synthetic camera films one bright object sitting under the reticle.
    let scene = SyntheticScene::new();
    scene.place(RectF::new(0.4, 0.4, 0.6, 0.6));

    let engine = Arc::new(ProductSearchClient::new(configuration.search.clone())?);
    let coordinator = CoordinatorBuilder::new(configuration)
        .camera_provider(Arc::new(SyntheticCameraProvider::new(scene)))
        .detector(Arc::new(LumaObjectDetector::new()))
        .search_engine(engine)
        .build()?;

    let mut states = coordinator.subscribe_state();
    let mut searched = coordinator.subscribe_searched();
    coordinator.resume();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                tracing::info!("Workflow state: {}", state);
                if state == WorkflowState::Searched {
                    tokio::time::sleep(RESULT_DISPLAY).await;
                    coordinator.dismiss_result();
                }
            }
            changed = searched.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(result) = searched.borrow_and_update().clone() {
                    log_result(&result);
                }
            }
        }
        if coordinator.is_stopped() {
            break;
        }
    }

    let error = coordinator.last_error();
    coordinator.shutdown().await;
    match error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = parse_args();
    let configuration = Configuration::load(args.config_path.as_deref())?;
    init_logging(&configuration.logging.level);

    match args.photo {
        Some(path) => search_photo(configuration, path).await,
        None => run_live(configuration).await,
    }
}
