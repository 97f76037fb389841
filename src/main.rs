use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use sandwich_symmetry::config::Config;
use sandwich_symmetry::oracle::GeminiOracle;
use sandwich_symmetry::pipeline::Evaluator;
use sandwich_symmetry::server::{self, AppState};
use sandwich_symmetry::store::HistoryStore;

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::load(None).context("Failed to load configuration")?;
    let api_key = config.oracle.api_key.clone().unwrap_or_default();

    // The blocking HTTP client has to be built outside the async runtime
    let oracle = GeminiOracle::new(&config.oracle, &api_key)
        .context("Failed to initialize Gemini client")?;
    let store = HistoryStore::open(&config.storage.database_path, &config.storage.image_dir)
        .context("Failed to open history store")?;

    let app_state = web::Data::new(AppState {
        evaluator: Arc::new(Evaluator::new(Arc::new(oracle), config.scoring)),
        store: Arc::new(store),
    });

    let bind = (config.server.host.clone(), config.server.port);
    let max_upload = config.server.max_upload_bytes;
    info!(host = %bind.0, port = bind.1, "starting server");

    let state = app_state.clone();
    actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .app_data(web::PayloadConfig::new(max_upload))
                .configure(server::configure)
        })
        .bind(bind)?
        .run()
        .await
    })?;

    // Last reference to the blocking client drops here, outside the runtime
    drop(app_state);
    Ok(())
}
