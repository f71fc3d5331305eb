// src/main.rs

use std::sync::Arc;

use quizbot::config::Config;
use quizbot::engine::QuizService;
use quizbot::repository::{MemoryStore, PgStore, Store};
use quizbot::routes;
use quizbot::state::AppState;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // Logs go to stdout and to a daily rotated file under ./logs.
    // The guard flushes the file writer on shutdown.
    let (file_writer, _guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily("logs", "quizbot.log"));
    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.rust_log))
        .with(fmt::layer().with_writer(std::io::stdout).with_target(false))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => match PgStore::connect(url, config.db_max_connections).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!("Cannot open the quiz database: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set, quizzes and attempts live in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let app = routes::create_router(AppState {
        service: Arc::new(QuizService::new(store)),
        config: config.clone(),
    });

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Cannot bind {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("quizbot {} listening on {}", env!("CARGO_PKG_VERSION"), config.bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
