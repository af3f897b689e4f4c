//! Main Entrypoint for the Verba API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Choosing the learner store and running migrations when it is PostgreSQL.
//! 3. Wiring the AI providers and the optional transcription service.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use verba_api::{
    config::{Config, GEMINI_API_BASE, GROQ_API_BASE},
    db::PgUserStore,
    router::create_router,
    state::AppState,
};
use verba_core::{
    InMemoryUserStore, UserStore,
    ai::{AiService, ChatBackend, ConversationOnlyService, HybridAiService, OpenAiCompatibleService},
    speech::{SpeechService, WhisperSpeechService},
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn UserStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PgUserStore::connect(url).await?;
            store.run_migrations().await?;
            info!("Database connection established and migrations are up-to-date.");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL is not set; learners are kept in memory and lost on restart.");
            Ok(Arc::new(InMemoryUserStore::new()))
        }
    }
}

fn build_ai(config: &Config) -> Arc<dyn AiService> {
    let gemini = OpenAIConfig::new()
        .with_api_key(&config.gemini_api_key)
        .with_api_base(GEMINI_API_BASE);
    let groq = OpenAIConfig::new()
        .with_api_key(&config.groq_api_key)
        .with_api_base(GROQ_API_BASE);

    let conversation: Arc<dyn AiService> = Arc::new(ConversationOnlyService::new(
        "gemini",
        ChatBackend::new(gemini, config.conversation_model.clone()),
    ));
    let features: Arc<dyn AiService> = Arc::new(OpenAiCompatibleService::new(
        "groq",
        ChatBackend::new(groq, config.feature_model.clone()),
    ));
    Arc::new(HybridAiService::new(conversation, features))
}

fn build_speech(config: &Config) -> Option<Arc<dyn SpeechService>> {
    let Some(api_key) = &config.openai_api_key else {
        warn!("OPENAI_API_KEY is not set; pronunciation practice is disabled.");
        return None;
    };
    let openai = OpenAIConfig::new().with_api_key(api_key);
    Some(Arc::new(WhisperSpeechService::new(
        openai,
        config.transcription_model.clone(),
        config.audio_temp_dir.clone(),
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Services ---
    let store = build_store(&config).await?;
    let ai = build_ai(&config);
    let speech = build_speech(&config);
    let app_state = Arc::new(AppState::new(store, ai, speech));

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        conversation_model = %config.conversation_model,
        feature_model = %config.feature_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
