use std::sync::Arc;

use persona_quiz::config::{API_KEY_VAR, AppConfig};
use persona_quiz::error::Result;
use persona_quiz::llm::create_provider;
use persona_quiz::quiz::{SessionStore, StageController, quiz_routes, spawn_sweep_task};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export {}=sk-...", API_KEY_VAR);
        std::process::exit(1);
    });

    eprintln!("🧭 Persona Quiz v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} @ {}", config.llm.model, config.llm.base_url);
    eprintln!(
        "   Questions: {} ({:?} loading, first batch {})",
        config.quiz.question_count,
        config.quiz.loading_mode,
        config.quiz.first_batch()
    );
    eprintln!("   Language: {}", config.quiz.language);
    eprintln!("   Web: http://0.0.0.0:{}/", config.port);
    eprintln!("   API: http://0.0.0.0:{}/api/sessions\n", config.port);

    let llm = create_provider(&config.llm)?;

    let store = SessionStore::new();
    let controller = Arc::new(StageController::new(store, llm, config.quiz.clone()));
    let _sweep_handle = spawn_sweep_task(Arc::clone(&controller), config.session_idle_timeout);
    let app = quiz_routes(controller);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Quiz server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
