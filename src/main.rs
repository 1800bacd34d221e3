use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use letterflow::api::letter_routes;
use letterflow::config::{ServerConfig, WorkflowConfig};
use letterflow::letters::{LetterWorkflow, spawn_sweep_task};
use letterflow::notify::{EmailNotifier, LogNotifier, Notifier, SmtpConfig, spawn_notifier_task};
use letterflow::store::{LetterStore, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let server = ServerConfig::from_env()?;

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = init_tracing(&server);

    let workflow_config = WorkflowConfig::from_env()?;
    let smtp = SmtpConfig::from_env()?;

    eprintln!("📨 letterflow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/letters", server.port);
    eprintln!("   Events WS: ws://0.0.0.0:{}/ws/letters", server.port);
    eprintln!("   Database: {}", server.db_path.display());

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn LetterStore> = Arc::new(
        LibSqlBackend::new_local(&server.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", server.db_path.display()))?,
    );

    // ── Workflow ─────────────────────────────────────────────────────────
    let workflow = Arc::new(LetterWorkflow::new(Arc::clone(&store), workflow_config));
    let _sweep_handle = spawn_sweep_task(Arc::clone(&workflow), server.sweep_interval);

    // ── Notifications ────────────────────────────────────────────────────
    let notifier: Arc<dyn Notifier> = match smtp {
        Some(config) => {
            eprintln!("   Email notices via {}:{}", config.host, config.port);
            Arc::new(EmailNotifier::new(config))
        }
        None => {
            eprintln!("   Email notices disabled (LETTERFLOW_SMTP_HOST not set)");
            Arc::new(LogNotifier)
        }
    };
    let _notifier_handle = spawn_notifier_task(workflow.subscribe(), Arc::clone(&store), notifier);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = letter_routes(workflow);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", server.port))
        .await
        .with_context(|| format!("Failed to bind port {}", server.port))?;
    tracing::info!(port = server.port, "letterflow listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

/// stderr logging, plus a daily-rolling file when `LETTERFLOW_LOG_DIR` is set.
fn init_tracing(server: &ServerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match &server.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "letterflow.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}
