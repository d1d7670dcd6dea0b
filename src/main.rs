use std::process::ExitCode;

use tracing::{error, info};

use clipwatch::{telemetry, Application, Config};

fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CLIPWATCH_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let path = config_path();
    let config = match Config::load_with_env(&path).and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    if let Err(e) = clipwatch::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        clipwatch::logging::init_console_only(&config.logging.level);
    }

    info!("clipwatch {}", env!("CARGO_PKG_VERSION"));

    let metrics = match telemetry::init(&config.metrics) {
        Ok(handle) => handle,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut app = match Application::build(config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(handle) = metrics {
        app = app.with_metrics(handle);
    }

    match app.run(shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("clipwatch stopped with an error: {}", e);
            ExitCode::FAILURE
        }
    }
}
