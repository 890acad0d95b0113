use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use licensegate::config::{init_config, LicensegateConfig};
use licensegate::errors::{LicenseError, LicenseResult};
use licensegate::license_key::LicenseKeyConfig;
use licensegate::logging::init_tracing;
use licensegate::server::{
    build_router, execute_license_command, parse_command, run_console, AppState, Command,
};
use licensegate::store::Database;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("licensegate: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> LicenseResult<()> {
    let config = init_config()?;
    init_tracing(&config.logging);

    let args: Vec<String> = std::env::args().collect();
    let command = parse_command(&args);
    if let Command::Usage(message) = &command {
        return Err(LicenseError::InvalidArgument(message.clone()));
    }

    let db = Database::new().await?;
    let keys = LicenseKeyConfig::from(&config.license);
    let admin = config.operator.admin_session_id;

    let outcome = match command {
        Command::Serve { console: false } => serve(config, db.clone()).await,
        Command::Serve { console: true } => {
            // The console ending at EOF leaves the server running.
            let console = tokio::spawn(run_console(db.clone(), admin, keys));
            let outcome = serve(config, db.clone()).await;
            console.abort();
            outcome
        }
        Command::Console => run_console(db.clone(), admin, keys).await,
        Command::License(cmd) => execute_license_command(&db, cmd).await,
        Command::Usage(_) => Ok(()),
    };

    db.close().await;
    outcome
}

async fn serve(config: &LicensegateConfig, db: Arc<Database>) -> LicenseResult<()> {
    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LicenseError::ConfigError(format!("failed to bind {addr}: {e}")))?;

    info!("HTTP listening on {addr}");

    axum::serve(listener, build_router(AppState { db }))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| LicenseError::Internal(format!("http server error: {e}")))?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
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

    info!("Shutdown signal received");
}
