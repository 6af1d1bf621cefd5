use std::process::ExitCode;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use weather_api::{
    config::{AppConfig, HostEnvironment},
    create_app, fatal,
    logging::{self, LoggingHandle},
    metrics, AppState,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Log just enough to capture startup failures
    let mut logging = logging::bootstrap();
    install_panic_hook();

    info!("Starting web host");

    let code = match run(&mut logging).await {
        Ok(()) => {
            info!("Web host stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            fatal!(error = ?err, "Host terminated unexpectedly");
            ExitCode::FAILURE
        }
    };

    logging.close_and_flush();
    code
}

async fn run(logging: &mut LoggingHandle) -> Result<()> {
    let environment = HostEnvironment::from_env();
    let config = AppConfig::load(&environment).context("failed to load configuration")?;

    logging
        .configure(
            &config.logging,
            &environment,
            &config.environment_settings.app_environment,
        )
        .context("failed to configure runtime logger")?;
    info!(
        environment = %environment.name,
        app_environment = %config.environment_settings.app_environment,
        "Runtime logger configured"
    );

    let metrics = if config.metrics.enabled {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = create_app(AppState::new(config, environment, metrics));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Now listening on: http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        fatal!(error = %panic, "Host terminated unexpectedly");
        default_hook(panic);
    }));
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Application is shutting down...");
}
