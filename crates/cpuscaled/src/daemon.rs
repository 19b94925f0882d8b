//! Daemon lifecycle: assemble the autoscaler, run until told to stop,
//! then wind every loop down.

use std::future::Future;
use std::sync::Arc;

use cpuscale_autoscale::{AutoScaler, ScalerConfig};
use cpuscale_control::ControlLoops;
use cpuscale_core::Settings;
use cpuscale_transport::{RestClient, RetryPolicy};
use tracing::{error, info};

/// Run the autoscaler until `shutdown` resolves.
///
/// Settings are validated again here so a caller cannot start loops from a
/// hand-built, invalid table.
pub async fn run(settings: Settings, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    settings.validate()?;

    let policy = RetryPolicy::from_settings(&settings);
    let config = ScalerConfig::from_settings(&settings);
    info!(
        server_url = %settings.server_url,
        max_retries = policy.max_retries,
        retry_interval = ?policy.interval,
        status_check_interval = ?config.status_check_interval,
        decide_replica_interval = ?config.decide_replica_interval,
        scaling_interval = ?config.scaling_interval,
        "starting cpuscaled"
    );

    let scaler = Arc::new(AutoScaler::new(config, RestClient::new(policy)));
    let mut loops = ControlLoops::new();
    scaler.spawn(&mut loops)?;

    shutdown.await;
    info!("shutdown signal received");

    loops.cancel_all();
    for exit in loops.join_all().await {
        if let Err(e) = exit.result {
            error!(loop_name = %exit.name, error = %e, "control loop ended with an error");
        }
    }
    info!("all control loops stopped");
    Ok(())
}

/// Resolves on SIGINT or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
