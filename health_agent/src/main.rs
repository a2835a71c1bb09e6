//! Entry point for the health agent binary

use anyhow::Result;
use health_core::{
    evaluators::ExchangesFailed, helper, ContextHealthCheck, HealthCheckRegistry, HealthSettings,
    Options, RoutesHealthCheckRepository, ServiceStatus, StaticHost, StaticRoute,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = HealthSettings::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    info!("Configuration loaded successfully");
    debug!("Effective settings:\n{}", settings.to_toml()?);

    let host = Arc::new(StaticHost::new(settings.agent.host_name.clone()));
    for route in &settings.agent.routes {
        host.add_route(Arc::new(
            StaticRoute::new(Some(route.id.clone()), settings.agent.host_name.clone())
                .auto_startup(route.auto_startup),
        ));
    }
    info!(
        "Host '{}' initialized with {} routes",
        settings.agent.host_name,
        settings.agent.routes.len()
    );

    let registry = Arc::new(HealthCheckRegistry::with_settings(&settings)?);
    registry.set_host(host.clone());
    registry.register(Arc::new(ContextHealthCheck::for_context()));

    let routes = RoutesHealthCheckRepository::new().with_overrides(settings.overrides()?);
    routes.add_evaluator(Arc::new(ExchangesFailed::new(0)));
    registry.add_repository(Arc::new(routes));

    host.set_status(ServiceStatus::Started);

    let poll_interval = Duration::from_millis(settings.agent.poll_interval_ms);
    info!("Polling readiness every {:?}", poll_interval);

    let mut interval = tokio::time::interval(poll_interval);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let registry = registry.clone();
                let sweep = tokio::task::spawn_blocking(move || {
                    helper::invoke_readiness(&registry, &Options::new())
                });

                match sweep.await {
                    Ok(report) => match serde_json::to_string(&report) {
                        Ok(json) => info!(target: "health_report", "{}", json),
                        Err(e) => warn!("Failed to render health report: {}", e),
                    },
                    Err(e) => error!("Health sweep panicked: {}", e),
                }
            }
            _ = &mut shutdown => break,
        }
    }

    host.set_status(ServiceStatus::Stopped);
    info!("Health agent shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let default_level = if cfg!(debug_assertions) {
            "debug"
        } else {
            "info"
        };

        format!(
            "{}={},health_core={},health_report=info",
            env!("CARGO_CRATE_NAME").replace('-', "_"),
            default_level,
            default_level
        )
        .into()
    });

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let is_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    if is_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .init();
    }
}
