/*
 * Copyright (C) 2026 the flow-controller contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Control-plane service entrypoint.
//!
//! Loads configuration, connects to the cluster and the store, brings up
//! the volume helper pod, then serves the HTTP surface.

use std::path::Path;
use std::sync::Arc;

use flow_controller::config::AppConfig;
use flow_controller::context::Context;
use flow_controller::helper_pod;
use flow_controller::http::build_router;
use flow_controller::monitor::metrics::Metrics;
use flow_controller::store;
use flow_controller::telemetry;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(load_config());
    config.validate()?;

    telemetry::init(&config.telemetry)?;

    info!(
        "Starting flow-controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default().await?;
    info!(namespace = %config.workflow_namespace, "connected to Kubernetes cluster");

    let db = store::connect(&config.database_url).await?;
    info!("store schema initialized");

    let helper_pod_handle = match helper_pod::ensure_ready(&client, &config.workflow_namespace, &config).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "volume helper pod not ready at startup, will retry lazily on first file operation");
            helper_pod::HelperPodHandle::default()
        }
    };

    let ctx = Context {
        client,
        namespace: config.workflow_namespace.clone(),
        config: config.clone(),
        db,
        helper_pod: Arc::new(Mutex::new(helper_pod_handle)),
        metrics: Arc::new(Metrics::new()),
    };

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&config.http.bind_addr).await?;
    info!(addr = %config.http.bind_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("flow-controller stopped");
    Ok(())
}

fn load_config() -> AppConfig {
    let override_path = std::env::var("FLOW_CONTROLLER_CONFIG_PATH").ok();
    let config_path = override_path
        .as_deref()
        .filter(|path| Path::new(path).exists())
        .unwrap_or("/config/config.yaml");

    match AppConfig::from_mounted_file(config_path) {
        Ok(cfg) => {
            info!("loaded configuration from {}", config_path);
            cfg
        }
        Err(err) => {
            warn!("failed to load configuration from {}: {}. Using defaults.", config_path, err);
            AppConfig::default()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
