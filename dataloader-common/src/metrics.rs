use std::future::ready;

use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::shutdown::{Shutdown, ShutdownStage};

/// Bind a `TcpListener` on the provided bind address to serve a `Router` on it.
pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}

pub async fn index() -> &'static str {
    "dataloader"
}

/// Build the probe router. Readiness flips to 503 as soon as a drain is requested, liveness stays
/// up until the process exits.
pub fn probe_router(shutdown: Shutdown) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/_liveness", get(|| ready("ok")))
        .route(
            "/_readiness",
            get(move || {
                let status = match shutdown.stage() {
                    ShutdownStage::Running => StatusCode::OK,
                    ShutdownStage::Draining | ShutdownStage::Forced => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                };
                ready(status)
            }),
        )
}

/// Add the prometheus endpoint to a router.
pub fn setup_metrics_routes(router: Router, recorder_handle: PrometheusHandle) -> Router {
    router.route(
        "/metrics",
        get(move || ready(recorder_handle.render())),
    )
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install_recorder()
}
