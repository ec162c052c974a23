//! HTTP dashboard of the head node.

use ::axum::{extract::State, routing::get, Json, Router};
use ::orca_common::task::ClusterInfo;
use ::tower_http::trace::TraceLayer;

use crate::{executor::Executor, scheduler::Scheduler};

/// # Return the router for the dashboard
pub fn get_dashboard<E: Executor>(scheduler: Scheduler<E>) -> Router {
    Router::new()
        .route("/", get(|| async { "welcome to orca" }))
        .route("/api/cluster", get(cluster_info::<E>))
        .layer(TraceLayer::new_for_http())
        .with_state(scheduler)
}

async fn cluster_info<E: Executor>(State(scheduler): State<Scheduler<E>>) -> Json<ClusterInfo> {
    Json(scheduler.cluster_info())
}
