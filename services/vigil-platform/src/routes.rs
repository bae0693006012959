use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use job_queue::JobQueue;
use probe_dispatch::Registry;
use serde_json::{json, Value};
use tracing::{error, instrument};
use vigil_core::{endpoints, VERSION};

#[derive(Clone, Debug)]
pub struct PlatformState {
    pub registry: Arc<Registry>,
    pub queue: JobQueue,
}

pub fn router(state: Arc<PlatformState>) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(health_check))
        .route(endpoints::METRICS, get(metrics))
        .with_state(state)
}

#[instrument(skip(state))]
async fn health_check(State(state): State<Arc<PlatformState>>) -> Json<Value> {
    let kinds: Vec<String> = state
        .registry
        .kinds()
        .iter()
        .map(|kind| kind.to_string())
        .collect();
    Json(json!({
        "status": "healthy",
        "service": "vigil-platform",
        "version": VERSION,
        "kinds": kinds,
    }))
}

#[instrument(skip(state))]
async fn metrics(State(state): State<Arc<PlatformState>>) -> Result<Json<Value>, StatusCode> {
    let counts = state.queue.counts().await.map_err(|e| {
        error!("Failed to count queue items: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok(Json(json!({
        "service": "vigil-platform",
        "queue": counts,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use uuid::Uuid;
    use vigil_core::{MemoryStore, NewQueueItem};

    fn state() -> Arc<PlatformState> {
        let store = Arc::new(MemoryStore::new());
        Arc::new(PlatformState {
            registry: Arc::new(Registry::with_default_handlers(store.clone())),
            queue: JobQueue::new(store),
        })
    }

    async fn get_json(app: Router, uri: &str) -> Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_lists_registered_kinds() {
        let body = get_json(router(state()), endpoints::HEALTH).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(
            body["kinds"],
            json!(["MTR", "NETINFO", "PING", "SPEEDTEST", "SPEEDTEST_SERVERS"])
        );
    }

    #[tokio::test]
    async fn metrics_report_queue_counts() {
        let state = state();
        state
            .queue
            .create(NewQueueItem::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        let body = get_json(router(state), endpoints::METRICS).await;
        assert_eq!(body["queue"]["pending"], 1);
        assert_eq!(body["queue"]["running"], 0);
    }
}
